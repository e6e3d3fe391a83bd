use std::time::Duration;

use reframe_model::{JobId, ProjectId, ProjectStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::observation::Observation;
use super::session::{CheckOutcome, Session};
use super::snapshot::StatusSnapshot;

/// Endpoint the poller asks for status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PollTarget {
    Project(ProjectId),
    Job(JobId),
}

impl PollTarget {
    /// What the snapshot's current status calls for, if anything.
    pub fn for_snapshot(snapshot: &StatusSnapshot) -> Option<Self> {
        let status = snapshot.status();
        if snapshot.pending().is_some() || !status.is_polling_eligible() {
            return None;
        }
        if status == ProjectStatus::Generating {
            return snapshot.active_job_id().cloned().map(PollTarget::Job);
        }
        Some(PollTarget::Project(snapshot.project_id().clone()))
    }
}

/// Cadence and limits for the status poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Ceiling for the delay after repeated transient failures. Equal to
    /// `interval` disables backoff.
    pub backoff_max: Duration,
    /// Surface an error once a polled status has not moved for this long.
    pub stall_after: Option<Duration>,
    /// Applied around every gateway call the controller makes.
    pub request_timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3_000),
            backoff_max: Duration::from_millis(30_000),
            stall_after: Some(Duration::from_secs(600)),
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PollerConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            backoff_max: interval.max(Self::default().backoff_max),
            ..Self::default()
        }
    }

    /// Delay before the next tick after `failures` consecutive transport
    /// failures: `min(interval * 2^failures, backoff_max)`.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        let factor = 2u32.saturating_pow(failures);
        self.interval
            .saturating_mul(factor)
            .min(self.backoff_max)
            .max(self.interval)
    }
}

enum Next {
    Stop,
    Idle,
    Poll(PollTarget),
}

fn next_step(session: &Session, snapshot: Option<&StatusSnapshot>) -> Next {
    let Some(snapshot) = snapshot else {
        return Next::Stop;
    };
    if snapshot.project_id() != &session.project_id || snapshot.is_terminal() {
        return Next::Stop;
    }
    match PollTarget::for_snapshot(snapshot) {
        Some(target) => Next::Poll(target),
        None => Next::Idle,
    }
}

/// Tracks how long the polled status has held still.
struct StallWatch {
    key: Option<(ProjectStatus, Option<JobId>)>,
    since: Instant,
    reported: bool,
}

impl StallWatch {
    fn new() -> Self {
        Self {
            key: None,
            since: Instant::now(),
            reported: false,
        }
    }

    /// Returns how long the status has been stuck, the first time it
    /// crosses `limit`.
    fn observe(
        &mut self,
        snapshot: &StatusSnapshot,
        limit: Duration,
    ) -> Option<Duration> {
        let key = (snapshot.status(), snapshot.active_job_id().cloned());
        if self.key.as_ref() != Some(&key) {
            self.key = Some(key);
            self.since = Instant::now();
            self.reported = false;
            return None;
        }
        let waited = self.since.elapsed();
        if self.reported || waited < limit {
            return None;
        }
        self.reported = true;
        Some(waited)
    }
}

/// Handle to a running poll loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct StatusPoller {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl StatusPoller {
    pub(crate) fn spawn(session: Session, config: PollerConfig) -> Self {
        let cancel = session.cancel.child_token();
        let handle = tokio::spawn(run(session, config, cancel.clone()));
        Self { handle, cancel }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

async fn run(session: Session, config: PollerConfig, cancel: CancellationToken) {
    let project_id = session.project_id.clone();
    let mut rx: watch::Receiver<Option<StatusSnapshot>> = session.subscribe();
    let mut ticker =
        interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures: u32 = 0;
    let mut stall = StallWatch::new();

    debug!(project_id = %project_id, interval = ?config.interval, "poller started");

    loop {
        let step = next_step(&session, rx.borrow_and_update().as_ref());
        match step {
            Next::Stop => break,
            Next::Idle => {
                // Nothing to ask until the status moves again.
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        ticker.reset();
                        continue;
                    }
                }
            }
            Next::Poll(_) => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // The status may have moved while waiting; poll what it calls for
        // now, or nothing at all.
        let snapshot = rx.borrow_and_update().clone();
        let target = match next_step(&session, snapshot.as_ref()) {
            Next::Stop => break,
            Next::Idle => continue,
            Next::Poll(target) => target,
        };

        match session.check(&target).await {
            CheckOutcome::Observed => failures = 0,
            CheckOutcome::TransportFailed(err) if !err.is_transient() => {
                // The backend answered; asking again sooner or later does
                // not change that.
                failures = 0;
                debug!(project_id = %project_id, error = %err, "poll rejected");
            }
            CheckOutcome::TransportFailed(err) => {
                failures = failures.saturating_add(1);
                let delay = config.backoff_delay(failures);
                if delay > config.interval {
                    warn!(
                        project_id = %project_id,
                        failures,
                        delay = ?delay,
                        error = %err,
                        "backing off status polling"
                    );
                    ticker.reset_after(delay);
                }
            }
            CheckOutcome::Skipped => {
                debug!(project_id = %project_id, ?target, "poll tick skipped");
            }
            CheckOutcome::Cancelled => break,
        }

        if let Some(limit) = config.stall_after
            && let Some(snapshot) = session.current()
            && PollTarget::for_snapshot(&snapshot).is_some()
            && let Some(waited) = stall.observe(&snapshot, limit)
        {
            warn!(project_id = %project_id, waited = ?waited, "status stalled");
            let _ = session.apply(Observation::Stalled { waited });
        }
    }

    debug!(project_id = %project_id, "poller stopped");
}
