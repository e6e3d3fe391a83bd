use reframe_model::{
    GeneratedAssets, JobId, ProjectId, ProjectStatus, ReviewAsset,
};

/// A backend fetch the reconciler has asked for and not yet seen answered.
///
/// While one of these is outstanding the status is not considered settled:
/// `Preview` and `GenerationStart` only occur in `ready_for_review`, and
/// `Results` only while `generating` the named job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingFetch {
    Preview,
    GenerationStart,
    Results(JobId),
}

/// Reconciled view of one project's workflow state.
///
/// Values are replaced wholesale by the reconciler and never mutated in
/// place by anything else; views read clones through the controller's watch
/// channel.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub(crate) project_id: ProjectId,
    pub(crate) status: ProjectStatus,
    pub(crate) review_assets: Vec<ReviewAsset>,
    pub(crate) active_job_id: Option<JobId>,
    pub(crate) generated_assets: GeneratedAssets,
    pub(crate) last_error: Option<String>,
    pub(crate) progress: Option<u8>,
    pub(crate) pending: Option<PendingFetch>,
}

impl StatusSnapshot {
    /// Placeholder published on activation, before the first status fetch
    /// has answered.
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            status: ProjectStatus::Uploading,
            review_assets: Vec::new(),
            active_job_id: None,
            generated_assets: GeneratedAssets::new(),
            last_error: None,
            progress: None,
            pending: None,
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    /// Status a view should render. Differs from [`status`](Self::status)
    /// only while a generation request is in flight, which is shown as
    /// `generating` before the backend has handed out a job id.
    pub fn display_status(&self) -> ProjectStatus {
        match self.pending {
            Some(PendingFetch::GenerationStart) => ProjectStatus::Generating,
            _ => self.status,
        }
    }

    pub fn review_assets(&self) -> &[ReviewAsset] {
        &self.review_assets
    }

    pub fn active_job_id(&self) -> Option<&JobId> {
        self.active_job_id.as_ref()
    }

    pub fn generated_assets(&self) -> &GeneratedAssets {
        &self.generated_assets
    }

    pub fn generated_asset_count(&self) -> usize {
        self.generated_assets.values().map(Vec::len).sum()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    pub fn pending(&self) -> Option<&PendingFetch> {
        self.pending.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the first structural rule this snapshot breaks, if any.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        let generating = self.status == ProjectStatus::Generating;
        if generating != self.active_job_id.is_some() {
            return Err("generating status and active job id disagree");
        }
        match &self.pending {
            Some(PendingFetch::Results(job)) => {
                if self.active_job_id.as_ref() != Some(job) {
                    return Err("results pending for a job that is not active");
                }
            }
            Some(PendingFetch::Preview | PendingFetch::GenerationStart) => {
                if self.status != ProjectStatus::ReadyForReview {
                    return Err("review fetch pending outside ready_for_review");
                }
            }
            None => {}
        }
        if self.status.is_analysing() && !self.review_assets.is_empty() {
            return Err("review assets present before analysis finished");
        }
        if !self.generated_assets.is_empty()
            && self.status != ProjectStatus::Completed
        {
            return Err("generated assets present before completion");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_starts_uploading_and_valid() {
        let snapshot = StatusSnapshot::new(ProjectId::from("p1"));
        assert_eq!(snapshot.status(), ProjectStatus::Uploading);
        assert!(snapshot.review_assets().is_empty());
        assert!(snapshot.active_job_id().is_none());
        assert_eq!(snapshot.check_invariants(), Ok(()));
    }

    #[test]
    fn generation_start_in_flight_displays_as_generating() {
        let mut snapshot = StatusSnapshot::new(ProjectId::from("p1"));
        snapshot.status = ProjectStatus::ReadyForReview;
        snapshot.pending = Some(PendingFetch::GenerationStart);
        assert_eq!(snapshot.status(), ProjectStatus::ReadyForReview);
        assert_eq!(snapshot.display_status(), ProjectStatus::Generating);
        assert_eq!(snapshot.check_invariants(), Ok(()));
    }

    #[test]
    fn generating_without_job_is_rejected() {
        let mut snapshot = StatusSnapshot::new(ProjectId::from("p1"));
        snapshot.status = ProjectStatus::Generating;
        assert!(snapshot.check_invariants().is_err());

        snapshot.active_job_id = Some(JobId::from("job1"));
        assert_eq!(snapshot.check_invariants(), Ok(()));
    }
}
