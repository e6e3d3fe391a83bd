use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use reframe_core::{StatusSnapshot, UploadFile, WorkflowController};
use reframe_model::{AssetId, DownloadOptions, FormatId, ProjectId, ProjectStatus};
use tokio::sync::watch;
use tracing::info;

use crate::render;

/// Where a followed project settled.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Settled {
    Completed,
    Failed,
    Review,
    /// Analysis finished but the preview could not be loaded.
    PreviewUnavailable(String),
    /// Back at review with an error after a generation attempt.
    RolledBack(String),
}

impl Settled {
    fn exit_code(&self) -> ExitCode {
        match self {
            Settled::Completed | Settled::Review => ExitCode::SUCCESS,
            Settled::Failed
            | Settled::PreviewUnavailable(_)
            | Settled::RolledBack(_) => ExitCode::FAILURE,
        }
    }
}

/// Print every distinct status line until `settled` returns an outcome.
async fn follow(
    rx: &mut watch::Receiver<Option<StatusSnapshot>>,
    mut settled: impl FnMut(&StatusSnapshot) -> Option<Settled>,
) -> Result<(Settled, StatusSnapshot)> {
    let mut last_line = None;
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(snapshot) = current {
            let line = render::status_line(&snapshot);
            if last_line.as_ref() != Some(&line) {
                println!("{line}");
                last_line = Some(line);
            }
            if let Some(outcome) = settled(&snapshot) {
                return Ok((outcome, snapshot));
            }
        }
        if rx.changed().await.is_err() {
            bail!("workflow controller shut down");
        }
    }
}

fn analysis_settled(snapshot: &StatusSnapshot) -> Option<Settled> {
    match snapshot.status() {
        ProjectStatus::Failed => Some(Settled::Failed),
        ProjectStatus::Completed => Some(Settled::Completed),
        ProjectStatus::ReadyForReview if snapshot.pending().is_none() => {
            match snapshot.last_error() {
                Some(error) if snapshot.review_assets().is_empty() => {
                    Some(Settled::PreviewUnavailable(error.to_string()))
                }
                _ => Some(Settled::Review),
            }
        }
        _ => None,
    }
}

fn generation_settled(snapshot: &StatusSnapshot) -> Option<Settled> {
    match snapshot.display_status() {
        ProjectStatus::Completed if snapshot.pending().is_none() => {
            Some(Settled::Completed)
        }
        ProjectStatus::Failed => Some(Settled::Failed),
        ProjectStatus::ReadyForReview => Some(Settled::RolledBack(
            snapshot
                .last_error()
                .unwrap_or("generation did not complete")
                .to_string(),
        )),
        _ => None,
    }
}

fn print_settled(outcome: &Settled, snapshot: &StatusSnapshot) {
    match outcome {
        Settled::Review => print!("{}", render::review_assets(snapshot.review_assets())),
        Settled::Completed => {
            print!("{}", render::generated_assets(snapshot.generated_assets()))
        }
        Settled::PreviewUnavailable(error) => {
            eprintln!("preview unavailable: {error}")
        }
        Settled::RolledBack(error) => eprintln!("generation rolled back: {error}"),
        Settled::Failed => eprintln!("project {} failed", snapshot.project_id()),
    }
}

pub async fn watch(
    controller: &WorkflowController,
    project_id: String,
    wait_review: bool,
) -> Result<ExitCode> {
    let mut rx = controller.subscribe();
    controller.activate(ProjectId::from(project_id)).await?;

    let (outcome, snapshot) = follow(&mut rx, |snapshot| match analysis_settled(snapshot) {
        Some(Settled::Review) if wait_review => None,
        other => other,
    })
    .await?;
    print_settled(&outcome, &snapshot);
    Ok(outcome.exit_code())
}

pub async fn upload(
    controller: &WorkflowController,
    name: String,
    paths: Vec<PathBuf>,
) -> Result<ExitCode> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        files.push(file);
    }

    let mut rx = controller.subscribe();
    let snapshot = controller.create_project(&name, files).await?;
    println!("created project {}", snapshot.project_id());

    let (outcome, snapshot) = follow(&mut rx, analysis_settled).await?;
    print_settled(&outcome, &snapshot);
    Ok(outcome.exit_code())
}

pub async fn generate(
    controller: &WorkflowController,
    project_id: String,
    formats: Vec<String>,
    prompt: Option<String>,
) -> Result<ExitCode> {
    let mut rx = controller.subscribe();
    controller.activate(ProjectId::from(project_id)).await?;

    let (outcome, snapshot) = follow(&mut rx, analysis_settled).await?;
    if outcome != Settled::Review {
        print_settled(&outcome, &snapshot);
        return Ok(outcome.exit_code());
    }

    let job_id = controller
        .start_generation(formats.into_iter().map(FormatId::from), prompt)
        .await?;
    info!(job_id = %job_id, "generation started");

    let (outcome, snapshot) = follow(&mut rx, generation_settled).await?;
    print_settled(&outcome, &snapshot);
    Ok(outcome.exit_code())
}

pub async fn formats(controller: &WorkflowController) -> Result<ExitCode> {
    let catalog = controller.available_formats().await?;
    if catalog.is_empty() {
        println!("no formats available");
    } else {
        print!("{}", render::format_catalog(&catalog));
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn download(
    controller: &WorkflowController,
    asset_ids: Vec<String>,
    output: &Path,
    options: DownloadOptions,
) -> Result<ExitCode> {
    let ids = asset_ids.into_iter().map(AssetId::from).collect();
    let archive = controller.download_assets(ids, options).await?;

    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("failed to create {}", output.display()))?;
    let path = output.join(&archive.filename);
    tokio::fs::write(&path, &archive.bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("saved {} ({} bytes)", path.display(), archive.bytes.len());
    Ok(ExitCode::SUCCESS)
}
