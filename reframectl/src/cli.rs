use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use reframe_model::{DownloadQuality, ExportFormat, Grouping};

#[derive(Debug, Parser)]
#[command(
    name = "reframectl",
    version,
    about = "Upload design files, review analysis, and generate platform formats"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Config file (TOML or JSON); overrides REFRAME_CONFIG_PATH
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend origin, e.g. http://localhost:8000
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Status polling interval, e.g. "3s" or "500ms"
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow a project's status until it settles
    Watch {
        project_id: String,
        /// Keep watching after analysis finishes instead of exiting at review
        #[arg(long)]
        wait_review: bool,
    },
    /// Create a project from local files and wait for analysis
    Upload {
        name: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Generate output formats for an analysed project
    Generate {
        project_id: String,
        /// Format id from `reframectl formats`; repeat for several
        #[arg(long = "format", short = 'f', required = true)]
        formats: Vec<String>,
        /// Free-text guidance for the generator
        #[arg(long)]
        prompt: Option<String>,
    },
    /// List available output formats
    Formats,
    /// Download generated assets as an archive
    Download {
        #[arg(required = true)]
        asset_ids: Vec<String>,
        /// Directory the archive is written to
        #[arg(long, short = 'o', default_value = ".")]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportArg::Jpeg)]
        format: ExportArg,
        #[arg(long, value_enum, default_value_t = QualityArg::High)]
        quality: QualityArg,
        #[arg(long, value_enum, default_value_t = GroupingArg::Individual)]
        grouping: GroupingArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportArg {
    Jpeg,
    Png,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QualityArg {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GroupingArg {
    Individual,
    Batch,
    Category,
}

impl From<ExportArg> for ExportFormat {
    fn from(val: ExportArg) -> Self {
        match val {
            ExportArg::Jpeg => ExportFormat::Jpeg,
            ExportArg::Png => ExportFormat::Png,
        }
    }
}

impl From<QualityArg> for DownloadQuality {
    fn from(val: QualityArg) -> Self {
        match val {
            QualityArg::High => DownloadQuality::High,
            QualityArg::Medium => DownloadQuality::Medium,
            QualityArg::Low => DownloadQuality::Low,
        }
    }
}

impl From<GroupingArg> for Grouping {
    fn from(val: GroupingArg) -> Self {
        match val {
            GroupingArg::Individual => Grouping::Individual,
            GroupingArg::Batch => Grouping::Batch,
            GroupingArg::Category => Grouping::Category,
        }
    }
}
