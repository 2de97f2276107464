use std::path::PathBuf;

use cinemerge_core::config::expand_path;
use cinemerge_core::{ConfigOverrides, FailurePolicy, FileNaming, RunLog};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

/// Top-level CLI entrypoint.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cinemerge",
    version,
    about = "Harvest and merge movie metadata from TMDB and OMDb"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Walk the TMDB popularity listing and merge each title with OMDb.
    Popular(PopularArgs),
    /// Merge titles for identifiers read one per line.
    Ids(IdsArgs),
    /// Map IMDb ids to TMDB ids without fetching details.
    Resolve(ResolveArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Popular(_) => "popular",
            Command::Ids(_) => "ids",
            Command::Resolve(_) => "resolve",
        }
    }
}

/// What to do when an upstream request fails for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Stop the whole run.
    Abort,
    /// Count the item as failed and continue.
    Skip,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Abort => FailurePolicy::Abort,
            PolicyArg::Skip => FailurePolicy::Skip,
        }
    }
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Args, Default)]
pub struct GlobalArgs {
    /// Alternate config.toml location.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Failure policy for upstream errors (defaults to abort).
    #[arg(long, global = true, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Pause after each item that reached an upstream catalog, in milliseconds.
    #[arg(long = "pacing-ms", global = true, value_name = "MS")]
    pub pacing_ms: Option<u64>,

    /// Total attempts per upstream request, the first included (default 3).
    #[arg(long = "max-attempts", global = true, value_name = "N")]
    pub max_attempts: Option<usize>,

    /// Also keep a JSON-lines log of the run (`--log-file=PATH`, or per run under the config dir).
    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        require_equals = true
    )]
    pub log_file: Option<Option<PathBuf>>,
}

impl GlobalArgs {
    pub fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            page_budget: None,
            pacing_ms: self.pacing_ms,
            policy: self.policy.map(FailurePolicy::from),
            max_attempts: self.max_attempts,
        }
    }

    pub fn run_log(&self) -> RunLog {
        match &self.log_file {
            None => RunLog::Off,
            Some(None) => RunLog::PerRun,
            Some(Some(path)) => RunLog::At(expand_path(path)),
        }
    }
}

/// Where merged records go.
#[derive(Debug, Clone, Args, Default)]
pub struct OutputArgs {
    /// CSV output file (stdout when omitted).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "dir")]
    pub out: Option<PathBuf>,

    /// Continue an existing CSV file instead of truncating it.
    #[arg(long, action = ArgAction::SetTrue, requires = "out")]
    pub append: bool,

    /// Write one JSON file per title into this directory.
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub dir: Option<PathBuf>,

    /// Name JSON files by TMDB id instead of a running counter.
    #[arg(long = "name-by-id", action = ArgAction::SetTrue, requires = "dir")]
    pub name_by_id: bool,

    /// First counter value for JSON file names (default 1).
    #[arg(
        long = "start-counter",
        value_name = "N",
        requires = "dir",
        conflicts_with = "name_by_id"
    )]
    pub start_counter: Option<u64>,
}

impl OutputArgs {
    pub fn file_naming(&self) -> FileNaming {
        if self.name_by_id {
            FileNaming::RecordId
        } else {
            FileNaming::Counter {
                start: self.start_counter.unwrap_or(1),
            }
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct PopularArgs {
    /// Number of listing pages to walk.
    #[arg(long, value_name = "N")]
    pub pages: Option<u32>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, Args)]
pub struct IdsArgs {
    /// Identifier list, one per line (stdin when omitted).
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// Treat the identifiers as TMDB ids instead of IMDb ids.
    #[arg(long, action = ArgAction::SetTrue)]
    pub internal: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
    /// IMDb ids, one per line (stdin when omitted).
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// CSV output file (stdout when omitted).
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub out: Option<PathBuf>,

    /// Continue an existing CSV file instead of truncating it.
    #[arg(long, action = ArgAction::SetTrue, requires = "out")]
    pub append: bool,
}
