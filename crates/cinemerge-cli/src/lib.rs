pub mod cli_args;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use cinemerge_core::config::expand_path;
use cinemerge_core::{
    CsvSink, DetailFetcher, EnumeratedIds, HarvestConfig, IdentifierSource, JsonDirSink,
    MergedRecord, Namespace, OmdbClient, PopularListing, ResolvedPair, Resolver, RunController,
    RunSettings, RunStatus, RunSummary, TmdbClient, Upstreams, build_http_client,
};
use tracing::info;

use crate::cli_args::{Cli, Command, OutputArgs};

type TableSink<T> = CsvSink<Box<dyn Write + Send>, T>;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_ABORTED: i32 = 2;
pub const EXIT_PARTIAL: i32 = 3;
pub const EXIT_STOPPED: i32 = 130;

/// Process exit status for a finished run.
pub fn exit_code(summary: &RunSummary) -> i32 {
    match summary.status {
        RunStatus::Done if summary.state.skipped_error > 0 => EXIT_PARTIAL,
        RunStatus::Done => EXIT_OK,
        RunStatus::Aborted { .. } => EXIT_ABORTED,
        RunStatus::Stopped => EXIT_STOPPED,
    }
}

/// Execute one subcommand. Configuration problems and missing keys surface
/// as errors before any output file is touched.
pub async fn run(cli: Cli, stop: Arc<AtomicBool>) -> Result<RunSummary> {
    let mut overrides = cli.global.to_overrides();
    if let Command::Popular(args) = &cli.command {
        overrides.page_budget = args.pages;
    }
    let config = HarvestConfig::load(cli.global.config.as_deref(), &overrides)
        .context("failed to load configuration")?;
    let http = build_http_client(&config).context("failed to build HTTP client")?;
    let controller = RunController::new(RunSettings::from(&config)).with_stop_flag(stop);

    match cli.command {
        Command::Popular(args) => {
            let tmdb = TmdbClient::new(http.clone(), &config)?;
            let omdb = OmdbClient::new(http, &config)?;
            info!(pages = config.page_budget, "walking popular listing");
            let mut source = PopularListing::new(&tmdb, config.page_budget);
            let upstreams = Upstreams {
                resolver: &tmdb,
                tmdb: &tmdb,
                omdb: &omdb,
            };
            harvest_into(&controller, &upstreams, &mut source, &args.output).await
        }
        Command::Ids(args) => {
            let tmdb = TmdbClient::new(http.clone(), &config)?;
            let omdb = OmdbClient::new(http, &config)?;
            let namespace = if args.internal {
                Namespace::Internal
            } else {
                Namespace::External
            };
            let reader = open_input(args.input.as_deref())?;
            let mut source = EnumeratedIds::new(reader, namespace);
            let upstreams = Upstreams {
                resolver: &tmdb,
                tmdb: &tmdb,
                omdb: &omdb,
            };
            harvest_into(&controller, &upstreams, &mut source, &args.output).await
        }
        Command::Resolve(args) => {
            let tmdb = TmdbClient::new(http, &config)?;
            let reader = open_input(args.input.as_deref())?;
            let mut source = EnumeratedIds::new(reader, Namespace::External);
            let out = args.out.as_deref().map(expand_path);
            let mut sink = TableSink::<ResolvedPair>::open(out.as_deref(), args.append)
                .context("failed to open mapping output")?;
            Ok(controller.resolve_only(&tmdb, &mut source, &mut sink).await)
        }
    }
}

async fn harvest_into<R, A, B, S>(
    controller: &RunController,
    upstreams: &Upstreams<'_, R, A, B>,
    source: &mut S,
    output: &OutputArgs,
) -> Result<RunSummary>
where
    R: Resolver,
    A: DetailFetcher,
    B: DetailFetcher,
    S: IdentifierSource,
{
    if let Some(dir) = &output.dir {
        let dir = expand_path(dir);
        let mut sink = JsonDirSink::new(&dir, output.file_naming())
            .with_context(|| format!("failed to prepare {}", dir.display()))?;
        return Ok(controller.harvest(upstreams, source, &mut sink).await);
    }

    let out = output.out.as_deref().map(expand_path);
    let mut sink = TableSink::<MergedRecord>::open(out.as_deref(), output.append)
        .context("failed to open CSV output")?;
    Ok(controller.harvest(upstreams, source, &mut sink).await)
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead + Send>> {
    match path {
        Some(path) => {
            let path = expand_path(path);
            let file = File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}
