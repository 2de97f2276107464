//! Dual-catalog movie metadata harvester.
//!
//! Identifiers flow one at a time from an [`source::IdentifierSource`] through the
//! [`controller::RunController`]: cross-reference resolution against TMDB, detail
//! fetches from TMDB and OMDb, [`merge::merge`], and finally a [`sink::RecordSink`].

pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod finance;
pub mod logging;
pub mod merge;
pub mod model;
pub mod omdb;
pub mod sink;
pub mod source;
pub mod tmdb;

pub use catalog::{DetailFetcher, ListingEntry, PopularPages, Resolver, build_http_client};
pub use config::{CatalogEndpoint, ConfigOverrides, FailurePolicy, FileConfig, HarvestConfig};
pub use controller::{
    ItemFailure, ItemObserver, ItemOutcome, ItemReport, RunController, RunSettings, RunState,
    RunStatus, RunSummary, Upstreams,
};
pub use error::{Catalog, FetchError, HarvestError, MergeError, SinkError};
pub use finance::Financials;
pub use logging::{LogHandle, LoggingError, RunLog, init_logging};
pub use model::{MergedRecord, Namespace, RawDetail, Resolution, ResolvedPair, WorkItem};
pub use omdb::OmdbClient;
pub use sink::{CsvRow, CsvSink, FileNaming, JsonDirSink, RecordSink};
pub use source::{EnumeratedIds, IdentifierSource, PopularListing, SourceError};
pub use tmdb::TmdbClient;
