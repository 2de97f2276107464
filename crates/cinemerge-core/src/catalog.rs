//! Seams between the run controller and the upstream catalogs.
//!
//! The HTTP clients in [`crate::tmdb`] and [`crate::omdb`] implement these traits;
//! tests substitute in-process fakes.

use std::future::Future;

use reqwest::Client;

use crate::config::HarvestConfig;
use crate::error::{Catalog, FetchError, HarvestError};
use crate::model::{RawDetail, Resolution};

/// Maps an external id onto the target catalog's internal id.
pub trait Resolver {
    fn resolve(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Resolution, FetchError>> + Send;
}

/// Fetches full record detail for one id. Implementations never retry.
pub trait DetailFetcher {
    fn catalog(&self) -> Catalog;

    fn fetch(&self, id: &str) -> impl Future<Output = Result<RawDetail, FetchError>> + Send;
}

/// One row of the popularity listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub id: String,
    pub title: Option<String>,
}

/// Paginated "popular items" listing, pages are 1-indexed.
pub trait PopularPages {
    fn popular_page(
        &self,
        page: u32,
    ) -> impl Future<Output = Result<Vec<ListingEntry>, FetchError>> + Send;
}

/// Shared HTTP client for both catalogs.
pub fn build_http_client(config: &HarvestConfig) -> Result<Client, HarvestError> {
    let client = Client::builder()
        .user_agent(concat!("cinemerge/", env!("CARGO_PKG_VERSION")))
        .timeout(config.request_timeout)
        .build()?;
    Ok(client)
}

/// GET `url` and decode the body as JSON, mapping every failure onto [`FetchError`].
pub(crate) async fn get_json(
    client: &Client,
    catalog: Catalog,
    id: &str,
    url: &str,
    query: &[(&str, &str)],
) -> Result<serde_json::Value, FetchError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|err| FetchError::from_reqwest(catalog, id, &err))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::status(catalog, id, status.as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|err| FetchError::from_reqwest(catalog, id, &err))?;
    serde_json::from_slice(&body).map_err(|err| FetchError::malformed(catalog, id, err))
}

/// Join a base URL and a path without doubling or dropping the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{path}")
    }
}
