use reqwest::Client;
use serde_json::Value;

use crate::catalog::{DetailFetcher, get_json, join_url};
use crate::config::HarvestConfig;
use crate::error::{Catalog, FetchError, HarvestError};
use crate::model::RawDetail;

/// Client for the ratings/plot catalog, keyed by IMDb id.
#[derive(Debug, Clone)]
pub struct OmdbClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OmdbClient {
    /// Fails with a configuration error when no OMDb key is configured.
    pub fn new(http: Client, config: &HarvestConfig) -> Result<Self, HarvestError> {
        let api_key = config.omdb.require_key(Catalog::Omdb)?.to_string();
        Ok(Self {
            http,
            base_url: config.omdb.base_url.clone(),
            api_key,
        })
    }
}

impl DetailFetcher for OmdbClient {
    fn catalog(&self) -> Catalog {
        Catalog::Omdb
    }

    async fn fetch(&self, id: &str) -> Result<RawDetail, FetchError> {
        let url = join_url(&self.base_url, "");
        let query = [("i", id), ("apikey", self.api_key.as_str())];
        let value = get_json(&self.http, Catalog::Omdb, id, &url, &query).await?;
        interpret_response(id, value)
    }
}

/// OMDb answers 200 with `{"Response": "False", "Error": …}` for unknown ids.
pub fn interpret_response(id: &str, value: Value) -> Result<RawDetail, FetchError> {
    if !value.is_object() {
        return Err(FetchError::malformed(Catalog::Omdb, id, "expected a JSON object"));
    }

    let flag = value
        .get("Response")
        .and_then(Value::as_str)
        .map(str::trim);
    if flag.is_some_and(|flag| flag.eq_ignore_ascii_case("false")) {
        return Err(FetchError::not_found(Catalog::Omdb, id));
    }

    Ok(RawDetail::new(value))
}
