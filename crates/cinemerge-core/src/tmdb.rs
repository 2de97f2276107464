use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::catalog::{DetailFetcher, ListingEntry, PopularPages, Resolver, get_json, join_url};
use crate::config::HarvestConfig;
use crate::error::{Catalog, FetchError, HarvestError};
use crate::model::{RawDetail, Resolution, ResolvedPair};

/// Client for the popularity-ranked catalog: listing, cross-reference and by-id detail.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    http: Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl TmdbClient {
    /// Fails with a configuration error when no TMDB key is configured.
    pub fn new(http: Client, config: &HarvestConfig) -> Result<Self, HarvestError> {
        let api_key = config.tmdb.require_key(Catalog::Tmdb)?.to_string();
        Ok(Self {
            http,
            base_url: config.tmdb.base_url.clone(),
            api_key,
            language: config.language.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

impl DetailFetcher for TmdbClient {
    fn catalog(&self) -> Catalog {
        Catalog::Tmdb
    }

    async fn fetch(&self, id: &str) -> Result<RawDetail, FetchError> {
        let url = self.url(&format!("movie/{}", urlencoding::encode(id)));
        let query = [
            ("api_key", self.api_key.as_str()),
            ("language", self.language.as_str()),
        ];
        let value = get_json(&self.http, Catalog::Tmdb, id, &url, &query).await?;
        Ok(RawDetail::new(value))
    }
}

impl Resolver for TmdbClient {
    async fn resolve(&self, external_id: &str) -> Result<Resolution, FetchError> {
        let url = self.url(&format!("find/{}", urlencoding::encode(external_id)));
        let query = [
            ("external_source", "imdb_id"),
            ("api_key", self.api_key.as_str()),
        ];
        let value = get_json(&self.http, Catalog::Tmdb, external_id, &url, &query).await?;
        let resolution = resolution_from_find(external_id, value)?;
        debug!(external_id, ?resolution, "cross-reference lookup finished");
        Ok(resolution)
    }
}

impl PopularPages for TmdbClient {
    async fn popular_page(&self, page: u32) -> Result<Vec<ListingEntry>, FetchError> {
        let url = self.url("movie/popular");
        let page_label = page.to_string();
        let query = [
            ("api_key", self.api_key.as_str()),
            ("language", self.language.as_str()),
            ("page", page_label.as_str()),
        ];
        let label = format!("popular page {page}");
        let value = get_json(&self.http, Catalog::Tmdb, &label, &url, &query).await?;
        entries_from_popular(&label, value)
    }
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PopularResponse {
    #[serde(default)]
    results: Vec<IdOnly>,
}

/// Pick the first match in catalog order; an empty list is `NotFound`.
pub fn resolution_from_find(external_id: &str, body: Value) -> Result<Resolution, FetchError> {
    let response: FindResponse = serde_json::from_value(body)
        .map_err(|err| FetchError::malformed(Catalog::Tmdb, external_id, err))?;

    let Some(first) = response.movie_results.into_iter().next() else {
        return Ok(Resolution::NotFound);
    };

    let internal_id = first
        .id
        .as_ref()
        .and_then(id_to_string)
        .ok_or_else(|| FetchError::malformed(Catalog::Tmdb, external_id, "match without id"))?;

    Ok(Resolution::Found(ResolvedPair {
        external_id: external_id.to_string(),
        internal_id,
    }))
}

/// Listing rows in server order. Rows without an id are dropped.
pub fn entries_from_popular(label: &str, body: Value) -> Result<Vec<ListingEntry>, FetchError> {
    let response: PopularResponse = serde_json::from_value(body)
        .map_err(|err| FetchError::malformed(Catalog::Tmdb, label, err))?;

    Ok(response
        .results
        .into_iter()
        .filter_map(|row| {
            let id = row.id.as_ref().and_then(id_to_string)?;
            Some(ListingEntry {
                id,
                title: row.title,
            })
        })
        .collect())
}

/// TMDB ids are numeric on the wire but occasionally arrive quoted.
pub(crate) fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_match_wins() {
        let body = json!({
            "movie_results": [{ "id": 278, "title": "The Shawshank Redemption" }, { "id": 9999 }],
            "tv_results": []
        });
        let resolution = resolution_from_find("tt0111161", body).expect("resolves");
        assert_eq!(
            resolution,
            Resolution::Found(ResolvedPair {
                external_id: "tt0111161".to_string(),
                internal_id: "278".to_string(),
            })
        );
    }

    #[test]
    fn quoted_ids_are_accepted() {
        let body = json!({ "movie_results": [{ "id": "278" }] });
        let resolution = resolution_from_find("tt0111161", body).expect("resolves");
        assert!(matches!(resolution, Resolution::Found(pair) if pair.internal_id == "278"));
    }

    #[test]
    fn empty_results_are_not_found() {
        let body = json!({ "movie_results": [], "person_results": [] });
        assert_eq!(
            resolution_from_find("tt0000000", body).expect("valid body"),
            Resolution::NotFound
        );
    }

    #[test]
    fn missing_results_key_is_not_found() {
        assert_eq!(
            resolution_from_find("tt0000000", json!({})).expect("valid body"),
            Resolution::NotFound
        );
    }

    #[test]
    fn malformed_find_body_is_transport_error() {
        let err = resolution_from_find("tt1", json!({ "movie_results": "nope" })).unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));

        let err = resolution_from_find("tt1", json!({ "movie_results": [{}] })).unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[test]
    fn popular_page_keeps_server_order() {
        let body = json!({
            "page": 1,
            "results": [
                { "id": 550, "title": "Fight Club" },
                { "title": "no id" },
                { "id": 13, "title": "Forrest Gump" }
            ]
        });
        let entries = entries_from_popular("popular page 1", body).expect("parses");
        let ids: Vec<_> = entries.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["550", "13"]);
        assert_eq!(entries[0].title.as_deref(), Some("Fight Club"));
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let body = json!({ "page": 600, "results": [], "total_pages": 500 });
        assert!(entries_from_popular("popular page 600", body)
            .expect("parses")
            .is_empty());
    }

    #[test]
    fn client_requires_key() {
        let config = HarvestConfig::default();
        let err = TmdbClient::new(Client::new(), &config).unwrap_err();
        assert!(err.to_string().contains("TMDB_API_KEY"));
    }
}
