//! REST Client (§4.3): paginated GraphQL reads plus the subscribe/snapshot
//! HTTPS endpoints, rate-limited and 429-aware.

use std::time::Duration;

use pnw_protocol::wire::{Page, SnapshotResponse, SubscribeResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::RestError;
use crate::rate_limit::RateLimiter;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Unwraps the `result: <root field>` alias every query in `queries.rs`
/// applies, so the client never needs a bespoke envelope type per kind.
#[derive(serde::Deserialize)]
struct ResultWrapper<T> {
    result: T,
}

pub struct RestClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub rate_limit_quota: u64,
    pub rate_limit_window: Duration,
}

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl RestClient {
    pub fn new(config: RestClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self {
            http,
            base_url: config.base_url,
            api_key: config.api_key,
            limiter: RateLimiter::new(config.rate_limit_quota, config.rate_limit_window),
        }
    }

    /// Issues `GET {base_url}/{path}&api_key=...`, honoring the rate limit
    /// and retrying once on HTTP 429 after force-filling the bucket (§4.3,
    /// §7).
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        loop {
            self.limiter.acquire().await;

            let url = self.build_url(path);
            let response = self.http.get(&url).send().await?;

            if response.status().as_u16() == 429 {
                warn!(path, "rate limited by upstream, filling bucket and retrying");
                self.limiter.force_fill();
                continue;
            }

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(RestError::Http4xx { status, body });
            }

            return Ok(response.json().await?);
        }
    }

    /// Issues a fixed GraphQL query against `/graphql?api_key=...`.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: impl Serialize,
    ) -> Result<T, RestError> {
        #[derive(Serialize)]
        struct Body<'a, V> {
            query: &'a str,
            variables: V,
        }
        #[derive(serde::Deserialize)]
        struct Envelope<T> {
            data: Option<T>,
            #[serde(default)]
            errors: Vec<GraphQlError>,
        }
        #[derive(serde::Deserialize)]
        struct GraphQlError {
            message: String,
        }

        loop {
            self.limiter.acquire().await;
            let url = format!("{}/graphql?api_key={}", self.base_url, self.api_key);
            let response =
                self.http.post(&url).json(&Body { query, variables: &variables }).send().await?;

            if response.status().as_u16() == 429 {
                self.limiter.force_fill();
                continue;
            }
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(RestError::Http4xx { status, body });
            }

            let envelope: Envelope<T> = response.json().await?;
            if !envelope.errors.is_empty() {
                return Err(RestError::GraphQl(
                    envelope.errors.into_iter().map(|e| e.message).collect(),
                ));
            }
            return envelope
                .data
                .ok_or_else(|| RestError::GraphQl(vec!["empty data in response".to_owned()]));
        }
    }

    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<T>, RestError> {
        let wrapper: ResultWrapper<Page<T>> = self
            .graphql(query, serde_json::json!({ "page": page, "pageSize": page_size }))
            .await?;
        Ok(wrapper.result)
    }

    /// Fetches a single record by id (`queries::by_id_query`), used by the
    /// Entity Store to resolve a missing parent row on a required foreign
    /// key violation (§4.7, §7). Returns `None` if upstream has no such id
    /// either — the caller treats that the same as an unresolvable parent.
    pub async fn fetch_by_id<T: DeserializeOwned>(
        &self,
        query: &str,
        id: i64,
    ) -> Result<Option<T>, RestError> {
        #[derive(serde::Deserialize)]
        struct Data<T> {
            data: Vec<T>,
        }
        let wrapper: ResultWrapper<Data<T>> =
            self.graphql(query, serde_json::json!({ "id": [id] })).await?;
        Ok(wrapper.result.data.into_iter().next())
    }

    pub async fn subscribe(&self, path: &str) -> Result<SubscribeResponse, RestError> {
        let sep = if path.contains('?') { "&" } else { "?" };
        self.get_json(&format!("{path}{sep}metadata=true")).await
    }

    pub async fn snapshot<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<SnapshotResponse<T>, RestError> {
        self.get_json(path).await
    }

    fn build_url(&self, path: &str) -> String {
        let sep = if path.contains('?') { "&" } else { "?" };
        format!("{}/{path}{sep}api_key={}", self.base_url, self.api_key)
    }
}
