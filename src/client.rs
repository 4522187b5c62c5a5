//! Kandilli earthquake API client.
//!
//! Provides async HTTP access to the Kandilli feed endpoints.
//! Uses reqwest with rustls for TLS.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::errors::QuakewatchError;
use crate::filters::{FilterCriteria, QueryPlan};
use crate::models::{Envelope, RawEnvelope};

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for API requests.
const USER_AGENT: &str = concat!("quakewatch/", env!("CARGO_PKG_VERSION"));

/// Kandilli API base URL.
const KANDILLI_BASE_URL: &str = "https://api.orhanaydogdu.com.tr/deprem";

/// Feed access seam consumed by the scheduler.
///
/// Implemented by [`KandilliClient`] for the real API and by scripted
/// sources in scheduler tests.
#[async_trait]
pub trait FeedSource {
    /// Execute one fetch according to the routing plan.
    async fn fetch(&self, plan: &QueryPlan) -> Result<Envelope, QuakewatchError>;
}

/// Client for the Kandilli earthquake API.
pub struct KandilliClient {
    client: Client,
    base_url: String,
}

impl KandilliClient {
    /// Create a client against the public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new() -> Result<Self, QuakewatchError> {
        Self::with_base_url(KANDILLI_BASE_URL.to_owned())
    }

    /// Create a client against a custom base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_base_url(base_url: String) -> Result<Self, QuakewatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Fetch the rolling live feed (roughly the last 24 hours).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is unusable.
    #[instrument(skip(self))]
    pub async fn fetch_live(&self) -> Result<Envelope, QuakewatchError> {
        self.fetch_envelope(self.endpoint("live"), &[]).await
    }

    /// Fetch the filtered feed with the given criteria.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is unusable.
    #[instrument(skip(self, criteria), fields(criteria = ?criteria.query_pairs()))]
    pub async fn fetch_filtered(
        &self,
        criteria: &FilterCriteria,
    ) -> Result<Envelope, QuakewatchError> {
        self.fetch_envelope(self.endpoint("filtered"), &criteria.query_pairs())
            .await
    }

    /// Fetch the `limit` most recent events.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is unusable.
    #[instrument(skip(self))]
    pub async fn fetch_latest(&self, limit: usize) -> Result<Envelope, QuakewatchError> {
        self.fetch_envelope(self.endpoint(&format!("latest/{limit}")), &[])
            .await
    }

    /// Fetch events near a province, by provider city code.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is unusable.
    #[instrument(skip(self, criteria))]
    pub async fn fetch_city(
        &self,
        city_code: u32,
        criteria: &FilterCriteria,
    ) -> Result<Envelope, QuakewatchError> {
        self.fetch_envelope(
            self.endpoint(&format!("city/{city_code}")),
            &criteria.query_pairs(),
        )
        .await
    }

    /// Fetch the archived feed for a calendar month.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is unusable.
    #[instrument(skip(self))]
    pub async fn fetch_historical(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Envelope, QuakewatchError> {
        self.fetch_envelope(self.endpoint(&format!("historical/{year}/{month}")), &[])
            .await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/kandilli/{path}", self.base_url)
    }

    async fn fetch_envelope(
        &self,
        url: String,
        query: &[(&'static str, String)],
    ) -> Result<Envelope, QuakewatchError> {
        debug!("fetching {}", url);

        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;

        // Check status before parsing
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuakewatchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let raw: RawEnvelope = response.json().await?;
        let envelope = raw.accept()?;

        debug!(
            "accepted {} events ({} dropped)",
            envelope.events.len(),
            envelope.dropped
        );
        Ok(envelope)
    }
}

#[async_trait]
impl FeedSource for KandilliClient {
    async fn fetch(&self, plan: &QueryPlan) -> Result<Envelope, QuakewatchError> {
        match plan {
            QueryPlan::Live => self.fetch_live().await,
            QueryPlan::Filtered(criteria) => self.fetch_filtered(criteria).await,
        }
    }
}
