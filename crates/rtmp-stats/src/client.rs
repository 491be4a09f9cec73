//! HTTP probe for the statistics endpoint.

use std::time::Duration;

use tracing::trace;

use crate::{StatsError, StreamSample, parse_stats};

/// Total timeout for one probe round trip. The decision loop runs at a
/// sub-second cadence, so a probe must never outlive one poll interval by
/// much.
pub const DEFAULT_STATS_TIMEOUT: Duration = Duration::from_millis(1500);

/// Fetches and parses the statistics document for one named stream.
///
/// Every call to [`StatsClient::sample`] performs a fresh fetch; nothing is
/// cached.
#[derive(Debug, Clone)]
pub struct StatsClient {
    http: reqwest::Client,
    url: String,
    app_name: String,
    stream_name: String,
}

impl StatsClient {
    /// Create a probe for `stream_name` inside `app_name` at `url`.
    pub fn new(
        url: impl Into<String>,
        app_name: impl Into<String>,
        stream_name: impl Into<String>,
    ) -> Result<Self, StatsError> {
        Self::with_timeout(url, app_name, stream_name, DEFAULT_STATS_TIMEOUT)
    }

    /// Create a probe with a custom total timeout.
    pub fn with_timeout(
        url: impl Into<String>,
        app_name: impl Into<String>,
        stream_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StatsError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rtmp-stats/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            app_name: app_name.into(),
            stream_name: stream_name.into(),
        })
    }

    /// Fetch one fresh sample.
    ///
    /// Network errors, non-2xx responses and malformed documents are all
    /// errors; the caller decides whether to treat them as an absent stream.
    pub async fn sample(&self) -> Result<StreamSample, StatsError> {
        let response = self.http.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StatsError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let sample = parse_stats(&body, &self.app_name, &self.stream_name)?;
        trace!(
            exists = sample.exists,
            publishing = sample.publishing,
            bw_video = sample.video_bw_bps,
            "sampled {}/{}",
            self.app_name,
            self.stream_name,
        );
        Ok(sample)
    }
}
