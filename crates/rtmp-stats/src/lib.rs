//! Client and parser for the nginx-rtmp statistics endpoint.
//!
//! The statistics document is an XML tree of `<server>` → `<application>` →
//! `<stream>` nodes. This crate extracts a single [`StreamSample`] for one
//! named stream inside one named application; everything else in the document
//! is ignored.

mod client;
mod parse;

pub use client::{StatsClient, DEFAULT_STATS_TIMEOUT};
pub use parse::parse_stats;

use thiserror::Error;

/// Errors produced while fetching or parsing the statistics document.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stats endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed statistics document: {0}")]
    Malformed(String),
}

/// A single observation of the monitored stream.
///
/// `video_bw_bps` is bytes per second as reported by nginx-rtmp; `0` when the
/// field is missing or unparsable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSample {
    /// The named stream appears in the statistics document.
    pub exists: bool,
    /// At least one publisher is attached, or the stat marks the stream active.
    pub publishing: bool,
    /// Video bandwidth in bytes per second.
    pub video_bw_bps: u64,
    /// Number of connected clients.
    pub client_count: u32,
}

impl StreamSample {
    /// The sample reported when the application or stream is absent, and the
    /// sample substituted for a failed probe.
    pub fn absent() -> Self {
        Self {
            exists: false,
            publishing: false,
            video_bw_bps: 0,
            client_count: 0,
        }
    }

    /// Video bitrate in kilobits per second.
    pub fn bitrate_kbps(&self) -> f64 {
        (self.video_bw_bps * 8) as f64 / 1000.0
    }

    /// A sample is healthy when the stream exists, is being published, and
    /// meets the minimum bitrate threshold.
    pub fn is_healthy(&self, min_bitrate_kbps: u32) -> bool {
        self.exists && self.publishing && self.bitrate_kbps() >= f64::from(min_bitrate_kbps)
    }
}
