//! Tracker scrape protocol implementations and shared domain types.
//!
//! HTTP scrape following the BEP 48 convention and UDP scrape following
//! BEP 15, behind a common [`TrackerClient`] trait. The fan-out scheduler
//! in [`scheduler`] dispatches to the right client by URL scheme.

pub mod bencode;
pub mod http;
pub mod scheduler;
pub mod udp;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

pub use http::HttpScrapeClient;
pub use scheduler::{Scraper, batch_scrape_info_hashes, find_max_seeders, scrape_info_hashes};
pub use udp::UdpScrapeClient;

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
/// Accepted at the API boundary as a 40-character hex string and carried
/// internally as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40-character hex string into an InfoHash.
    ///
    /// Uppercase digits are accepted and normalized; the `Display` form is
    /// always lowercase.
    ///
    /// # Errors
    /// - `ScrapeError::InvalidInfoHash` - Wrong length or non-hex characters
    pub fn from_hex(hash_str: &str) -> Result<Self, ScrapeError> {
        if hash_str.len() != 40 {
            return Err(ScrapeError::InvalidInfoHash {
                reason: format!("expected 40 hex characters, got {}", hash_str.len()),
            });
        }

        let decoded = hex::decode(hash_str).map_err(|_| ScrapeError::InvalidInfoHash {
            reason: format!("non-hex character in {hash_str:?}"),
        })?;

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&decoded);
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Individual torrent statistics as parsed off the wire.
///
/// Field names follow the scrape protocol: `complete` counts seeders,
/// `incomplete` counts leechers, `downloaded` is the cumulative number of
/// completed downloads at this tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Number of seeders (peers with the complete file)
    pub complete: u32,
    /// Total number of completed downloads
    pub downloaded: u32,
    /// Number of leechers (peers still downloading)
    pub incomplete: u32,
}

/// Per-tracker scrape result for one torrent, as returned to callers.
///
/// `seeders` and `peers` mirror the wire `complete`/`incomplete` counters;
/// `complete` carries the cumulative downloaded count, matching the shape
/// of the original scrape API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Tracker URL exactly as passed in by the caller
    pub tracker_url: String,
    /// Number of seeders reported by this tracker
    pub seeders: u32,
    /// Number of leechers reported by this tracker
    pub peers: u32,
    /// Cumulative completed-download count reported by this tracker
    pub complete: u32,
}

/// Aggregated scrape results keyed by lowercase hex info hash.
///
/// Contains an entry for every input hash; hashes no tracker answered for
/// map to an empty list.
pub type ScrapeResult = HashMap<String, Vec<TrackerStats>>;

/// Errors that can occur during scrape operations.
///
/// Only `InvalidInfoHash` ever reaches callers of the scheduler entry
/// points; every other variant is a per-tracker failure that degrades to an
/// absent contribution in the merged result.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Info hash rejected at the API boundary
    #[error("invalid info hash: {reason}")]
    InvalidInfoHash {
        /// What was wrong with the hash string
        reason: String,
    },

    /// Tracker URL has no usable scheme, host, or port
    #[error("unsupported tracker URL: {url}")]
    UnsupportedUrl {
        /// The offending URL
        url: String,
    },

    /// Hostname did not resolve to any address
    #[error("DNS resolution failed for {host}")]
    Resolution {
        /// The hostname that failed to resolve
        host: String,
    },

    /// Retransmission budget exhausted without a usable reply
    #[error("request to {url} timed out")]
    Timeout {
        /// The tracker that never answered
        url: String,
    },

    /// Tracker answered with something the protocol does not allow
    #[error("protocol violation: {message}")]
    Protocol {
        /// What the tracker got wrong
        message: String,
    },

    /// Response body failed bencode decoding
    #[error("malformed response: {reason}")]
    MalformedResponse {
        /// Where decoding went off the rails
        reason: String,
    },

    /// Tracker explicitly rejected the scrape
    #[error("tracker rejected scrape: {message}")]
    Tracker {
        /// The tracker's own error message or HTTP status
        message: String,
    },

    /// Socket-level transport error
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// URL parsing error
    #[error("URL parsing error")]
    UrlParsing(#[from] url::ParseError),

    /// HTTP transport error
    #[error("HTTP error")]
    Http(#[from] reqwest::Error),
}

/// Abstract scrape interface over the tracker transports.
///
/// Implementations handle protocol-specific details (HTTP/UDP) while
/// returning a uniform per-hash stats mapping. A hash the tracker did not
/// report is simply absent from the map.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Retrieves swarm statistics for the given torrents.
    ///
    /// # Errors
    ///
    /// - `ScrapeError::Timeout` - Retransmission budget exhausted
    /// - `ScrapeError::Protocol` - Invalid tracker response format
    /// - `ScrapeError::Tracker` - Tracker explicitly refused the scrape
    async fn scrape(
        &self,
        info_hashes: &[InfoHash],
    ) -> Result<HashMap<InfoHash, ScrapeStats>, ScrapeError>;

    /// Returns the tracker URL for logging and result attribution.
    fn tracker_url(&self) -> &str;
}

/// Clamps a bencoded integer into the 32-bit counter range of the protocol.
pub(crate) fn clamp_counter(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}
