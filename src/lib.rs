//! Spindrift - concurrent BitTorrent tracker scraping
//!
//! Queries swarm statistics (seeders, leechers, completed downloads) for a
//! set of torrents across HTTP(S) and UDP trackers, concurrently, and
//! aggregates the answers per info hash. UDP trackers are spoken to in the
//! BEP 15 connect/scrape dialect with retransmission and batching; HTTP
//! trackers via the conventional `/scrape` endpoint.
//!
//! Per-tracker failures (DNS, timeouts, protocol violations, explicit
//! rejections) never fail a call; they degrade to an absent contribution in
//! the merged result. Only malformed info hashes are surfaced to callers.

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]

pub mod config;
pub mod tracker;

// Re-export the public API surface
pub use config::{NetworkConfig, ScrapeConfig, UdpTrackerConfig};
pub use tracker::{
    InfoHash, ScrapeError, ScrapeResult, Scraper, TrackerStats, batch_scrape_info_hashes,
    find_max_seeders, scrape_info_hashes,
};
