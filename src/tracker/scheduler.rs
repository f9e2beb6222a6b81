//! Concurrent fan-out of scrape requests across trackers.
//!
//! Work is grouped by tracker URL, dispatched as one task per tracker, and
//! merged into a mapping keyed by hex info hash. A tracker that fails in
//! any way simply contributes nothing; only hash validation at the API
//! boundary surfaces an error to the caller.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use url::Url;

use super::{
    HttpScrapeClient, InfoHash, ScrapeError, ScrapeResult, ScrapeStats, TrackerClient,
    TrackerStats, UdpScrapeClient,
};
use crate::config::ScrapeConfig;

/// Concurrent scrape scheduler over a set of trackers.
///
/// Owns the configuration and constructs the per-tracker transport clients
/// by URL scheme. All tracker tasks run concurrently; one task's failure or
/// timeout never affects another.
#[derive(Debug, Clone, Default)]
pub struct Scraper {
    config: ScrapeConfig,
}

impl Scraper {
    /// Creates a scheduler with the given configuration.
    pub fn new(config: ScrapeConfig) -> Self {
        Self { config }
    }

    /// Scrapes every tracker for every info hash.
    ///
    /// Returns a mapping with an entry for every input hash; hashes no
    /// tracker answered for map to an empty list. Per-tracker failures are
    /// logged and otherwise silent.
    ///
    /// # Errors
    /// - `ScrapeError::InvalidInfoHash` - A hash failed validation (raised
    ///   before any network I/O)
    pub async fn scrape_info_hashes(
        &self,
        info_hashes: &[String],
        trackers: &[String],
    ) -> Result<ScrapeResult, ScrapeError> {
        let hashes = parse_info_hashes(info_hashes)?;
        let work = trackers
            .iter()
            .map(|tracker| (tracker.clone(), hashes.clone()))
            .collect();
        Ok(self.dispatch(work, &hashes).await)
    }

    /// Scrapes each hash against its own tracker list.
    ///
    /// Builds the reverse index tracker → hashes so every tracker is
    /// queried exactly once with the subset of hashes it is responsible
    /// for.
    ///
    /// # Errors
    /// - `ScrapeError::InvalidInfoHash` - A hash failed validation (raised
    ///   before any network I/O)
    pub async fn batch_scrape_info_hashes(
        &self,
        items: &[(String, Vec<String>)],
    ) -> Result<ScrapeResult, ScrapeError> {
        let mut all_hashes = Vec::new();
        let mut seen = HashSet::new();
        let mut by_tracker: HashMap<String, Vec<InfoHash>> = HashMap::new();

        for (hash_str, trackers) in items {
            let info_hash = InfoHash::from_hex(hash_str)?;
            if seen.insert(info_hash) {
                all_hashes.push(info_hash);
            }
            for tracker in trackers {
                let hashes = by_tracker.entry(tracker.clone()).or_default();
                if !hashes.contains(&info_hash) {
                    hashes.push(info_hash);
                }
            }
        }

        let work = by_tracker.into_iter().collect();
        Ok(self.dispatch(work, &all_hashes).await)
    }

    /// Dispatches one task per tracker and merges the results.
    async fn dispatch(&self, work: Vec<(String, Vec<InfoHash>)>, all_hashes: &[InfoHash]) -> ScrapeResult {
        let mut results: ScrapeResult = all_hashes
            .iter()
            .map(|info_hash| (info_hash.to_string(), Vec::new()))
            .collect();

        let mut tasks = Vec::with_capacity(work.len());
        for (tracker_url, hashes) in work {
            let config = self.config.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = tokio::time::timeout(
                    config.network.scrape_timeout,
                    scrape_one_tracker(&tracker_url, &hashes, &config),
                )
                .await;

                match outcome {
                    Ok(Ok(stats)) => Some((tracker_url, stats)),
                    Ok(Err(error)) => {
                        tracing::warn!("tracker {tracker_url} failed: {error}");
                        None
                    }
                    Err(_) => {
                        tracing::warn!("tracker {tracker_url} exceeded the scrape timeout");
                        None
                    }
                }
            }));
        }

        for joined in join_all(tasks).await {
            let Ok(Some((tracker_url, stats))) = joined else {
                continue;
            };
            for (info_hash, scrape_stats) in stats {
                if let Some(entries) = results.get_mut(&info_hash.to_string()) {
                    entries.push(TrackerStats {
                        tracker_url: tracker_url.clone(),
                        seeders: scrape_stats.complete,
                        peers: scrape_stats.incomplete,
                        complete: scrape_stats.downloaded,
                    });
                }
            }
        }

        results
    }
}

/// Scrapes one tracker, selecting the transport by URL scheme.
async fn scrape_one_tracker(
    tracker_url: &str,
    hashes: &[InfoHash],
    config: &ScrapeConfig,
) -> Result<HashMap<InfoHash, ScrapeStats>, ScrapeError> {
    let url = Url::parse(tracker_url)?;
    let client: Box<dyn TrackerClient> = match url.scheme() {
        "http" | "https" => Box::new(HttpScrapeClient::new(
            tracker_url.to_string(),
            &config.network,
        )),
        "udp" => Box::new(UdpScrapeClient::new(
            tracker_url.to_string(),
            config.udp.clone(),
        )),
        _ => {
            return Err(ScrapeError::UnsupportedUrl {
                url: tracker_url.to_string(),
            });
        }
    };
    client.scrape(hashes).await
}

/// Validates hex hashes at the API boundary.
fn parse_info_hashes(info_hashes: &[String]) -> Result<Vec<InfoHash>, ScrapeError> {
    info_hashes
        .iter()
        .map(|hash_str| InfoHash::from_hex(hash_str))
        .collect()
}

/// Scrapes every tracker for every info hash with default configuration.
///
/// # Errors
/// - `ScrapeError::InvalidInfoHash` - A hash failed validation
pub async fn scrape_info_hashes(
    info_hashes: &[String],
    trackers: &[String],
) -> Result<ScrapeResult, ScrapeError> {
    Scraper::new(ScrapeConfig::default())
        .scrape_info_hashes(info_hashes, trackers)
        .await
}

/// Scrapes each hash against its own tracker list with default
/// configuration.
///
/// # Errors
/// - `ScrapeError::InvalidInfoHash` - A hash failed validation
pub async fn batch_scrape_info_hashes(
    items: &[(String, Vec<String>)],
) -> Result<ScrapeResult, ScrapeError> {
    Scraper::new(ScrapeConfig::default())
        .batch_scrape_info_hashes(items)
        .await
}

/// Reduces a scrape result to the maximum seeder count per hash.
///
/// Hashes with no tracker responses map to 0.
pub fn find_max_seeders(results: &ScrapeResult) -> HashMap<String, u32> {
    results
        .iter()
        .map(|(info_hash, entries)| {
            let max = entries.iter().map(|stats| stats.seeders).max().unwrap_or(0);
            (info_hash.clone(), max)
        })
        .collect()
}
