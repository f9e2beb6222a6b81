//! HTTP tracker scrape client with URL building and response parsing.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use url::Url;

use super::bencode::Value;
use super::{InfoHash, ScrapeError, ScrapeStats, TrackerClient, clamp_counter};
use crate::config::NetworkConfig;

/// HTTP tracker scrape client.
///
/// Derives the scrape URL from the announce URL by replacing a trailing
/// `/announce` path segment with `/scrape` (BEP 48 convention); any other
/// path is used as-is with `info_hash` parameters appended.
pub struct HttpScrapeClient {
    tracker_url: String,
    client: reqwest::Client,
}

impl HttpScrapeClient {
    /// Creates an HTTP scrape client for one tracker.
    ///
    /// Uses network configuration for the request timeout and user agent.
    pub fn new(tracker_url: String, config: &NetworkConfig) -> Self {
        Self {
            tracker_url,
            client: reqwest::Client::builder()
                .timeout(config.scrape_timeout)
                .user_agent(config.user_agent)
                .build()
                .expect("HTTP client creation should not fail"),
        }
    }

    /// Builds the scrape URL with one `info_hash` parameter per hash.
    ///
    /// The query string is assembled by hand and installed with
    /// [`Url::set_query`], which preserves percent-sequences; routing the
    /// pre-encoded hashes through `query_pairs_mut` would escape the `%`
    /// signs a second time.
    ///
    /// # Errors
    /// - `ScrapeError::UrlParsing` - Invalid tracker URL
    fn build_scrape_url(&self, info_hashes: &[InfoHash]) -> Result<String, ScrapeError> {
        let mut url = Url::parse(&self.tracker_url)?;

        if let Some(prefix) = url.path().strip_suffix("/announce") {
            let scrape_path = format!("{prefix}/scrape");
            url.set_path(&scrape_path);
        }

        let mut query = url.query().map(str::to_owned).unwrap_or_default();
        for info_hash in info_hashes {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str("info_hash=");
            query.push_str(&percent_encode_bytes(info_hash.as_bytes()));
        }
        url.set_query(Some(&query));

        Ok(url.to_string())
    }

    /// Parses a bencoded scrape response into per-hash stats.
    ///
    /// Only hashes that were actually requested are returned; `files`
    /// entries with malformed keys or missing counters are skipped so that
    /// no partially populated record is ever emitted.
    fn parse_scrape_response(
        response_bytes: &[u8],
        requested: &[InfoHash],
    ) -> Result<HashMap<InfoHash, ScrapeStats>, ScrapeError> {
        let value = Value::decode(response_bytes)?;
        let dict = value.as_dict().ok_or_else(|| ScrapeError::Protocol {
            message: "scrape response is not a dictionary".to_string(),
        })?;

        if let Some(Value::Bytes(failure_reason)) = dict.get(b"failure reason".as_slice()) {
            return Err(ScrapeError::Tracker {
                message: String::from_utf8_lossy(failure_reason).to_string(),
            });
        }

        let requested: HashSet<&InfoHash> = requested.iter().collect();
        let mut stats = HashMap::new();

        if let Some(Value::Dictionary(files)) = dict.get(b"files".as_slice()) {
            for (hash_bytes, entry) in files {
                if hash_bytes.len() != 20 {
                    continue;
                }
                let mut hash = [0u8; 20];
                hash.copy_from_slice(hash_bytes);
                let info_hash = InfoHash::new(hash);
                if !requested.contains(&info_hash) {
                    continue;
                }

                let Some(entry) = entry.as_dict() else {
                    continue;
                };
                let complete = entry.get(b"complete".as_slice()).and_then(Value::as_integer);
                let incomplete = entry
                    .get(b"incomplete".as_slice())
                    .and_then(Value::as_integer);
                let downloaded = entry
                    .get(b"downloaded".as_slice())
                    .and_then(Value::as_integer);

                let (Some(complete), Some(incomplete), Some(downloaded)) =
                    (complete, incomplete, downloaded)
                else {
                    continue;
                };

                stats.insert(
                    info_hash,
                    ScrapeStats {
                        complete: clamp_counter(complete),
                        downloaded: clamp_counter(downloaded),
                        incomplete: clamp_counter(incomplete),
                    },
                );
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl TrackerClient for HttpScrapeClient {
    async fn scrape(
        &self,
        info_hashes: &[InfoHash],
    ) -> Result<HashMap<InfoHash, ScrapeStats>, ScrapeError> {
        let scrape_url = self.build_scrape_url(info_hashes)?;
        tracing::debug!("scraping {} hashes via {scrape_url}", info_hashes.len());

        let response = self.client.get(&scrape_url).send().await?;
        if !response.status().is_success() {
            return Err(ScrapeError::Tracker {
                message: format!("HTTP status {}", response.status()),
            });
        }

        let body = response.bytes().await?;
        Self::parse_scrape_response(&body, info_hashes)
    }

    fn tracker_url(&self) -> &str {
        &self.tracker_url
    }
}

/// Percent-encodes bytes for tracker URL parameters per RFC 3986.
///
/// Unreserved bytes pass through literally; everything else becomes `%XX`.
pub(crate) fn percent_encode_bytes(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
