//! UDP tracker scrape client implementing BEP 15.
//!
//! The protocol is connectionless but session-oriented: a connect handshake
//! yields a 64-bit connection id that authorizes scrape requests for a
//! bounded window. Every request carries a random 32-bit transaction id the
//! server must echo, which is the only defense against stale and spoofed
//! datagrams on the socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use bytes::{Buf, BufMut};
use tokio::net::{UdpSocket, lookup_host};
use tokio::time;
use url::Url;

use super::{InfoHash, ScrapeError, ScrapeStats, TrackerClient};
use crate::config::UdpTrackerConfig;

/// Magic constant opening every connect request.
const PROTOCOL_MAGIC: u64 = 0x41727101980;

const ACTION_CONNECT: u32 = 0;
const ACTION_SCRAPE: u32 = 2;
const ACTION_ERROR: u32 = 3;

/// Every response starts with action and transaction id.
const RESPONSE_HEADER_LEN: usize = 8;
/// Connect response: header plus the 64-bit connection id.
const CONNECT_RESPONSE_LEN: usize = 16;
/// Per-torrent stats triple in a scrape response.
const SCRAPE_STATS_LEN: usize = 12;

/// Maximum hashes per scrape datagram. Keeps the request at
/// 16 + 20 * 74 = 1496 bytes, below typical MTU.
pub const MAX_HASHES_PER_SCRAPE: usize = 74;

/// Receive buffer large enough for any scrape or error response.
const MAX_PACKET_SIZE: usize = 4096;

/// UDP tracker scrape client.
///
/// Each scrape call owns one ephemeral socket, so transaction ids only need
/// to correlate replies against the call's own in-flight request.
pub struct UdpScrapeClient {
    tracker_url: String,
    config: UdpTrackerConfig,
}

/// Live BEP 15 session for one scrape call.
struct UdpSession {
    socket: UdpSocket,
    connection_id: u64,
    acquired_at: Instant,
}

impl UdpScrapeClient {
    /// Creates a UDP scrape client for one tracker.
    pub fn new(tracker_url: String, config: UdpTrackerConfig) -> Self {
        Self {
            tracker_url,
            config,
        }
    }

    /// Resolves the tracker URL to a socket address.
    ///
    /// # Errors
    /// - `ScrapeError::UnsupportedUrl` - URL lacks a host or port
    /// - `ScrapeError::Resolution` - Hostname did not resolve
    async fn resolve_endpoint(&self) -> Result<SocketAddr, ScrapeError> {
        let url = Url::parse(&self.tracker_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| ScrapeError::UnsupportedUrl {
                url: self.tracker_url.clone(),
            })?
            .to_string();
        let port = url.port().ok_or_else(|| ScrapeError::UnsupportedUrl {
            url: self.tracker_url.clone(),
        })?;

        let mut addrs = lookup_host((host.as_str(), port))
            .await
            .map_err(|_| ScrapeError::Resolution { host: host.clone() })?;
        let addr = addrs.next();
        drop(addrs);
        addr.ok_or(ScrapeError::Resolution { host })
    }

    /// Runs the connect handshake and returns the connection id.
    async fn connect(&self, socket: &UdpSocket) -> Result<u64, ScrapeError> {
        let reply = self
            .exchange(
                socket,
                build_connect_request,
                ACTION_CONNECT,
                CONNECT_RESPONSE_LEN,
            )
            .await?;

        let mut cursor = &reply[RESPONSE_HEADER_LEN..CONNECT_RESPONSE_LEN];
        Ok(cursor.get_u64())
    }

    /// Scrapes one batch of at most [`MAX_HASHES_PER_SCRAPE`] hashes.
    async fn scrape_batch(
        &self,
        session: &UdpSession,
        batch: &[InfoHash],
    ) -> Result<Vec<ScrapeStats>, ScrapeError> {
        let connection_id = session.connection_id;
        let expected_len = RESPONSE_HEADER_LEN + SCRAPE_STATS_LEN * batch.len();

        let reply = self
            .exchange(
                &session.socket,
                |transaction_id| build_scrape_request(connection_id, transaction_id, batch),
                ACTION_SCRAPE,
                expected_len,
            )
            .await?;

        if reply.len() != expected_len {
            return Err(ScrapeError::Protocol {
                message: format!(
                    "expected {expected_len} byte scrape reply, got {}",
                    reply.len()
                ),
            });
        }

        parse_scrape_stats(&reply[RESPONSE_HEADER_LEN..], batch.len())
    }

    /// Sends a request and awaits a correlated reply, retransmitting with
    /// exponential backoff.
    ///
    /// Each attempt uses a fresh transaction id. Datagrams that fail
    /// correlation (wrong transaction id or unexpected action) are dropped
    /// and the wait continues within the attempt's window; a correlated
    /// error frame or short reply fails the call immediately.
    async fn exchange<F>(
        &self,
        socket: &UdpSocket,
        build_request: F,
        expected_action: u32,
        minimum_len: usize,
    ) -> Result<Vec<u8>, ScrapeError>
    where
        F: Fn(u32) -> Vec<u8>,
    {
        let mut buf = [0u8; MAX_PACKET_SIZE];

        for attempt in 0..=self.config.max_retransmits {
            let transaction_id: u32 = rand::random();
            let request = build_request(transaction_id);
            socket.send(&request).await?;

            let window = self
                .config
                .initial_retransmit
                .saturating_mul(2u32.saturating_pow(attempt));
            let deadline = Instant::now() + window;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }

                let len = match time::timeout(remaining, socket.recv(&mut buf)).await {
                    Ok(received) => received?,
                    Err(_) => break,
                };
                if len < RESPONSE_HEADER_LEN {
                    continue;
                }

                let mut header = &buf[..RESPONSE_HEADER_LEN];
                let action = header.get_u32();
                let received_transaction = header.get_u32();
                if received_transaction != transaction_id {
                    tracing::debug!(
                        "dropping datagram from {} with unexpected transaction id",
                        self.tracker_url
                    );
                    continue;
                }

                if action == ACTION_ERROR {
                    return Err(ScrapeError::Tracker {
                        message: String::from_utf8_lossy(&buf[RESPONSE_HEADER_LEN..len])
                            .to_string(),
                    });
                }
                if action != expected_action {
                    continue;
                }
                if len < minimum_len {
                    return Err(ScrapeError::Protocol {
                        message: format!("reply of {len} bytes, expected at least {minimum_len}"),
                    });
                }

                return Ok(buf[..len].to_vec());
            }

            tracing::debug!(
                "no reply from {} within {window:?} (attempt {})",
                self.tracker_url,
                attempt + 1
            );
        }

        Err(ScrapeError::Timeout {
            url: self.tracker_url.clone(),
        })
    }
}

#[async_trait]
impl TrackerClient for UdpScrapeClient {
    async fn scrape(
        &self,
        info_hashes: &[InfoHash],
    ) -> Result<HashMap<InfoHash, ScrapeStats>, ScrapeError> {
        let remote = self.resolve_endpoint().await?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(remote).await?;

        let connection_id = self.connect(&socket).await?;
        let mut session = UdpSession {
            socket,
            connection_id,
            acquired_at: Instant::now(),
        };

        let mut stats = HashMap::with_capacity(info_hashes.len());
        for batch in info_hashes.chunks(MAX_HASHES_PER_SCRAPE) {
            // Trackers invalidate the connection id after about a minute.
            if session.acquired_at.elapsed() >= self.config.connection_ttl {
                session.connection_id = self.connect(&session.socket).await?;
                session.acquired_at = Instant::now();
            }

            let batch_stats = self.scrape_batch(&session, batch).await?;
            for (info_hash, batch_stat) in batch.iter().zip(batch_stats) {
                stats.insert(*info_hash, batch_stat);
            }
        }

        Ok(stats)
    }

    fn tracker_url(&self) -> &str {
        &self.tracker_url
    }
}

/// Builds a 16-byte connect request.
fn build_connect_request(transaction_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.put_u64(PROTOCOL_MAGIC);
    buf.put_u32(ACTION_CONNECT);
    buf.put_u32(transaction_id);
    buf
}

/// Builds a scrape request: connection id, action, transaction id, hashes.
fn build_scrape_request(
    connection_id: u64,
    transaction_id: u32,
    info_hashes: &[InfoHash],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + 20 * info_hashes.len());
    buf.put_u64(connection_id);
    buf.put_u32(ACTION_SCRAPE);
    buf.put_u32(transaction_id);
    for info_hash in info_hashes {
        buf.extend_from_slice(info_hash.as_bytes());
    }
    buf
}

/// Parses `count` consecutive (complete, downloaded, incomplete) triples.
fn parse_scrape_stats(payload: &[u8], count: usize) -> Result<Vec<ScrapeStats>, ScrapeError> {
    if payload.len() < SCRAPE_STATS_LEN * count {
        return Err(ScrapeError::Protocol {
            message: format!(
                "scrape payload of {} bytes cannot hold {count} stats triples",
                payload.len()
            ),
        });
    }

    let mut cursor = payload;
    let mut stats = Vec::with_capacity(count);
    for _ in 0..count {
        let complete = cursor.get_u32();
        let downloaded = cursor.get_u32();
        let incomplete = cursor.get_u32();
        stats.push(ScrapeStats {
            complete,
            downloaded,
            incomplete,
        });
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_layout() {
        let request = build_connect_request(0x1234_5678);

        assert_eq!(request.len(), 16);
        assert_eq!(&request[0..8], &0x41727101980u64.to_be_bytes());
        assert_eq!(&request[8..12], &[0, 0, 0, 0]);
        assert_eq!(&request[12..16], &[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_scrape_request_layout() {
        let hashes = [InfoHash::new([0xAA; 20]), InfoHash::new([0xBB; 20])];
        let request = build_scrape_request(0xDEAD_BEEF_CAFE_BABE, 0x0102_0304, &hashes);

        assert_eq!(request.len(), 16 + 40);
        assert_eq!(&request[0..8], &0xDEAD_BEEF_CAFE_BABEu64.to_be_bytes());
        assert_eq!(&request[8..12], &[0, 0, 0, 2]);
        assert_eq!(&request[12..16], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&request[16..36], &[0xAA; 20]);
        assert_eq!(&request[36..56], &[0xBB; 20]);
    }

    #[test]
    fn test_batch_limit_fits_mtu() {
        assert_eq!(16 + 20 * MAX_HASHES_PER_SCRAPE, 1496);
    }

    #[test]
    fn test_parse_scrape_stats() {
        let mut payload = Vec::new();
        payload.put_u32(1022);
        payload.put_u32(14920);
        payload.put_u32(2);
        payload.put_u32(7);
        payload.put_u32(8);
        payload.put_u32(9);

        let stats = parse_scrape_stats(&payload, 2).unwrap();
        assert_eq!(
            stats[0],
            ScrapeStats {
                complete: 1022,
                downloaded: 14920,
                incomplete: 2,
            }
        );
        assert_eq!(
            stats[1],
            ScrapeStats {
                complete: 7,
                downloaded: 8,
                incomplete: 9,
            }
        );
    }

    #[test]
    fn test_parse_scrape_stats_rejects_short_payload() {
        let payload = [0u8; SCRAPE_STATS_LEN];
        assert!(parse_scrape_stats(&payload, 2).is_err());
    }

    #[tokio::test]
    async fn test_resolve_endpoint_requires_port() {
        let client = UdpScrapeClient::new(
            "udp://tracker.example.com/announce".to_string(),
            UdpTrackerConfig::default(),
        );
        let result = client.resolve_endpoint().await;
        assert!(matches!(result, Err(ScrapeError::UnsupportedUrl { .. })));
    }
}
