//! End-to-end HTTP scrape tests against an in-process axum stub tracker.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use spindrift::{ScrapeConfig, Scraper, TrackerStats};

/// Canned response plus a log of every request URI the stub saw.
#[derive(Clone)]
struct StubState {
    uris: Arc<Mutex<Vec<String>>>,
    status: StatusCode,
    body: Arc<Vec<u8>>,
}

async fn stub_handler(State(state): State<StubState>, uri: Uri) -> (StatusCode, Vec<u8>) {
    state.uris.lock().unwrap().push(uri.to_string());
    (state.status, state.body.as_ref().clone())
}

async fn spawn_stub_tracker(status: StatusCode, body: Vec<u8>) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let uris = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        uris: Arc::clone(&uris),
        status,
        body: Arc::new(body),
    };
    let app = Router::new().fallback(stub_handler).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, uris)
}

/// Bencodes a scrape body: `files` mapping raw hashes to counter dicts.
fn scrape_body(entries: &[([u8; 20], u32, u32, u32)]) -> Vec<u8> {
    let mut body = b"d5:filesd".to_vec();
    for (hash, complete, downloaded, incomplete) in entries {
        body.extend_from_slice(b"20:");
        body.extend_from_slice(hash);
        body.extend_from_slice(
            format!(
                "d8:completei{complete}e10:downloadedi{downloaded}e10:incompletei{incomplete}ee"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(b"ee");
    body
}

fn raw_hash(fill: u8) -> [u8; 20] {
    [fill; 20]
}

fn hex_hash(fill: u8) -> String {
    format!("{fill:02x}").repeat(20)
}

fn percent_hash(fill: u8) -> String {
    format!("%{fill:02X}").repeat(20)
}

fn test_scraper() -> Scraper {
    Scraper::new(ScrapeConfig::with_timeout(Duration::from_secs(5)))
}

#[tokio::test]
async fn test_http_scrape_two_hashes_two_trackers() {
    let body_one = scrape_body(&[(raw_hash(0x01), 10, 100, 5), (raw_hash(0x02), 20, 200, 6)]);
    let body_two = scrape_body(&[(raw_hash(0x01), 11, 101, 7), (raw_hash(0x02), 21, 201, 8)]);
    let (addr_one, _) = spawn_stub_tracker(StatusCode::OK, body_one).await;
    let (addr_two, _) = spawn_stub_tracker(StatusCode::OK, body_two).await;

    let tracker_one = format!("http://127.0.0.1:{}/announce", addr_one.port());
    let tracker_two = format!("http://127.0.0.1:{}/announce", addr_two.port());
    let hashes = vec![hex_hash(0x01), hex_hash(0x02)];

    let results = test_scraper()
        .scrape_info_hashes(&hashes, &[tracker_one.clone(), tracker_two.clone()])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for hash in &hashes {
        assert_eq!(results.get(hash).unwrap().len(), 2);
    }

    let first = results.get(&hex_hash(0x01)).unwrap();
    let from_one = first
        .iter()
        .find(|stats| stats.tracker_url == tracker_one)
        .unwrap();
    assert_eq!(
        from_one,
        &TrackerStats {
            tracker_url: tracker_one,
            seeders: 10,
            peers: 5,
            complete: 100,
        }
    );
    let from_two = first
        .iter()
        .find(|stats| stats.tracker_url == tracker_two)
        .unwrap();
    assert_eq!(from_two.seeders, 11);
    assert_eq!(from_two.peers, 7);
    assert_eq!(from_two.complete, 101);
}

#[tokio::test]
async fn test_http_announce_path_rewritten_to_scrape() {
    let body = scrape_body(&[(raw_hash(0x01), 1, 2, 3)]);
    let (addr, uris) = spawn_stub_tracker(StatusCode::OK, body).await;
    let tracker = format!("http://127.0.0.1:{}/announce?passkey=secret", addr.port());

    test_scraper()
        .scrape_info_hashes(&[hex_hash(0x01)], &[tracker])
        .await
        .unwrap();

    let seen = uris.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0],
        format!("/scrape?passkey=secret&info_hash={}", percent_hash(0x01))
    );
}

#[tokio::test]
async fn test_http_non_announce_path_kept() {
    let body = scrape_body(&[(raw_hash(0x01), 1, 2, 3)]);
    let (addr, uris) = spawn_stub_tracker(StatusCode::OK, body).await;
    let tracker = format!("http://127.0.0.1:{}/x", addr.port());

    test_scraper()
        .scrape_info_hashes(&[hex_hash(0x01)], &[tracker])
        .await
        .unwrap();

    let seen = uris.lock().unwrap();
    assert_eq!(seen[0], format!("/x?info_hash={}", percent_hash(0x01)));
}

#[tokio::test]
async fn test_http_404_is_per_tracker_failure() {
    let (addr, _) = spawn_stub_tracker(StatusCode::NOT_FOUND, Vec::new()).await;
    let tracker = format!("http://127.0.0.1:{}/announce", addr.port());
    let hash = hex_hash(0x01);

    let results = test_scraper()
        .scrape_info_hashes(&[hash.clone()], &[tracker])
        .await
        .unwrap();

    assert!(results.get(&hash).unwrap().is_empty());
}

#[tokio::test]
async fn test_http_malformed_body_is_per_tracker_failure() {
    let (addr, _) = spawn_stub_tracker(StatusCode::OK, b"<html>not bencode</html>".to_vec()).await;
    let tracker = format!("http://127.0.0.1:{}/announce", addr.port());
    let hash = hex_hash(0x01);

    let results = test_scraper()
        .scrape_info_hashes(&[hash.clone()], &[tracker])
        .await
        .unwrap();

    assert!(results.get(&hash).unwrap().is_empty());
}

#[tokio::test]
async fn test_http_per_tracker_isolation() {
    let body = scrape_body(&[(raw_hash(0x01), 42, 420, 4)]);
    let (good_addr, _) = spawn_stub_tracker(StatusCode::OK, body).await;
    let good_tracker = format!("http://127.0.0.1:{}/announce", good_addr.port());
    // Nothing listens on the reserved port; the connection is refused.
    let dead_tracker = "http://127.0.0.1:1/announce".to_string();
    let hash = hex_hash(0x01);

    let results = test_scraper()
        .scrape_info_hashes(&[hash.clone()], &[good_tracker.clone(), dead_tracker])
        .await
        .unwrap();

    let entries = results.get(&hash).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tracker_url, good_tracker);
    assert_eq!(entries[0].seeders, 42);
}

#[tokio::test]
async fn test_batch_scrape_one_request_per_tracker() {
    let body_one = scrape_body(&[(raw_hash(0x01), 1, 2, 3)]);
    let body_two = scrape_body(&[(raw_hash(0x02), 4, 5, 6)]);
    let (addr_one, uris_one) = spawn_stub_tracker(StatusCode::OK, body_one).await;
    let (addr_two, uris_two) = spawn_stub_tracker(StatusCode::OK, body_two).await;
    let tracker_one = format!("http://127.0.0.1:{}/announce", addr_one.port());
    let tracker_two = format!("http://127.0.0.1:{}/announce", addr_two.port());

    let items = vec![
        (hex_hash(0x01), vec![tracker_one.clone()]),
        (hex_hash(0x02), vec![tracker_two.clone()]),
    ];
    let results = test_scraper().batch_scrape_info_hashes(&items).await.unwrap();

    // Each tracker saw exactly one request carrying only its own hash.
    let seen_one = uris_one.lock().unwrap();
    assert_eq!(seen_one.len(), 1);
    assert!(seen_one[0].contains(&percent_hash(0x01)));
    assert!(!seen_one[0].contains(&percent_hash(0x02)));

    let seen_two = uris_two.lock().unwrap();
    assert_eq!(seen_two.len(), 1);
    assert!(seen_two[0].contains(&percent_hash(0x02)));
    assert!(!seen_two[0].contains(&percent_hash(0x01)));

    assert_eq!(results.get(&hex_hash(0x01)).unwrap().len(), 1);
    assert_eq!(results.get(&hex_hash(0x02)).unwrap().len(), 1);
}
