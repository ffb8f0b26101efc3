//! End-to-end tests of the geocoding and tile pipeline through the public
//! API, against an in-process fake of the search service and tile servers.
//!
//! Run with: `cargo test --test geocode_pipeline`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;

use groupie_geo::coord::GridSettings;
use groupie_geo::geocode::load_entries;
use groupie_geo::{
    AsyncHttpClient, ConfigFile, Coordinates, GeoService, HttpError, ResolveSource, TileCoord,
};

// ============================================================================
// Fake upstream
// ============================================================================

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

/// Answers search queries for a few known cities and serves a PNG for any
/// tile URL. Can be switched off to simulate losing the network.
#[derive(Default)]
struct FakeUpstream {
    offline: AtomicBool,
    searches: AtomicUsize,
    tile_requests: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeUpstream {
    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    fn tile_requests(&self) -> usize {
        self.tile_requests.load(Ordering::SeqCst)
    }

    fn search_body(url: &str) -> Bytes {
        let place = if url.contains("paris") {
            Some((48.8566, 2.3522))
        } else if url.contains("london") {
            Some((51.5074, -0.1278))
        } else {
            None
        };
        match place {
            Some((lat, lon)) => Bytes::from(format!(r#"[{{"lat":"{lat}","lon":"{lon}"}}]"#)),
            None => Bytes::from_static(b"[]"),
        }
    }
}

impl AsyncHttpClient for FakeUpstream {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<Bytes, HttpError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(HttpError::Transport("network unreachable".into()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if url.contains("/search") {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(Self::search_body(url))
        } else {
            self.tile_requests.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(PNG))
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn config(dir: &TempDir) -> ConfigFile {
    let text = format!(
        r#"
[geocode]
endpoint = http://geocoder.test/search
cache_path = {cache}
initial_backoff_ms = 10
post_success_delay_ms = 0
max_parallel = 2

[cache]
debounce_ms = 50

[tiles]
mirrors = http://tiles.test/{{z}}/{{x}}/{{y}}.png
cache_dir = {tiles}
mirror_delay_ms = 0
"#,
        cache = dir.path().join("geocache.json").display(),
        tiles = dir.path().join("tiles").display(),
    );
    ConfigFile::parse(&text).unwrap()
}

async fn service(dir: &TempDir, upstream: &Arc<FakeUpstream>) -> GeoService<Arc<FakeUpstream>> {
    GeoService::with_client(&config(dir), Arc::clone(upstream)).await
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test]
async fn test_cached_location_survives_network_loss() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(FakeUpstream::default());
    let service = service(&dir, &upstream).await;

    let first = service.resolve("paris-france").await.unwrap().unwrap();
    assert_eq!(first.source, ResolveSource::Service);
    assert_eq!(first.coords, Coordinates::new(48.8566, 2.3522));

    upstream.go_offline();

    let second = service.resolve("paris-france").await.unwrap().unwrap();
    assert_eq!(second.source, ResolveSource::Cache);
    assert_eq!(second.coords, first.coords);
    assert_eq!(upstream.searches(), 1);
}

#[tokio::test]
async fn test_batch_with_duplicates_calls_service_once_per_location() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(FakeUpstream::default());
    let service = service(&dir, &upstream).await;

    let outcome = service
        .resolve_all(["london-uk", "london-uk", "paris-france"], None)
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.total(), 2);
    assert_eq!(
        outcome.resolved.get("london-uk"),
        Some(&Coordinates::new(51.5074, -0.1278))
    );
    assert_eq!(
        outcome.resolved.get("paris-france"),
        Some(&Coordinates::new(48.8566, 2.3522))
    );
    assert_eq!(upstream.searches(), 2);
    assert!(upstream.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_unknown_location_fails_without_caching() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(FakeUpstream::default());
    let service = service(&dir, &upstream).await;

    assert_eq!(service.resolve("atlantis-nowhere").await.unwrap(), None);

    let outcome = service
        .resolve_all(["atlantis-nowhere", "paris-france"], None)
        .await;
    assert_eq!(outcome.failed, vec!["atlantis-nowhere".to_string()]);
    assert_eq!(service.cache().size(), 1);
}

#[tokio::test]
async fn test_cache_reloads_from_disk() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(FakeUpstream::default());

    let first = service(&dir, &upstream).await;
    first.resolve_all(["paris-france", "london-uk"], None).await;
    first.shutdown().await;

    let on_disk = load_entries(&dir.path().join("geocache.json"));
    assert_eq!(on_disk.len(), 2);

    upstream.go_offline();
    let second = service(&dir, &upstream).await;
    assert_eq!(second.cache().size(), 2);

    let london = second.resolve("london-uk").await.unwrap().unwrap();
    assert_eq!(london.source, ResolveSource::Cache);
    assert_eq!(upstream.searches(), 2);
}

#[tokio::test]
async fn test_debounced_flush_reaches_disk() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(FakeUpstream::default());
    let service = service(&dir, &upstream).await;

    service.resolve("paris-france").await.unwrap();

    let mut waited = Duration::ZERO;
    while service.cache().flush_count() == 0 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(25)).await;
        waited += Duration::from_millis(25);
    }
    assert_eq!(service.cache().flush_count(), 1);
    assert!(load_entries(&dir.path().join("geocache.json")).contains_key("paris-france"));
}

#[tokio::test]
async fn test_tiles_served_from_disk_when_offline() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(FakeUpstream::default());
    let service = service(&dir, &upstream).await;
    let tile = TileCoord::new(5, 16, 10);

    assert_eq!(service.fetch_tile(tile).await.unwrap().as_ref(), PNG);
    assert!(dir.path().join("tiles").join("5_16_10.png").exists());

    upstream.go_offline();
    assert_eq!(service.fetch_tile(tile).await.unwrap().as_ref(), PNG);
    assert_eq!(upstream.tile_requests(), 1);
}

#[tokio::test]
async fn test_map_area_for_resolved_locations() {
    let dir = TempDir::new().unwrap();
    let upstream = Arc::new(FakeUpstream::default());
    let service = service(&dir, &upstream).await;

    let outcome = service
        .resolve_all(["paris-france", "london-uk"], None)
        .await;
    let points: Vec<Coordinates> = outcome.resolved.values().copied().collect();

    let area = service
        .fetch_area(&points, &GridSettings::default(), None)
        .await
        .unwrap();
    assert!(area.tiles.is_complete());
    assert!(area.grid.len() <= GridSettings::default().max_tiles);
    assert_eq!(upstream.tile_requests() as u64, area.grid.len());

    for point in &points {
        let (px, py) = area.grid.pixel_offset(point);
        let (width, height) = area.grid.pixel_size();
        assert!(px >= 0.0 && px <= width as f64);
        assert!(py >= 0.0 && py <= height as f64);
    }
}
