//! End-to-end region download scenarios against a stubbed online source
//! and an in-memory database.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use atlas_geo::LatLngBounds;
use atlas_offline::stub::StubFileSource;
use atlas_offline::{
    DownloadState, FileService, FileSource, OfflineError, Region, RegionDefinition, RegionObserver,
    RegionStatus, Response, MEMORY_PATH,
};

const STYLE_URL: &str = "http://127.0.0.1:3000/offline/style.json";

struct ChannelObserver {
    status: mpsc::Sender<RegionStatus>,
    errors: mpsc::Sender<OfflineError>,
}

impl RegionObserver for ChannelObserver {
    fn status_changed(&mut self, status: RegionStatus) {
        let _ = self.status.send(status);
    }

    fn error(&mut self, error: OfflineError) {
        let _ = self.errors.send(error);
    }
}

struct DownloadTest {
    service: FileService,
    region: Region,
    status: mpsc::Receiver<RegionStatus>,
    errors: mpsc::Receiver<OfflineError>,
    /// Bytes served by the stub, to compare against the completed size.
    served: Arc<AtomicU64>,
}

impl DownloadTest {
    async fn start(stub: StubFileSource, served: Arc<AtomicU64>) -> Self {
        let service =
            FileService::with_online_source(MEMORY_PATH, "assets", Arc::new(stub) as Arc<dyn FileSource>)
                .unwrap();
        let definition =
            RegionDefinition::new(STYLE_URL, LatLngBounds::world(), 0.0, 0.0, 1.0);
        let region = service.create_region(definition, Vec::new()).await.unwrap();

        let (status_tx, status_rx) = mpsc::channel();
        let (error_tx, error_rx) = mpsc::channel();
        service.set_region_observer(
            &region,
            Box::new(ChannelObserver {
                status: status_tx,
                errors: error_tx,
            }),
        );
        service.set_region_download_state(&region, DownloadState::Active);

        Self {
            service,
            region,
            status: status_rx,
            errors: error_rx,
            served,
        }
    }

    fn wait_until_complete(&self) -> RegionStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .expect("download did not complete in time");
            let status = self
                .status
                .recv_timeout(remaining)
                .expect("status stream ended before completion");
            if status.required_resource_count > 0 && status.complete() {
                return status;
            }
        }
    }
}

fn serving(served: &Arc<AtomicU64>, data: &'static str) -> Response {
    served.fetch_add(data.len() as u64, Ordering::SeqCst);
    Response::from_data(data)
}

const EMPTY_STYLE: &str = r#"{ "version": 8 }"#;

const INLINE_SOURCE_STYLE: &str = r#"{
    "version": 8,
    "sources": {
        "streets": {
            "type": "vector",
            "tiles": ["http://127.0.0.1:3000/offline/{z}-{x}-{y}.vector.pbf"]
        }
    }
}"#;

const GEOJSON_SOURCE_STYLE: &str = r#"{
    "version": 8,
    "sources": {
        "points": { "type": "geojson", "data": "http://127.0.0.1:3000/offline/geojson.json" }
    }
}"#;

const FULL_STYLE: &str = r#"{
    "version": 8,
    "sprite": "http://127.0.0.1:3000/offline/sprite",
    "glyphs": "http://127.0.0.1:3000/offline/{fontstack}/{range}.pbf",
    "sources": {
        "streets": { "type": "vector", "url": "http://127.0.0.1:3000/offline/streets.json" }
    },
    "layers": [
        { "type": "symbol", "layout": { "text-font": ["Open Sans Regular"] } }
    ]
}"#;

const STREETS_TILE_JSON: &str = r#"{
    "tiles": ["http://127.0.0.1:3000/offline/{z}-{x}-{y}.vector.pbf"]
}"#;

#[tokio::test(flavor = "multi_thread")]
async fn test_no_subresources() {
    let served = Arc::new(AtomicU64::new(0));
    let mut stub = StubFileSource::new();
    let counter = Arc::clone(&served);
    stub.style_response = Some(Box::new(move |resource| {
        assert_eq!(resource.url, STYLE_URL);
        serving(&counter, EMPTY_STYLE)
    }));

    let test = DownloadTest::start(stub, served).await;
    let status = test.wait_until_complete();
    assert_eq!(status.completed_resource_count, 1);
    assert_eq!(status.required_resource_count, 1);
    assert_eq!(
        status.completed_resource_size,
        test.served.load(Ordering::SeqCst)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inline_source() {
    let served = Arc::new(AtomicU64::new(0));
    let requested_tiles = Arc::new(Mutex::new(Vec::new()));

    let mut stub = StubFileSource::new();
    let counter = Arc::clone(&served);
    stub.style_response = Some(Box::new(move |_| serving(&counter, INLINE_SOURCE_STYLE)));
    let counter = Arc::clone(&served);
    let tiles = Arc::clone(&requested_tiles);
    stub.tile_response = Some(Box::new(move |resource| {
        tiles
            .lock()
            .unwrap()
            .push(resource.tile_data.clone().unwrap());
        serving(&counter, "tile-bytes")
    }));

    let test = DownloadTest::start(stub, served).await;
    let status = test.wait_until_complete();
    assert_eq!(status.completed_resource_count, 2);
    assert_eq!(
        status.completed_resource_size,
        test.served.load(Ordering::SeqCst)
    );

    let tiles = requested_tiles.lock().unwrap();
    assert_eq!(tiles.len(), 1);
    assert_eq!(
        tiles[0].url_template,
        "http://127.0.0.1:3000/offline/{z}-{x}-{y}.vector.pbf"
    );
    assert_eq!(tiles[0].pixel_ratio, 1);
    assert_eq!((tiles[0].z, tiles[0].x, tiles[0].y), (0, 0, 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_geojson_source() {
    let served = Arc::new(AtomicU64::new(0));

    let mut stub = StubFileSource::new();
    let counter = Arc::clone(&served);
    stub.style_response = Some(Box::new(move |_| serving(&counter, GEOJSON_SOURCE_STYLE)));
    let counter = Arc::clone(&served);
    stub.source_response = Some(Box::new(move |resource| {
        assert_eq!(resource.url, "http://127.0.0.1:3000/offline/geojson.json");
        serving(&counter, r#"{ "type": "FeatureCollection", "features": [] }"#)
    }));

    let test = DownloadTest::start(stub, served).await;
    let status = test.wait_until_complete();
    assert_eq!(status.completed_resource_count, 2);
    assert_eq!(
        status.completed_resource_size,
        test.served.load(Ordering::SeqCst)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_activation() {
    let served = Arc::new(AtomicU64::new(0));

    let mut stub = StubFileSource::new();
    let counter = Arc::clone(&served);
    stub.style_response = Some(Box::new(move |_| serving(&counter, FULL_STYLE)));
    let counter = Arc::clone(&served);
    stub.sprite_image_response = Some(Box::new(move |resource| {
        assert_eq!(resource.url, "http://127.0.0.1:3000/offline/sprite.png");
        serving(&counter, "sprite-image")
    }));
    let counter = Arc::clone(&served);
    stub.sprite_json_response = Some(Box::new(move |resource| {
        assert_eq!(resource.url, "http://127.0.0.1:3000/offline/sprite.json");
        serving(&counter, "{}")
    }));
    let counter = Arc::clone(&served);
    stub.glyphs_response = Some(Box::new(move |_| serving(&counter, "glyph-bytes")));
    let counter = Arc::clone(&served);
    stub.source_response = Some(Box::new(move |resource| {
        assert_eq!(resource.url, "http://127.0.0.1:3000/offline/streets.json");
        serving(&counter, STREETS_TILE_JSON)
    }));
    let counter = Arc::clone(&served);
    stub.tile_response = Some(Box::new(move |_| serving(&counter, "tile-bytes")));

    let test = DownloadTest::start(stub, served).await;
    let status = test.wait_until_complete();
    // style + sprite.png + sprite.json + 256 glyph ranges + TileJSON + one
    // tile at z0.
    assert_eq!(status.completed_resource_count, 261);
    assert_eq!(status.required_resource_count, 261);
    assert_eq!(
        status.completed_resource_size,
        test.served.load(Ordering::SeqCst)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_style_parse_error_is_surfaced() {
    let served = Arc::new(AtomicU64::new(0));
    let mut stub = StubFileSource::new();
    stub.style_response = Some(Box::new(|_| Response::from_data("not a style")));

    let test = DownloadTest::start(stub, served).await;
    let error = test
        .errors
        .recv_timeout(Duration::from_secs(10))
        .expect("no error surfaced");
    assert!(matches!(error, OfflineError::StyleParse(_)));

    // The download stays active so a later activation can retry.
    let status = test.service.region_status(&test.region).await.unwrap();
    assert_eq!(status.download_state, DownloadState::Active);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_style_leaves_region_outstanding() {
    let served = Arc::new(AtomicU64::new(0));
    // Unstubbed kinds answer NotFound. The fetch failure is dropped
    // silently; the style stays outstanding for a later activation.
    let stub = StubFileSource::new();

    let test = DownloadTest::start(stub, served).await;
    assert!(test.errors.recv_timeout(Duration::from_millis(500)).is_err());

    let status = test.service.region_status(&test.region).await.unwrap();
    assert_eq!(status.required_resource_count, 1);
    assert_eq!(status.completed_resource_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_activation_completes_from_store() {
    let served = Arc::new(AtomicU64::new(0));
    let mut stub = StubFileSource::new();
    let counter = Arc::clone(&served);
    stub.style_response = Some(Box::new(move |_| serving(&counter, EMPTY_STYLE)));

    let test = DownloadTest::start(stub, served).await;
    let first = test.wait_until_complete();
    assert_eq!(first.completed_resource_count, 1);

    // Deactivate and reactivate: the second walk finds the style cached
    // and counts it again without another fetch.
    test.service
        .set_region_download_state(&test.region, DownloadState::Inactive);
    test.service
        .set_region_download_state(&test.region, DownloadState::Active);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("second activation did not complete");
        let status = test.status.recv_timeout(remaining).unwrap();
        if status.required_resource_count == 2 && status.complete() {
            assert_eq!(status.completed_resource_count, 2);
            break;
        }
    }
    // A single fetch served the style; the second pass was store-only.
    assert_eq!(test.served.load(Ordering::SeqCst), EMPTY_STYLE.len() as u64);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_of_inactive_region_is_default() {
    let service = FileService::with_online_source(
        MEMORY_PATH,
        "assets",
        Arc::new(StubFileSource::new()) as Arc<dyn FileSource>,
    )
    .unwrap();
    let definition = RegionDefinition::new(STYLE_URL, LatLngBounds::world(), 0.0, 0.0, 1.0);
    let region = service.create_region(definition, Vec::new()).await.unwrap();

    let status = service.region_status(&region).await.unwrap();
    assert_eq!(status.download_state, DownloadState::Inactive);
    assert_eq!(status.completed_resource_count, 0);
    assert_eq!(status.required_resource_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deleted_region_disappears_from_listing() {
    let service = FileService::with_online_source(
        MEMORY_PATH,
        "assets",
        Arc::new(StubFileSource::new()) as Arc<dyn FileSource>,
    )
    .unwrap();
    let definition = RegionDefinition::new(STYLE_URL, LatLngBounds::world(), 0.0, 0.0, 1.0);
    let region = service.create_region(definition, Vec::new()).await.unwrap();
    service.delete_region(region).await.unwrap();

    let regions = service.list_regions().await.unwrap();
    assert!(regions.is_empty());
}
