//! Integration tests for the acquisition pass.
//!
//! A local axum server stands in for the BBBC host. It counts GET and HEAD
//! requests separately so the tests can assert exactly how much network
//! traffic a pass caused.

use axum::{
    body::{Body, Bytes},
    extract::{Path as UrlPath, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bbbc_datasets::cache::list_files;
use bbbc_datasets::{
    ArtifactRole, CacheConfig, DatasetCache, DatasetDescriptor, FetchState, HttpClient,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;

struct MockHost {
    files: HashMap<String, Vec<u8>>,
    gets: AtomicUsize,
    heads: AtomicUsize,
}

impl MockHost {
    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }
}

async fn serve_file(
    State(host): State<Arc<MockHost>>,
    method: Method,
    UrlPath(name): UrlPath<String>,
) -> Response {
    if method == Method::HEAD {
        host.heads.fetch_add(1, Ordering::SeqCst);
    } else {
        host.gets.fetch_add(1, Ordering::SeqCst);
    }
    match host.files.get(&name) {
        Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

const SLOW_CHUNKS: usize = 8;
const SLOW_CHUNK_LEN: usize = 1024;

/// Stream a body in small chunks with a pause before each one.
async fn serve_slowly() -> Response {
    let chunks = futures::stream::iter(0..SLOW_CHUNKS).then(|_| async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        Ok::<_, std::io::Error>(Bytes::from(vec![1u8; SLOW_CHUNK_LEN]))
    });
    Body::from_stream(chunks).into_response()
}

/// Start a mock host serving `files` under `/files/<name>` and a slow body
/// under `/slow/<name>`; returns the base URL of `/files`.
async fn start_host(files: Vec<(&str, Vec<u8>)>) -> (String, Arc<MockHost>) {
    let host = Arc::new(MockHost {
        files: files
            .into_iter()
            .map(|(name, bytes)| (name.to_string(), bytes))
            .collect(),
        gets: AtomicUsize::new(0),
        heads: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/files/:name", get(serve_file))
        .route("/slow/:name", get(serve_slowly))
        .with_state(host.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/files", addr), host)
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Every file under `root`, relative to it, sorted.
fn snapshot(root: &Path) -> Vec<PathBuf> {
    list_files(root, true)
        .into_iter()
        .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
        .collect()
}

#[tokio::test]
async fn test_mixed_descriptor_scenario() {
    let images = zip_bytes(&[
        ("a/cell_1.png", b"png"),
        ("a/cell_2.jpg", b"jpg"),
        ("a/stack/cell_3.tif", b"tif"),
        ("a/README.txt", b"not an image"),
    ]);
    let (base, host) = start_host(vec![
        ("a.zip", images),
        ("b.csv", b"ImageId,EncodedPixels\n".to_vec()),
    ])
    .await;

    let descriptor = DatasetDescriptor::from_json(&format!(
        r#"{{
            "image_paths": ["{base}/a.zip"],
            "label_path": "{base}/b.csv",
            "local_path": "ignored"
        }}"#
    ))
    .unwrap();

    let storage = TempDir::new().unwrap();
    let cache = DatasetCache::open("scenario", descriptor, &CacheConfig::with_storage_root(storage.path()))
        .await
        .unwrap();

    assert_eq!(host.gets(), 2);
    assert!(cache.root().join("a.zip").is_file());
    assert!(cache.root().join("images").join("a").is_dir());

    let images = cache.image_paths();
    assert_eq!(file_names(&images), vec!["cell_1.png", "cell_2.jpg", "cell_3.tif"]);
    assert!(images.iter().all(|p| p.is_absolute()));

    let csv = cache.root().join("b.csv");
    assert!(csv.is_file());
    assert_eq!(cache.ground_truth(ArtifactRole::Label), Some(csv.as_path()));
    assert!(!cache.root().join("labels").exists());
    assert!(cache.label_paths().is_empty());

    let report = cache.report();
    assert_eq!(report.downloaded(), 2);
    assert_eq!(report.count(FetchState::Extracted), 1);
    assert_eq!(report.count(FetchState::GroundTruthRecorded), 1);
    assert_eq!(report.failed(), 0);
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let (base, host) = start_host(vec![
        ("images.zip", zip_bytes(&[("images/x.png", b"x"), ("images/y.png", b"y")])),
        ("masks.zip", zip_bytes(&[("masks/x.png", b"mx")])),
        ("metadata.zip", zip_bytes(&[("metadata/split.csv", b"x,train")])),
    ])
    .await;

    let descriptor = DatasetDescriptor::new()
        .with_urls("image_paths", [format!("{}/images.zip", base)])
        .with_url("label_path", format!("{}/masks.zip", base))
        .with_urls("metadata_paths", [format!("{}/metadata.zip", base)]);
    let storage = TempDir::new().unwrap();
    let config = CacheConfig::with_storage_root(storage.path());

    let first = DatasetCache::open("BBBC039", descriptor.clone(), &config)
        .await
        .unwrap();
    assert_eq!(host.gets(), 3);
    assert_eq!(first.report().extracted(), 3);
    let before = snapshot(first.root());
    let archive_bytes = std::fs::read(first.root().join("images.zip")).unwrap();

    let mut second = DatasetCache::open("BBBC039", descriptor, &config).await.unwrap();
    assert_eq!(host.gets(), 3, "warm cache must not touch the network");
    assert_eq!(second.report().downloaded(), 0);
    assert_eq!(second.report().bytes_transferred(), 0);
    assert_eq!(second.report().extracted(), 0);
    assert_eq!(second.report().count(FetchState::AlreadyExtracted), 3);
    assert_eq!(snapshot(second.root()), before);
    assert_eq!(
        std::fs::read(second.root().join("images.zip")).unwrap(),
        archive_bytes
    );

    // An explicit re-run on the same instance is just as quiet.
    let third = second.acquire().await;
    assert_eq!(third.downloaded(), 0);
    assert_eq!(host.gets(), 3);

    assert_eq!(second.image_paths().len(), 2);
    assert_eq!(second.label_paths().len(), 1);
    assert_eq!(file_names(&second.metadata_paths()), vec!["split.csv"]);
}

#[tokio::test]
async fn test_empty_descriptors_yield_empty_accessors() {
    let (_base, host) = start_host(vec![]).await;
    let storage = TempDir::new().unwrap();
    let config = CacheConfig::with_storage_root(storage.path());

    let all_none = DatasetDescriptor::from_json(
        r#"{
            "image_paths": [],
            "label_path": null,
            "segmentation_path": null,
            "metadata_paths": [null, null]
        }"#,
    )
    .unwrap();

    for (name, descriptor) in [("empty", DatasetDescriptor::new()), ("all_none", all_none)] {
        let cache = DatasetCache::open(name, descriptor, &config).await.unwrap();
        assert!(cache.report().is_empty());
        assert!(cache.image_paths().is_empty());
        assert!(cache.label_paths().is_empty());
        assert!(cache.segmentation_paths().is_empty());
        assert!(cache.metadata_paths().is_empty());
        assert!(cache.list_role("metadata", true).is_empty());
        assert!(cache.root().is_dir());
    }

    assert_eq!(host.gets(), 0);
}

#[tokio::test]
async fn test_multi_part_role_continues_past_failures() {
    let (base, host) = start_host(vec![
        ("part1.zip", zip_bytes(&[("part1/a.png", b"a")])),
        ("part2.zip", zip_bytes(&[("part2/b.png", b"b")])),
    ])
    .await;

    let descriptor = DatasetDescriptor::new().with_urls(
        "image_paths",
        [
            format!("{}/part1.zip", base),
            format!("{}/missing.zip", base),
            format!("{}/part2.zip", base),
        ],
    );
    let storage = TempDir::new().unwrap();
    let cache = DatasetCache::open("parts", descriptor, &CacheConfig::with_storage_root(storage.path()))
        .await
        .unwrap();

    assert_eq!(host.gets(), 3);
    let states: Vec<FetchState> = cache.report().outcomes.iter().map(|o| o.state).collect();
    assert_eq!(
        states,
        vec![FetchState::Extracted, FetchState::DownloadFailed, FetchState::Extracted]
    );
    assert_eq!(file_names(&cache.image_paths()), vec!["a.png", "b.png"]);

    // A failed transfer leaves nothing that could pass for a finished download.
    assert!(!cache.root().join("missing.zip").exists());
    assert!(!cache.root().join("missing.zip.part").exists());
}

#[tokio::test]
async fn test_failed_url_is_retried_on_next_pass() {
    let (base, host) = start_host(vec![]).await;
    let descriptor =
        DatasetDescriptor::new().with_urls("image_paths", [format!("{}/late.zip", base)]);
    let storage = TempDir::new().unwrap();
    let config = CacheConfig::with_storage_root(storage.path());

    let cache = DatasetCache::open("late", descriptor.clone(), &config).await.unwrap();
    assert_eq!(cache.report().count(FetchState::DownloadFailed), 1);

    let cache = DatasetCache::open("late", descriptor, &config).await.unwrap();
    assert_eq!(cache.report().count(FetchState::DownloadFailed), 1);
    assert_eq!(host.gets(), 2);
}

#[tokio::test]
async fn test_labels_segmentation_and_metadata_subdirectories() {
    let (base, _host) = start_host(vec![
        ("masks.zip", zip_bytes(&[("masks/m1.png", b"1"), ("masks/notes.txt", b"n")])),
        ("fg.zip", zip_bytes(&[("fg/f1.png", b"1")])),
        ("eachworm.zip", zip_bytes(&[("eachworm/w1.png", b"1")])),
        ("meta.zip", zip_bytes(&[("meta/split.csv", b"s"), ("meta/info.txt", b"i")])),
    ])
    .await;

    let descriptor = DatasetDescriptor::new()
        .with_url("label_path", format!("{}/masks.zip", base))
        .with_url("segmentation_path", format!("{}/fg.zip", base))
        .with_urls(
            "additional_segmentation_paths",
            [format!("{}/eachworm.zip", base)],
        )
        .with_urls("metadata_paths", [format!("{}/meta.zip", base)]);
    let storage = TempDir::new().unwrap();
    let cache = DatasetCache::open("roles", descriptor, &CacheConfig::with_storage_root(storage.path()))
        .await
        .unwrap();

    assert!(cache.root().join("labels/masks").is_dir());
    assert!(cache.root().join("segmentation/fg").is_dir());
    assert!(cache.root().join("segmentation/eachworm").is_dir());
    assert!(cache.root().join("metadata/meta").is_dir());

    assert_eq!(
        file_names(&cache.label_paths()),
        vec!["f1.png", "m1.png", "w1.png"]
    );
    assert_eq!(file_names(&cache.segmentation_paths()), vec!["f1.png", "w1.png"]);
    // Metadata listings are not filtered by image extension.
    assert_eq!(file_names(&cache.metadata_paths()), vec!["info.txt", "split.csv"]);
    assert!(cache.image_paths().is_empty());
}

#[tokio::test]
async fn test_deferred_and_non_network_roles_cause_no_traffic() {
    let (base, host) = start_host(vec![("images.zip", zip_bytes(&[("i/a.png", b"a")]))]).await;

    let descriptor = DatasetDescriptor::new()
        .with_urls("image_paths", [format!("{}/images.zip", base)])
        .with_urls("metadata_paths", [format!("{}/metadata.zip", base)])
        .with_url("label_path", "data/BBBC039/masks.zip")
        .with_url("description", format!("{}/about.html", base))
        .defer("metadata_paths");
    let storage = TempDir::new().unwrap();
    let cache = DatasetCache::open("deferred", descriptor, &CacheConfig::with_storage_root(storage.path()))
        .await
        .unwrap();

    assert_eq!(host.gets(), 1);
    let states: Vec<FetchState> = cache.report().outcomes.iter().map(|o| o.state).collect();
    assert_eq!(states, vec![FetchState::Extracted, FetchState::Skipped]);
    assert!(!cache.root().join("masks.zip").exists());
    assert!(!cache.root().join("metadata.zip").exists());
}

#[tokio::test]
async fn test_interrupted_extraction_is_completed_without_download() {
    let (base, host) = start_host(vec![]).await;
    let storage = TempDir::new().unwrap();
    let root = storage.path().join("resume");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("images.zip"), zip_bytes(&[("images/a.png", b"a")])).unwrap();

    let descriptor =
        DatasetDescriptor::new().with_urls("image_paths", [format!("{}/images.zip", base)]);
    let cache = DatasetCache::open("resume", descriptor, &CacheConfig::with_storage_root(storage.path()))
        .await
        .unwrap();

    assert_eq!(host.gets(), 0);
    assert_eq!(cache.report().extracted(), 1);
    assert_eq!(file_names(&cache.image_paths()), vec!["a.png"]);
}

#[tokio::test]
async fn test_corrupt_archive_is_reported_and_retried() {
    let (base, _host) = start_host(vec![("images.zip", b"definitely not a zip".to_vec())]).await;
    let descriptor =
        DatasetDescriptor::new().with_urls("image_paths", [format!("{}/images.zip", base)]);
    let storage = TempDir::new().unwrap();
    let config = CacheConfig::with_storage_root(storage.path());

    let cache = DatasetCache::open("corrupt", descriptor.clone(), &config).await.unwrap();
    assert_eq!(cache.report().count(FetchState::ExtractionFailed), 1);
    assert!(!cache.root().join("images").join("images").exists());

    // The gate stays open, so the next pass tries the extraction again.
    let cache = DatasetCache::open("corrupt", descriptor, &config).await.unwrap();
    assert_eq!(cache.report().count(FetchState::ExtractionFailed), 1);
}

#[tokio::test]
async fn test_progress_is_reported() {
    let payload = vec![7u8; 64 * 1024];
    let (base, _host) = start_host(vec![("big.csv", payload.clone())]).await;
    let descriptor =
        DatasetDescriptor::new().with_urls("metadata_paths", [format!("{}/big.csv", base)]);
    let storage = TempDir::new().unwrap();
    let (tx, mut rx) = mpsc::channel(64);

    let cache = DatasetCache::builder("progress", descriptor)
        .storage_root(storage.path())
        .progress(tx)
        .open()
        .await
        .unwrap();
    drop(cache);

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert!(updates.len() >= 2);
    assert_eq!(updates.first().unwrap().bytes_downloaded, 0);
    let last = updates.last().unwrap();
    assert_eq!(last.bytes_downloaded, payload.len() as u64);
    assert!(last.url.ends_with("/big.csv"));
}

#[tokio::test]
async fn test_validate_remote() {
    let (base, host) = start_host(vec![("images.zip", zip_bytes(&[("a.png", b"a")]))]).await;
    let storage = TempDir::new().unwrap();
    let descriptor = DatasetDescriptor::new().with_urls(
        "image_paths",
        [format!("{}/images.zip", base), format!("{}/missing.zip", base)],
    );
    let cache = DatasetCache::builder("reachability", descriptor)
        .storage_root(storage.path())
        .http_client(HttpClient::with_probe_timeout(Duration::from_secs(2)).unwrap())
        .open_offline()
        .unwrap();

    assert!(cache.validate_remote(&format!("{}/images.zip", base)).await);
    assert!(!cache.validate_remote(&format!("{}/missing.zip", base)).await);
    assert!(!cache.validate_remote("http://127.0.0.1:9/images.zip").await);
    assert!(!bbbc_datasets::validate_remote("not a url").await);

    let results = cache.probe_all().await;
    assert_eq!(
        results.iter().map(|(_, ok)| *ok).collect::<Vec<_>>(),
        vec![true, false]
    );

    // Probing never downloads anything.
    assert_eq!(host.gets(), 0);
    assert_eq!(host.heads(), 4);
    assert!(!cache.root().join("images.zip").exists());
}

#[tokio::test]
async fn test_undrained_progress_channel_does_not_stall_transfer() {
    let (base, _host) = start_host(vec![]).await;
    let slow_url = format!("{}/big.csv", base.replace("/files", "/slow"));
    let descriptor = DatasetDescriptor::new().with_urls("metadata_paths", [slow_url]);
    let storage = TempDir::new().unwrap();
    // Room for one snapshot; the receiver is kept open but never read.
    let (tx, _rx) = mpsc::channel(1);

    let cache = tokio::time::timeout(
        Duration::from_secs(15),
        DatasetCache::builder("slow", descriptor)
            .storage_root(storage.path())
            .progress(tx)
            .open(),
    )
    .await
    .expect("acquisition stalled on a full progress channel")
    .unwrap();

    let csv = cache.root().join("big.csv");
    assert_eq!(
        std::fs::metadata(&csv).unwrap().len(),
        (SLOW_CHUNKS * SLOW_CHUNK_LEN) as u64
    );
    assert_eq!(cache.ground_truth(ArtifactRole::Metadata), Some(csv.as_path()));
}
