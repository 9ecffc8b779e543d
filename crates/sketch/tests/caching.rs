mod common;

use common::{Tail, TruncatedFetcherFactory, URI, config, network, sketch};
use sketch::error::ErrorKind;
use sketch::fetch::{DataFrom, MemoryFetcherFactory};
use sketch::request::{CachePolicy, Size};
use sketch::transform::RotateTransformation;
use sketch::{ComponentRegistry, Request, Sketch};
use sketch_image::{Bitmap, Image};
use std::path::Path;
use std::time::Duration;

fn bitmap(image: &dyn Image) -> &Bitmap {
    image.as_any().downcast_ref::<Bitmap>().expect("decoded image should be a bitmap")
}

fn truncated(tail: Tail, dir: &Path) -> Sketch {
    Sketch::builder(config(Some(dir)))
        .components(ComponentRegistry::builder().add_fetcher(TruncatedFetcherFactory::new(tail)).build())
        .build()
        .unwrap()
}

fn temp_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "tmp")).count()
}

#[tokio::test]
async fn test_download_cache_serves_after_memory_clear() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = network(None);
    let sketch = sketch(&fetcher, Some(dir.path()));

    let first = sketch.execute(Request::new(URI)).await;
    assert_eq!(first.data().unwrap().data_from(), DataFrom::Network);
    assert_eq!(sketch.download_cache().len(), 1);
    // Original size and no transformations, so there is nothing to store.
    assert_eq!(sketch.result_cache().len(), 0);

    sketch.memory_cache().clear();
    let second = sketch.execute(Request::new(URI)).await;
    let data = second.data().unwrap();
    assert_eq!(data.data_from(), DataFrom::DownloadCache);
    assert_eq!(bitmap(data.image().as_ref()).pixel(3, 5), Some(&[3, 5, 7, 0xFF][..]));
    assert_eq!(fetcher.total_fetches(), 1);
}

#[tokio::test]
async fn test_download_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = network(None);
    let first = sketch(&fetcher, Some(dir.path()));
    assert!(first.execute(Request::new(URI)).await.is_success());
    drop(first);

    let empty = MemoryFetcherFactory::new().with_data_from(DataFrom::Network);
    let second = sketch(&empty, Some(dir.path()));
    let result = second.execute(Request::new(URI)).await;
    assert_eq!(result.data().unwrap().data_from(), DataFrom::DownloadCache);
    assert_eq!(empty.total_fetches(), 0);
}

#[tokio::test]
async fn test_local_sources_skip_download_cache() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MemoryFetcherFactory::new();
    fetcher.insert("memory://local.bmp", common::bmp(4, 4));
    let sketch = sketch(&fetcher, Some(dir.path()));

    assert!(sketch.execute(Request::new("memory://local.bmp")).await.is_success());
    assert!(sketch.download_cache().is_empty());
}

#[tokio::test]
async fn test_download_cache_write_only_policy() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = network(None);
    let sketch = sketch(&fetcher, Some(dir.path()));
    let request = Request::builder(URI)
        .memory_cache_policy(CachePolicy::Disabled)
        .download_cache_policy(CachePolicy::WriteOnly)
        .build();

    sketch.execute(request.clone()).await;
    sketch.execute(request).await;
    assert_eq!(fetcher.total_fetches(), 2);
    assert_eq!(sketch.download_cache().len(), 1);
}

#[tokio::test]
async fn test_result_cache_stores_sampled_bitmaps() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = network(None);
    let sketch = sketch(&fetcher, Some(dir.path()));
    let request = Request::builder(URI).size(Size::new(4, 4)).build();

    let first = sketch.execute(request.clone()).await;
    let data = first.data().unwrap();
    assert_eq!((data.image().width(), data.image().height()), (4, 4));
    assert_eq!((data.info().width, data.info().height), (16, 16));
    assert_eq!(data.transformations(), ["InSampled(4)"]);
    assert_eq!(sketch.result_cache().len(), 1);

    sketch.memory_cache().clear();
    let second = sketch.execute(request).await;
    let cached = second.data().unwrap();
    assert_eq!(cached.data_from(), DataFrom::ResultCache);
    assert_eq!(cached.transformations(), ["InSampled(4)"]);
    assert_eq!(cached.info(), data.info());
    assert_eq!(bitmap(cached.image().as_ref()).pixels(), bitmap(data.image().as_ref()).pixels());
    assert_eq!(fetcher.total_fetches(), 1);
}

#[tokio::test]
async fn test_sizes_are_cached_separately() {
    let fetcher = network(None);
    let sketch = sketch(&fetcher, None);

    sketch.execute(Request::builder(URI).size(Size::new(4, 4)).build()).await;
    sketch.execute(Request::builder(URI).size(Size::new(8, 8)).build()).await;
    assert_eq!(sketch.memory_cache().len(), 2);
    assert_eq!(fetcher.total_fetches(), 2);
}

#[tokio::test]
async fn test_rotation_applied_and_cached() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MemoryFetcherFactory::new().with_data_from(DataFrom::Network);
    fetcher.insert(URI, common::bmp(4, 2));
    let sketch = sketch(&fetcher, Some(dir.path()));
    let request = Request::builder(URI).transformation(RotateTransformation::new(90).unwrap()).build();

    let result = sketch.execute(request.clone()).await;
    let data = result.data().unwrap();
    assert_eq!((data.image().width(), data.image().height()), (2, 4));
    assert_eq!(data.transformations(), ["Rotate(90)"]);

    let from_memory = sketch.execute(request.clone()).await;
    assert_eq!(from_memory.data().unwrap().transformations(), ["Rotate(90)"]);

    sketch.memory_cache().clear();
    let from_disk = sketch.execute(request).await;
    let data = from_disk.data().unwrap();
    assert_eq!(data.data_from(), DataFrom::ResultCache);
    assert_eq!((data.image().width(), data.image().height()), (2, 4));
    assert_eq!(fetcher.total_fetches(), 1);
}

#[tokio::test]
async fn test_clear_caches() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = network(None);
    let sketch = sketch(&fetcher, Some(dir.path()));
    sketch.execute(Request::builder(URI).size(Size::new(4, 4)).build()).await;

    sketch.clear_caches().unwrap();
    assert!(sketch.memory_cache().is_empty());
    assert!(sketch.download_cache().is_empty());
    assert!(sketch.result_cache().is_empty());
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_entry() {
    let dir = tempfile::tempdir().unwrap();
    let sketch = truncated(Tail::Fail, dir.path());
    let request = Request::new(URI);

    let result = sketch.execute(request.clone()).await;
    assert!(matches!(***result.error().unwrap(), ErrorKind::Fetch(_)));
    assert!(sketch.download_cache().open_snapshot(&sketch::key::download_cache_key(&request)).is_none());
    assert_eq!(sketch.download_cache().len(), 0);
    assert_eq!(temp_files(&dir.path().join("download")), 0);
}

#[tokio::test]
async fn test_cancelled_download_releases_editor() {
    let dir = tempfile::tempdir().unwrap();
    let sketch = truncated(Tail::Stall, dir.path());
    let key = sketch::key::download_cache_key(&Request::new(URI));

    let disposable = sketch.enqueue(Request::new(URI));
    tokio::time::sleep(Duration::from_millis(50)).await;
    disposable.dispose();
    assert!(disposable.join().await.is_cancelled());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(sketch.download_cache().open_snapshot(&key).is_none());
    assert_eq!(temp_files(&dir.path().join("download")), 0);
    let editor = sketch.download_cache().open_editor(&key).await.unwrap();
    assert!(editor.is_some());
}
