mod common;

use common::{URI, network, recorder, sketch};
use sketch::error::ErrorKind;
use sketch::fetch::{DataFrom, MemoryFetcherFactory};
use sketch::lifecycle::ManualLifecycle;
use sketch::request::{CachePolicy, Depth};
use sketch::{ImageResult, Request};
use std::sync::Arc;
use std::time::Duration;

fn kind(result: &ImageResult) -> ErrorKind {
    (***result.error().expect("expected an error")).clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_fetch() {
    let fetcher = network(Some(Duration::from_millis(50)));
    let sketch = sketch(&fetcher, None);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let sketch = sketch.clone();
            tokio::spawn(async move { sketch.execute(Request::new(URI)).await })
        })
        .collect();
    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert_eq!(fetcher.fetch_count(URI), 1);
    let first = results[0].data().unwrap();
    for result in &results {
        let data = result.data().unwrap();
        assert!(Arc::ptr_eq(data.image(), first.image()));
        assert_eq!(data.cache_key(), first.cache_key());
    }
    assert_eq!(sketch.memory_cache().len(), 1);
    assert_eq!(sketch.in_flight_len(), 0);
}

#[tokio::test]
async fn test_second_request_served_from_memory() {
    let fetcher = network(None);
    let sketch = sketch(&fetcher, None);

    let first = sketch.execute(Request::new(URI)).await;
    assert_eq!(first.data().unwrap().data_from(), DataFrom::Network);
    let second = sketch.execute(Request::new(URI)).await;
    let data = second.data().unwrap();
    assert_eq!(data.data_from(), DataFrom::MemoryCache);
    assert_eq!((data.info().width, data.info().height), (16, 16));
    assert_eq!(fetcher.total_fetches(), 1);

    sketch.memory_cache().clear();
    sketch.execute(Request::new(URI)).await;
    assert_eq!(fetcher.total_fetches(), 2);
}

#[tokio::test]
async fn test_leases_released_when_results_dropped() {
    let fetcher = network(None);
    let sketch = sketch(&fetcher, None);

    let first = sketch.execute(Request::new(URI)).await;
    let second = sketch.execute(Request::new(URI)).await;
    assert!(sketch.memory_cache().active_leases() >= 2);
    drop(first);
    drop(second);
    assert_eq!(sketch.memory_cache().active_leases(), 0);
}

#[tokio::test]
async fn test_memory_policy_disabled_skips_cache() {
    let fetcher = network(None);
    let sketch = sketch(&fetcher, None);
    let request = Request::builder(URI).memory_cache_policy(CachePolicy::Disabled).build();

    sketch.execute(request.clone()).await;
    let result = sketch.execute(request).await;
    assert_eq!(result.data().unwrap().data_from(), DataFrom::Network);
    assert_eq!(fetcher.total_fetches(), 2);
    assert!(sketch.memory_cache().is_empty());
}

#[tokio::test]
async fn test_dispose_last_caller_cancels_execution() {
    let fetcher = network(Some(Duration::from_millis(500)));
    let sketch = sketch(&fetcher, None);

    let disposable = sketch.enqueue(Request::new(URI));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sketch.in_flight_len(), 1);
    disposable.dispose();
    assert!(disposable.is_disposed());
    assert!(disposable.join().await.is_cancelled());

    assert_eq!(sketch.in_flight_len(), 0);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(sketch.memory_cache().is_empty());
}

#[tokio::test]
async fn test_dispose_one_caller_keeps_shared_execution() {
    let fetcher = network(Some(Duration::from_millis(100)));
    let sketch = sketch(&fetcher, None);

    let leaving = sketch.enqueue(Request::new(URI));
    let staying = sketch.enqueue(Request::new(URI));
    tokio::time::sleep(Duration::from_millis(20)).await;
    leaving.dispose();

    assert!(leaving.join().await.is_cancelled());
    assert!(staying.join().await.is_success());
    assert_eq!(fetcher.fetch_count(URI), 1);
}

#[tokio::test]
async fn test_detached_execution_runs_on_when_configured() {
    let fetcher = network(Some(Duration::from_millis(50)));
    let mut config = common::config(None);
    config.request.cancel_when_detached = false;
    let sketch = common::sketch_with(config, &fetcher);

    let disposable = sketch.enqueue(Request::new(URI));
    tokio::time::sleep(Duration::from_millis(10)).await;
    disposable.dispose();
    assert!(disposable.join().await.is_cancelled());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sketch.memory_cache().len(), 1);
    assert_eq!(sketch.in_flight_len(), 0);
}

#[tokio::test]
async fn test_no_fetcher_for_scheme() {
    let sketch = sketch(&MemoryFetcherFactory::new(), None);
    let result = sketch.execute(Request::new("ftp://example.com/a.bmp")).await;
    assert_eq!(kind(&result), ErrorKind::NoFetcher("ftp".to_string()));
    assert!(!result.error().unwrap().is_retryable());
}

#[tokio::test]
async fn test_missing_data_is_fetch_error() {
    let fetcher = MemoryFetcherFactory::new();
    let sketch = sketch(&fetcher, None);
    let result = sketch.execute(Request::new("memory://missing.bmp")).await;
    assert!(matches!(kind(&result), ErrorKind::Fetch(_)));
    assert_eq!(sketch.in_flight_len(), 0);
}

#[tokio::test]
async fn test_undecodable_bytes() {
    let fetcher = MemoryFetcherFactory::new();
    fetcher.insert("memory://noise", vec![0x42; 64]);
    let sketch = sketch(&fetcher, None);
    let result = sketch.execute(Request::new("memory://noise")).await;
    assert!(matches!(kind(&result), ErrorKind::NoDecoder(_)));
}

#[tokio::test]
async fn test_depth_limits_sources() {
    let fetcher = network(None);
    let sketch = sketch(&fetcher, None);

    let memory_only = Request::builder(URI).depth(Depth::Memory).build();
    let result = sketch.execute(memory_only.clone()).await;
    assert!(matches!(kind(&result), ErrorKind::Depth { depth: Depth::Memory, .. }));

    let local_only = Request::builder(URI).depth(Depth::Local).build();
    let result = sketch.execute(local_only).await;
    assert_eq!(kind(&result), ErrorKind::Depth { depth: Depth::Local, from: DataFrom::Network });
    assert_eq!(fetcher.total_fetches(), 0);

    sketch.execute(Request::new(URI)).await;
    assert!(sketch.execute(memory_only).await.is_success());
}

#[tokio::test]
async fn test_timeout() {
    let fetcher = network(Some(Duration::from_millis(500)));
    let sketch = sketch(&fetcher, None);
    let request = Request::builder(URI).timeout(Duration::from_millis(20)).build();

    let result = sketch.execute(request).await;
    assert_eq!(kind(&result), ErrorKind::Timeout { after: Duration::from_millis(20) });
    assert!(result.error().unwrap().is_retryable());
    assert_eq!(sketch.in_flight_len(), 0);
}

#[tokio::test]
async fn test_timeout_applies_only_to_its_caller() {
    let fetcher = network(Some(Duration::from_millis(200)));
    let sketch = sketch(&fetcher, None);

    let impatient = sketch.enqueue(Request::builder(URI).timeout(Duration::from_millis(20)).build());
    tokio::time::sleep(Duration::from_millis(5)).await;
    let patient = sketch.execute(Request::new(URI)).await;

    assert_eq!(kind(&impatient.join().await), ErrorKind::Timeout { after: Duration::from_millis(20) });
    assert_eq!(patient.data().unwrap().data_from(), DataFrom::Network);
}

#[tokio::test]
async fn test_local_caller_does_not_join_network_execution() {
    let fetcher = network(Some(Duration::from_millis(100)));
    let sketch = sketch(&fetcher, None);

    let remote = sketch.enqueue(Request::new(URI));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let local = sketch.execute(Request::builder(URI).depth(Depth::Local).build()).await;

    assert_eq!(kind(&local), ErrorKind::Depth { depth: Depth::Local, from: DataFrom::Network });
    assert_eq!(remote.join().await.data().unwrap().data_from(), DataFrom::Network);
    assert_eq!(fetcher.total_fetches(), 1);
}

#[tokio::test]
async fn test_lifecycle_gates_start() {
    let fetcher = network(None);
    let sketch = sketch(&fetcher, None);
    let lifecycle = Arc::new(ManualLifecycle::new());
    let request = Request::builder(URI).lifecycle(lifecycle.clone()).build();

    let task = tokio::spawn({
        let sketch = sketch.clone();
        async move { sketch.execute(request).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fetcher.total_fetches(), 0);
    lifecycle.start();
    assert!(task.await.unwrap().is_success());
}

#[tokio::test]
async fn test_lifecycle_destroyed_mid_flight() {
    let fetcher = network(Some(Duration::from_millis(500)));
    let sketch = sketch(&fetcher, None);
    let lifecycle = Arc::new(ManualLifecycle::started());
    let request = Request::builder(URI).lifecycle(lifecycle.clone()).build();

    let task = tokio::spawn({
        let sketch = sketch.clone();
        async move { sketch.execute(request).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    lifecycle.destroy();
    assert!(task.await.unwrap().is_cancelled());
    assert_eq!(sketch.in_flight_len(), 0);
}

#[tokio::test]
async fn test_paused_requests_wait_for_resume() {
    let fetcher = network(None);
    let sketch = sketch(&fetcher, None);
    sketch.pause_switch().pause();

    let pausable = sketch.enqueue(Request::builder(URI).pause_when_paused(true).build());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fetcher.total_fetches(), 0);
    assert!(!pausable.is_disposed());

    sketch.pause_switch().resume();
    assert!(pausable.join().await.is_success());
    assert_eq!(fetcher.total_fetches(), 1);
}

#[tokio::test]
async fn test_listener_callbacks() {
    let fetcher = network(Some(Duration::from_millis(200)));
    let sketch = sketch(&fetcher, None);

    let ok = recorder();
    sketch.execute(Request::builder(URI).listener(ok.clone()).build()).await;
    assert_eq!(ok.events(), ["start", "success"]);

    let failed = recorder();
    sketch.execute(Request::builder("ftp://example.com/a.bmp").listener(failed.clone()).build()).await;
    assert_eq!(failed.events(), ["start", "error"]);

    let cancelled = recorder();
    let request = Request::builder("https://images.example.com/other.bmp").listener(cancelled.clone()).build();
    fetcher.insert(request.uri(), common::bmp(2, 2));
    let disposable = sketch.enqueue(request);
    tokio::time::sleep(Duration::from_millis(20)).await;
    disposable.dispose();
    disposable.join().await;
    assert_eq!(cancelled.events(), ["start", "cancel"]);
}
