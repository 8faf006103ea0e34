mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockTransport, Reply, files_with_extension, test_config};
use hcache::prelude::*;

const CONCURRENT_FETCHES: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_leave_one_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mock = Arc::new(MockTransport::always(
        Reply::ok("shared body")
            .header("etag", "\"same\"")
            .header("last-modified", "Sun, 06 Nov 1994 08:49:37 GMT")
            .header("cache-control", "max-age=3600")
            .delayed(Duration::from_millis(20)),
    ));
    let engine = Arc::new(
        CacheEngine::builder(test_config(dir.path()))
            .shared_transport(mock.clone())
            .build()
            .expect("engine"),
    );

    let mut handles = Vec::with_capacity(CONCURRENT_FETCHES);
    for _ in 0..CONCURRENT_FETCHES {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .fetch_string("http://origin.test/shared", FetchOptions::new())
                .await
        }));
    }

    for handle in handles {
        let fetched = handle.await.expect("task").expect("fetch");
        assert_eq!(fetched.value, "shared body");
        assert!(matches!(fetched.status, CacheStatus::Stored | CacheStatus::Hit));
    }

    let content = files_with_extension(dir.path(), "bin");
    let meta = files_with_extension(dir.path(), "json");
    assert_eq!(content.len(), 1);
    assert_eq!(meta.len(), 1);
    assert_eq!(content[0].with_extension("json"), meta[0]);
    assert!(files_with_extension(dir.path(), "tmp").is_empty());

    let hit = engine
        .fetch("http://origin.test/shared", FetchOptions::new())
        .await
        .expect("hit");
    assert_eq!(hit.status(), CacheStatus::Hit);
    assert_eq!(hit.content_path(), Some(content[0].as_path()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_resources_do_not_interfere() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mock = Arc::new(MockTransport::always(
        Reply::ok("payload").header("cache-control", "max-age=3600"),
    ));
    let engine = Arc::new(
        CacheEngine::builder(test_config(dir.path()))
            .shared_transport(mock.clone())
            .build()
            .expect("engine"),
    );

    let mut handles = Vec::new();
    for i in 0..CONCURRENT_FETCHES {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .fetch(&format!("http://origin.test/r/{i}"), FetchOptions::new())
                .await
        }));
    }
    for handle in handles {
        let result = handle.await.expect("task").expect("fetch");
        assert_eq!(result.status(), CacheStatus::Stored);
    }

    assert_eq!(files_with_extension(dir.path(), "bin").len(), CONCURRENT_FETCHES);
    assert_eq!(files_with_extension(dir.path(), "json").len(), CONCURRENT_FETCHES);
    assert_eq!(mock.calls(), CONCURRENT_FETCHES);
}
