use std::time::{Duration, Instant};

use nugetsearch_icons::{IconError, IconManager};
use tokio::runtime::Handle;

use crate::{Completions, counting_source, manager_config, setup};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_icons_are_throttled() {
    setup();
    let (source, counter) = counting_source(Duration::from_millis(50));
    let manager = IconManager::new(manager_config(2), source, &Handle::current());

    let urls: Vec<_> = (0..50).map(|i| format!("icons/{i:02}.png")).collect();
    let completions = Completions::new();
    let start = Instant::now();
    manager.load(urls.clone(), completions.callback());
    completions.wait_for(50).await;
    let elapsed = start.elapsed();

    // 25 rounds of two parallel 50ms fetches, plus scheduling slack
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

    let mut expected = urls.clone();
    expected.sort();
    assert_eq!(completions.urls(), expected);

    for url in &urls {
        assert_eq!(manager.get_icon(url), Some(url.len()));
        assert_eq!(counter.fetches(url), 1);
    }
    assert!(counter.peak() <= 2, "peak concurrency was {}", counter.peak());
    assert_eq!(manager.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_url_in_one_batch() {
    setup();
    let (source, counter) = counting_source(Duration::from_millis(20));
    let manager = IconManager::new(manager_config(2), source, &Handle::current());

    let completions = Completions::new();
    manager.load(vec!["icons/a.png"; 5], completions.callback());
    completions.wait_for(5).await;

    assert_eq!(completions.urls(), vec!["icons/a.png"; 5]);
    assert_eq!(manager.get_icon("icons/a.png"), Some(11));

    // duplicates racing for the throttle find the stored value instead of fetching again
    assert!(counter.fetches("icons/a.png") <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failures_do_not_affect_others() {
    setup();
    let (source, counter) = counting_source(Duration::from_millis(10));
    let manager = IconManager::new(manager_config(2), source, &Handle::current());

    let completions = Completions::new();
    manager.load(["missing/a.png", "icons/b.png"], completions.callback());
    completions.wait_for(2).await;

    assert_eq!(completions.urls(), ["icons/b.png", "missing/a.png"]);
    assert!(manager.is_loaded("missing/a.png"));
    assert_eq!(manager.get_icon("missing/a.png"), None);
    assert_eq!(manager.entry("missing/a.png"), Some(Err(IconError::NotFound)));
    assert_eq!(manager.get_icon("icons/b.png"), Some(11));

    // resolved failures are answered synchronously and not retried
    let again = Completions::new();
    manager.load(["missing/a.png"], again.callback());
    assert_eq!(again.count(), 1);
    assert_eq!(counter.fetches("missing/a.png"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_hits_and_misses() {
    setup();
    let (source, counter) = counting_source(Duration::from_millis(10));
    let manager = IconManager::new(manager_config(2), source, &Handle::current());

    let warmup = Completions::new();
    manager.load(["icons/a.png"], warmup.callback());
    warmup.wait_for(1).await;

    let completions = Completions::new();
    manager.load(["icons/a.png", "icons/bb.png"], completions.callback());
    // the hit was answered before `load` returned
    assert!(completions.count() >= 1);
    completions.wait_for(2).await;

    assert_eq!(completions.urls(), ["icons/a.png", "icons/bb.png"]);
    assert_eq!(counter.total(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_loads_from_many_threads() {
    setup();
    let (source, counter) = counting_source(Duration::from_millis(5));
    let manager = IconManager::new(manager_config(3), source, &Handle::current());
    let completions = Completions::new();

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let manager = manager.clone();
            let callback = completions.callback();
            std::thread::spawn(move || {
                let urls: Vec<_> = (0..10).map(|i| format!("icons/{t}-{i}.png")).collect();
                manager.load(urls, callback);
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    completions.wait_for(40).await;
    assert_eq!(counter.total(), 40);
    assert!(counter.peak() <= 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_with_pending_work() {
    setup();
    let (source, counter) = counting_source(Duration::from_millis(100));
    let manager = IconManager::new(manager_config(1), source, &Handle::current());

    let completions = Completions::new();
    let urls: Vec<_> = (0..20).map(|i| format!("icons/{i}.png")).collect();
    manager.load(urls, completions.callback());

    tokio::time::sleep(Duration::from_millis(150)).await;
    manager.shutdown().await;
    let reported = completions.count();

    tokio::time::timeout(Duration::from_secs(10), async {
        while manager.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // no callbacks fire after disposal and the cache is empty
    assert_eq!(completions.count(), reported);
    assert!(reported < 20);
    // units released by the closed throttle do not fetch anymore
    assert_eq!(counter.peak(), 1);
    assert!(counter.total() <= reported + 2);
    assert!(!manager.is_loaded("icons/0.png"));
}
