use std::time::Duration;

use nugetsearch_icons::config::HttpConfig;
use nugetsearch_icons::fetch::{HttpIconSource, ImageDecoder, ImageFormat};
use nugetsearch_icons::{IconError, IconManager};
use tokio::runtime::Handle;

use crate::{Completions, HitCounter, manager_config, read_fixture, setup};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_http_icons() {
    setup();
    let hitcounter = HitCounter::new();

    let source = HttpIconSource::new(&HttpConfig::default(), ImageDecoder).unwrap();
    let manager = IconManager::new(manager_config(2), source, &Handle::current());

    let png = hitcounter.url("icons/nuget.png").to_string();
    let gif = hitcounter.url("icons/package.gif").to_string();
    let missing = hitcounter.url("icons/missing.png").to_string();
    let broken = hitcounter.url("garbage_data/not-an-icon").to_string();

    let completions = Completions::new();
    manager.load(
        [&png, &gif, &missing, &broken, &png, &png],
        completions.callback(),
    );
    completions.wait_for(6).await;

    let icon = manager.get_icon(&png).unwrap();
    assert_eq!(icon.format, ImageFormat::Png);
    assert_eq!(icon.data, read_fixture("icons/nuget.png"));
    assert_eq!(manager.get_icon(&gif).unwrap().format, ImageFormat::Gif);

    assert_eq!(manager.entry(&missing), Some(Err(IconError::NotFound)));
    assert_eq!(
        manager.entry(&broken),
        Some(Err(IconError::Malformed("unknown image format".into())))
    );

    // the repeated icon was downloaded at most once per throttle slot
    let hits = hitcounter.all_hits();
    let png_hits = hits
        .iter()
        .find(|(path, _)| path == "/icons/nuget.png")
        .map(|(_, hits)| *hits)
        .unwrap_or_default();
    assert!((1..=2).contains(&png_hits), "{hits:?}");

    // everything is resolved now, nothing goes over the wire
    let again = Completions::new();
    manager.load([&png, &gif, &missing, &broken], again.callback());
    assert_eq!(again.count(), 4);
    assert_eq!(hitcounter.accesses(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_http_timeouts_resolve() {
    setup();
    let hitcounter = HitCounter::new();

    let config = HttpConfig {
        timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let source = HttpIconSource::new(&config, ImageDecoder).unwrap();
    let manager = IconManager::new(manager_config(2), source, &Handle::current());

    let slow = hitcounter.url("delay/1h/icons/nuget.png").to_string();
    let fast = hitcounter.url("icons/nuget.png").to_string();

    let completions = Completions::new();
    manager.load([&slow, &fast], completions.callback());
    completions.wait_for(2).await;

    assert_eq!(
        manager.entry(&slow),
        Some(Err(IconError::Timeout(Duration::from_millis(200))))
    );
    assert!(manager.get_icon(&fast).is_some());
}
