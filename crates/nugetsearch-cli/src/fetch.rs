use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use nugetsearch_icons::IconManager;
use nugetsearch_icons::config::Config;
use nugetsearch_icons::fetch::{HttpIconSource, ImageDecoder};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::cli::FetchArgs;
use crate::output::{self, IconRow};

/// Loads all requested icons and prints a table of their outcomes.
///
/// Fails if any icon did not load, or did not finish within the timeout.
pub async fn run(config: &Config, args: FetchArgs) -> Result<()> {
    let mut icons = config.icons;
    if let Some(capacity) = args.capacity {
        icons.throttle_capacity = capacity;
    }

    let source = HttpIconSource::new(&config.http, ImageDecoder)
        .context("failed to create the HTTP client")?;
    let manager = IconManager::new(icons, source, &Handle::current());

    let (tx, rx) = mpsc::unbounded_channel();
    manager.load(args.urls.iter().cloned(), move |url: &str| {
        tx.send(url.to_owned()).ok();
    });

    let finished = wait_for(rx, args.urls.len(), *args.timeout).await;
    if finished < args.urls.len() {
        tracing::warn!(
            finished,
            total = args.urls.len(),
            timeout = %args.timeout,
            "Gave up waiting for icons"
        );
    }

    let mut seen = HashSet::new();
    let mut urls = args.urls;
    urls.retain(|url| seen.insert(url.clone()));
    let rows: Vec<_> = urls
        .into_iter()
        .map(|url| {
            let entry = manager.entry(&url);
            IconRow::new(url, entry)
        })
        .collect();

    manager.shutdown().await;
    output::print_table(&rows);

    let failed = rows.iter().filter(|row| !row.is_ok()).count();
    if failed > 0 {
        bail!("{failed} of {} icons failed to load", rows.len());
    }
    Ok(())
}

/// Receives up to `expected` completions, giving up after `timeout`.
async fn wait_for(
    mut rx: mpsc::UnboundedReceiver<String>,
    expected: usize,
    timeout: Duration,
) -> usize {
    let mut finished = 0;
    let receive = async {
        while finished < expected {
            match rx.recv().await {
                Some(url) => {
                    tracing::debug!(%url, "Icon finished loading");
                    finished += 1;
                }
                None => break,
            }
        }
    };
    tokio::time::timeout(timeout, receive).await.ok();
    finished
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("a".to_owned()).unwrap();
        tx.send("b".to_owned()).unwrap();

        assert_eq!(wait_for(rx, 2, Duration::from_secs(5)).await, 2);
    }

    #[tokio::test]
    async fn test_wait_for_timeout() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("a".to_owned()).unwrap();

        assert_eq!(wait_for(rx, 3, Duration::from_millis(20)).await, 1);
        drop(tx);
    }
}
