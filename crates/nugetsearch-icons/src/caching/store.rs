use std::fmt;
use std::sync::Mutex;

use rustc_hash::FxHashMap;

use super::CacheEntry;

#[derive(Debug)]
struct StoreState<T> {
    entries: FxHashMap<String, CacheEntry<T>>,
    closed: bool,
}

/// The in-memory store of resolved icons, keyed by URL.
///
/// An entry is written once and never replaced. The first writer for a URL wins, later writes
/// for the same URL are ignored. Both successful loads and failures count as resolved.
///
/// There is no eviction. The store only grows until it is [closed](Self::close), which drops
/// every entry at once.
pub struct IconStore<T> {
    state: Mutex<StoreState<T>>,
}

impl<T> fmt::Debug for IconStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (entries, closed) = self
            .state
            .try_lock()
            .map(|s| (s.entries.len(), s.closed))
            .unwrap_or_default();
        f.debug_struct("IconStore")
            .field("entries", &entries)
            .field("closed", &closed)
            .finish()
    }
}

impl<T> Default for IconStore<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(StoreState {
                entries: FxHashMap::default(),
                closed: false,
            }),
        }
    }
}

impl<T> IconStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `url` has been resolved, successfully or not.
    pub fn has(&self, url: &str) -> bool {
        self.state.lock().unwrap().entries.contains_key(url)
    }

    /// Stores `entry` for `url` unless an entry already exists or the store is closed.
    ///
    /// Returns whether the entry was written.
    pub fn put(&self, url: &str, entry: CacheEntry<T>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed || state.entries.contains_key(url) {
            return false;
        }
        state.entries.insert(url.to_owned(), entry);
        drop(state);

        tracing::trace!(url, "Icon store added entry");
        true
    }

    /// The number of resolved URLs.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the store and drops all entries.
    ///
    /// Subsequent [`put`](Self::put)s are ignored. Returns the number of released entries,
    /// which is `0` if the store was already closed.
    pub fn close(&self) -> usize {
        let entries = {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
            std::mem::take(&mut state.entries)
        };
        // icons may own expensive resources, release them outside of the lock
        let released = entries.len();
        drop(entries);
        released
    }
}

impl<T: Clone> IconStore<T> {
    /// Returns the icon for `url`.
    ///
    /// This is `None` both for unresolved URLs and for URLs that failed to load. Use
    /// [`has`](Self::has) or [`entry`](Self::entry) to tell the two apart.
    pub fn get(&self, url: &str) -> Option<T> {
        match self.state.lock().unwrap().entries.get(url) {
            Some(Ok(icon)) => Some(icon.clone()),
            _ => None,
        }
    }

    /// Returns the full entry for `url`, including the failure reason.
    pub fn entry(&self, url: &str) -> Option<CacheEntry<T>> {
        self.state.lock().unwrap().entries.get(url).cloned()
    }
}
