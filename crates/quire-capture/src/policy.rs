//! Synchronization policies for [`PageCache`](crate::PageCache).
//!
//! One policy exists per scope flavor:
//!
//! - [`SingleThread`]: no coordination beyond an owner-thread assertion,
//!   for plain sequential requests.
//! - [`Synchronized`]: one coarse lock per cache instance, for requests
//!   that may be observed from worker threads without fanning out.
//! - [`Concurrent`]: sharded map for page reads and inserts, with only the
//!   verification bookkeeping serialized.
//!
//! Touching a [`SingleThread`] cache from a foreign thread is a
//! programming error, caught by a debug assertion rather than recovered
//! from at runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use dashmap::DashMap;

use quire_model::{CaptureLevel, Library, Page, PageRef};

use crate::cache::{AttrValue, CacheKind, CaptureKey};
use crate::error::ConsistencyError;
use crate::verify::{self, VerifyState};

/// How a cache instance guards its internal state.
///
/// Implementations supply the read path, the write path, and the critical
/// section around consistency verification. [`PageCache`](crate::PageCache)
/// layers the level-fallback and identity rules on top.
pub trait SyncPolicy: Send + Sync + 'static {
    /// The strategy this policy implements, for diagnostics.
    fn kind(&self) -> CacheKind;

    /// Exact-key page lookup. No level fallback at this layer.
    fn get(&self, key: &CaptureKey) -> Option<Arc<Page>>;

    /// Idempotent insert plus one-shot verification for newly cached refs.
    fn put(
        &self,
        key: CaptureKey,
        page: Arc<Page>,
        library: &Library,
    ) -> Result<(), ConsistencyError>;

    /// Read a generic attribute.
    fn attribute(&self, key: &str) -> Option<AttrValue>;

    /// Store a generic attribute, replacing any previous value.
    fn set_attribute(&self, key: &str, value: AttrValue);
}

/// Resolve a page ref against a plain map, page level falling back to meta.
fn lookup_cached(pages: &HashMap<CaptureKey, Arc<Page>>, r: &PageRef) -> Option<Arc<Page>> {
    pages
        .get(&CaptureKey::new(r.clone(), CaptureLevel::Page))
        .or_else(|| pages.get(&CaptureKey::new(r.clone(), CaptureLevel::Meta)))
        .map(Arc::clone)
}

/// Unsynchronized cache state, shared by the lock-based policies.
#[derive(Debug, Default)]
struct CacheShard {
    pages: HashMap<CaptureKey, Arc<Page>>,
    attrs: HashMap<String, AttrValue>,
    verify: VerifyState,
}

impl CacheShard {
    fn put(
        &mut self,
        key: CaptureKey,
        page: Arc<Page>,
        library: &Library,
    ) -> Result<(), ConsistencyError> {
        let newly =
            !self.pages.contains_key(&key) && !self.pages.contains_key(&key.other_level());
        self.pages.entry(key).or_insert_with(|| Arc::clone(&page));
        if !newly {
            tracing::trace!(page = %page.page_ref(), "page ref already cached, skipping verification");
            return Ok(());
        }
        let Self { pages, verify, .. } = self;
        let pages = &*pages;
        verify::verify_new_page(&page, verify, |r| lookup_cached(pages, r), library)
    }
}

/// Policy for caches confined to the thread that created them.
///
/// State sits behind a mutex because safe Rust cannot hand out shared
/// mutability without one, but the lock is uncontended by construction;
/// the owner-thread assertion is the actual guard.
pub struct SingleThread {
    owner: ThreadId,
    shard: Mutex<CacheShard>,
}

impl Default for SingleThread {
    fn default() -> Self {
        Self {
            owner: thread::current().id(),
            shard: Mutex::new(CacheShard::default()),
        }
    }
}

impl SingleThread {
    fn assert_owner(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "single-thread cache touched from a foreign thread"
        );
    }
}

impl SyncPolicy for SingleThread {
    fn kind(&self) -> CacheKind {
        CacheKind::SingleThread
    }

    fn get(&self, key: &CaptureKey) -> Option<Arc<Page>> {
        self.assert_owner();
        self.shard.lock().unwrap().pages.get(key).map(Arc::clone)
    }

    fn put(
        &self,
        key: CaptureKey,
        page: Arc<Page>,
        library: &Library,
    ) -> Result<(), ConsistencyError> {
        self.assert_owner();
        self.shard.lock().unwrap().put(key, page, library)
    }

    fn attribute(&self, key: &str) -> Option<AttrValue> {
        self.assert_owner();
        self.shard.lock().unwrap().attrs.get(key).map(Arc::clone)
    }

    fn set_attribute(&self, key: &str, value: AttrValue) {
        self.assert_owner();
        self.shard.lock().unwrap().attrs.insert(key.to_owned(), value);
    }
}

/// Policy serializing every operation through one lock.
#[derive(Default)]
pub struct Synchronized {
    shard: Mutex<CacheShard>,
}

impl SyncPolicy for Synchronized {
    fn kind(&self) -> CacheKind {
        CacheKind::Synchronized
    }

    fn get(&self, key: &CaptureKey) -> Option<Arc<Page>> {
        self.shard.lock().unwrap().pages.get(key).map(Arc::clone)
    }

    fn put(
        &self,
        key: CaptureKey,
        page: Arc<Page>,
        library: &Library,
    ) -> Result<(), ConsistencyError> {
        self.shard.lock().unwrap().put(key, page, library)
    }

    fn attribute(&self, key: &str) -> Option<AttrValue> {
        self.shard.lock().unwrap().attrs.get(key).map(Arc::clone)
    }

    fn set_attribute(&self, key: &str, value: AttrValue) {
        self.shard.lock().unwrap().attrs.insert(key.to_owned(), value);
    }
}

/// Policy allowing parallel page reads and inserts.
///
/// The deferred-claim maps are not safe for unsynchronized concurrent
/// mutation, so the verification step (including the newly-cached
/// decision) runs under its own lock. Two threads may still both miss the
/// cache for the same key and both render; the losing insert is discarded
/// by the shard map's entry semantics.
#[derive(Default)]
pub struct Concurrent {
    pages: DashMap<CaptureKey, Arc<Page>>,
    attrs: DashMap<String, AttrValue>,
    verify: Mutex<VerifyState>,
}

impl Concurrent {
    fn lookup(&self, r: &PageRef) -> Option<Arc<Page>> {
        self.pages
            .get(&CaptureKey::new(r.clone(), CaptureLevel::Page))
            .or_else(|| self.pages.get(&CaptureKey::new(r.clone(), CaptureLevel::Meta)))
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl SyncPolicy for Concurrent {
    fn kind(&self) -> CacheKind {
        CacheKind::Concurrent
    }

    fn get(&self, key: &CaptureKey) -> Option<Arc<Page>> {
        self.pages.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn put(
        &self,
        key: CaptureKey,
        page: Arc<Page>,
        library: &Library,
    ) -> Result<(), ConsistencyError> {
        let mut verify = self.verify.lock().unwrap();
        let newly =
            !self.pages.contains_key(&key) && !self.pages.contains_key(&key.other_level());
        self.pages.entry(key).or_insert_with(|| Arc::clone(&page));
        if !newly {
            return Ok(());
        }
        verify::verify_new_page(&page, &mut verify, |r| self.lookup(r), library)
    }

    fn attribute(&self, key: &str) -> Option<AttrValue> {
        self.attrs.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn set_attribute(&self, key: &str, value: AttrValue) {
        self.attrs.insert(key.to_owned(), value);
    }
}
