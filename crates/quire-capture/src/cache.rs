//! The capture cache interface and its generic implementation.
//!
//! A capture cache memoizes captured pages per logical scope, keyed by
//! `(page ref, capture level)`. Two rules shape the key space:
//!
//! - Body-level captures are never cached: [`CaptureKey`] cannot be built
//!   for [`CaptureLevel::Body`].
//! - A meta-level entry satisfies a page-level lookup, since meta data is a
//!   superset of page data.
//!
//! Inserting a page triggers consistency verification exactly once per
//! page ref (whichever of the two cacheable levels arrives first); see
//! [`crate::verify`] for the deferred bookkeeping.
//!
//! [`PageCache`] is a single cache type parameterized by a
//! [`SyncPolicy`](crate::SyncPolicy), so the locking strategy is chosen at
//! construction instead of through parallel implementations.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use quire_model::{CaptureLevel, Library, Page, PageRef};

use crate::error::ConsistencyError;
use crate::policy::SyncPolicy;

/// Cache key: a page ref at a cacheable capture level.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CaptureKey {
    page_ref: PageRef,
    level: CaptureLevel,
}

impl CaptureKey {
    /// Build a key for `page_ref` at `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level` is [`CaptureLevel::Body`]; body captures are never
    /// memoized.
    #[must_use]
    pub fn new(page_ref: PageRef, level: CaptureLevel) -> Self {
        assert!(level.cacheable(), "body captures are never cached");
        Self { page_ref, level }
    }

    #[must_use]
    pub fn page_ref(&self) -> &PageRef {
        &self.page_ref
    }

    #[must_use]
    pub fn level(&self) -> CaptureLevel {
        self.level
    }

    /// The same page ref at the other cacheable level.
    #[must_use]
    pub(crate) fn other_level(&self) -> Self {
        let level = match self.level {
            CaptureLevel::Page => CaptureLevel::Meta,
            _ => CaptureLevel::Page,
        };
        Self {
            page_ref: self.page_ref.clone(),
            level,
        }
    }
}

impl fmt::Display for CaptureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.page_ref, self.level)
    }
}

/// Which synchronization strategy a cache instance uses. For diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
    /// No locking; asserts single-threaded use.
    SingleThread,
    /// One coarse lock per cache instance.
    Synchronized,
    /// Sharded map for reads and inserts, verification serialized.
    Concurrent,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleThread => write!(f, "single-thread"),
            Self::Synchronized => write!(f, "synchronized"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Value stored in a cache's generic attribute slot.
pub type AttrValue = Arc<dyn Any + Send + Sync>;

/// Scope-lifetime memoization of captured pages.
///
/// Installed per scope by the [`ScopeManager`](crate::ScopeManager);
/// consumers hold it as `Arc<dyn CaptureCache>`.
pub trait CaptureCache: Send + Sync {
    /// The synchronization strategy behind this instance.
    fn kind(&self) -> CacheKind;

    /// Look up a cached page.
    ///
    /// A page-level lookup transparently falls back to a meta-level entry
    /// for the same ref. A meta-level lookup never degrades to a page-level
    /// entry.
    fn get(&self, key: &CaptureKey) -> Option<Arc<Page>>;

    /// Insert a captured page.
    ///
    /// Idempotent: re-inserting a present key (or the other level of an
    /// already-cached ref) keeps the first page and skips verification.
    /// The first insert for a page ref runs consistency verification; a
    /// detected disagreement fails the insert's caller, with the page and
    /// its parked claims left in place.
    fn put(&self, key: CaptureKey, page: Arc<Page>) -> Result<(), ConsistencyError>;

    /// Read a scope-lifetime attribute unrelated to pages.
    fn attribute(&self, key: &str) -> Option<AttrValue>;

    /// Store a scope-lifetime attribute, replacing any previous value.
    fn set_attribute(&self, key: &str, value: AttrValue);

    /// Read an attribute, computing and storing it on a miss.
    ///
    /// Concurrent first computations may race; the losing value is simply
    /// overwritten, which callers must tolerate (memoized values are
    /// required to be equivalent).
    fn attribute_or_insert_with(&self, key: &str, init: &dyn Fn() -> AttrValue) -> AttrValue {
        if let Some(value) = self.attribute(key) {
            return value;
        }
        let value = init();
        self.set_attribute(key, Arc::clone(&value));
        value
    }
}

/// The one concrete cache, generic over its synchronization policy.
pub struct PageCache<P: SyncPolicy> {
    policy: P,
    library: Arc<Library>,
}

impl<P: SyncPolicy + Default> PageCache<P> {
    /// Create an empty cache verifying against `library`.
    #[must_use]
    pub fn new(library: Arc<Library>) -> Self {
        Self {
            policy: P::default(),
            library,
        }
    }
}

impl<P: SyncPolicy> CaptureCache for PageCache<P> {
    fn kind(&self) -> CacheKind {
        self.policy.kind()
    }

    fn get(&self, key: &CaptureKey) -> Option<Arc<Page>> {
        self.policy.get(key).or_else(|| {
            // Meta data is a superset of page data.
            (key.level() == CaptureLevel::Page)
                .then(|| self.policy.get(&key.other_level()))
                .flatten()
        })
    }

    fn put(&self, key: CaptureKey, page: Arc<Page>) -> Result<(), ConsistencyError> {
        debug_assert_eq!(key.page_ref(), page.page_ref(), "key/page identity mismatch");
        debug_assert!(page.is_frozen(), "cached pages must be frozen");
        self.policy.put(key, page, &self.library)
    }

    fn attribute(&self, key: &str) -> Option<AttrValue> {
        self.policy.attribute(key)
    }

    fn set_attribute(&self, key: &str, value: AttrValue) {
        self.policy.set_attribute(key, value);
    }
}
