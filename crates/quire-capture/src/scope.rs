//! Request scopes and cache strategy selection.
//!
//! A [`Scope`] is the lifetime and sharing boundary of one capture cache:
//! a plain request, a request allowed to fan sub-captures onto worker
//! threads, or the process-wide export window shared by bulk-export
//! requests for up to a time-to-live.
//!
//! The [`ScopeManager`] picks the cache strategy when a request begins:
//!
//! | strategy | selected when |
//! |---|---|
//! | single-thread | concurrency not recommended |
//! | synchronized | recommended, fan-out disabled site-wide |
//! | concurrent | recommended, fan-out enabled |
//! | export-shared | request carries the exporting signal |
//!
//! The concurrency recommendation is computed once from the active-request
//! count and held constant for the request's lifetime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde::Deserialize;

use quire_model::Library;

use crate::cache::{CacheKind, CaptureCache, PageCache};
use crate::policy::{Concurrent, SingleThread, Synchronized};

/// Capture subsystem configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Lifetime of the shared export cache, in seconds.
    pub export_ttl_secs: u64,
    /// Active-request count at or above which sub-capture fan-out is no
    /// longer recommended.
    pub concurrency_threshold: usize,
    /// Site-wide switch: may sub-captures run on worker threads at all?
    pub concurrent_subcaptures: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            export_ttl_secs: 60,
            concurrency_threshold: 8,
            concurrent_subcaptures: true,
        }
    }
}

impl CaptureConfig {
    fn export_ttl(&self) -> Duration {
        Duration::from_secs(self.export_ttl_secs)
    }
}

/// The process-wide shared cache for export-mode requests.
struct ExportSlot {
    cache: Arc<dyn CaptureCache>,
    created: SystemTime,
}

/// Whether an export window created at `created` is over at `now`.
///
/// A window also counts as over when the system clock moved backwards past
/// the window boundary; a cache stamped in the future would otherwise
/// survive indefinitely.
fn window_expired(created: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    match now.duration_since(created) {
        Ok(age) => age >= ttl,
        Err(err) => err.duration() >= ttl,
    }
}

/// Wires cache strategy selection to the request lifecycle.
///
/// One manager exists per process. It tracks the active-request count for
/// the concurrency recommendation and owns the export-shared cache slot.
/// The slot lock is distinct from any per-cache lock.
pub struct ScopeManager {
    config: CaptureConfig,
    library: Arc<Library>,
    active_requests: AtomicUsize,
    export: Mutex<Option<ExportSlot>>,
}

impl ScopeManager {
    #[must_use]
    pub fn new(config: CaptureConfig, library: Arc<Library>) -> Self {
        Self {
            config,
            library,
            active_requests: AtomicUsize::new(0),
            export: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    #[must_use]
    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Open a capture scope for one incoming request.
    ///
    /// `exporting` is the caller-supplied signal that this request belongs
    /// to a site-wide bulk export and wants the shared cache window. The
    /// returned scope closes when dropped.
    pub fn begin_request(&self, exporting: bool) -> Scope<'_> {
        let previous = self.active_requests.fetch_add(1, Ordering::SeqCst);
        let recommended = previous < self.config.concurrency_threshold;
        let concurrent = recommended && self.config.concurrent_subcaptures;

        let cache = if exporting {
            self.export_cache()
        } else {
            self.drop_expired_export();
            if !recommended {
                Arc::new(PageCache::<SingleThread>::new(Arc::clone(&self.library)))
                    as Arc<dyn CaptureCache>
            } else if self.config.concurrent_subcaptures {
                Arc::new(PageCache::<Concurrent>::new(Arc::clone(&self.library)))
                    as Arc<dyn CaptureCache>
            } else {
                Arc::new(PageCache::<Synchronized>::new(Arc::clone(&self.library)))
                    as Arc<dyn CaptureCache>
            }
        };

        tracing::debug!(
            kind = %cache.kind(),
            exporting,
            concurrent,
            active = previous + 1,
            "capture scope opened"
        );

        Scope {
            manager: self,
            cache,
            exporting,
            concurrent,
        }
    }

    /// Fetch the shared export cache, replacing it when its window is over.
    ///
    /// Two exporting requests racing past an expired window may briefly
    /// build two cold caches; the slot keeps the later one, which is
    /// harmless.
    fn export_cache(&self) -> Arc<dyn CaptureCache> {
        let now = SystemTime::now();
        let ttl = self.config.export_ttl();
        let mut slot = self.export.lock().unwrap();

        if let Some(current) = slot.as_ref()
            && !window_expired(current.created, now, ttl)
        {
            return Arc::clone(&current.cache);
        }

        if slot.is_some() {
            tracing::debug!("export cache window elapsed, replacing");
        } else {
            tracing::debug!("creating export cache");
        }
        let cache = self.fresh_shared_cache();
        *slot = Some(ExportSlot {
            cache: Arc::clone(&cache),
            created: now,
        });
        cache
    }

    /// Drop the export cache once its window is over.
    ///
    /// Called by non-exporting requests, so an abandoned export window does
    /// not pin its cache until the next export.
    fn drop_expired_export(&self) {
        let now = SystemTime::now();
        let ttl = self.config.export_ttl();
        let mut slot = self.export.lock().unwrap();
        if slot
            .as_ref()
            .is_some_and(|s| window_expired(s.created, now, ttl))
        {
            tracing::debug!("export cache window elapsed, dropping");
            *slot = None;
        }
    }

    fn fresh_shared_cache(&self) -> Arc<dyn CaptureCache> {
        if self.config.concurrent_subcaptures {
            Arc::new(PageCache::<Concurrent>::new(Arc::clone(&self.library)))
        } else {
            Arc::new(PageCache::<Synchronized>::new(Arc::clone(&self.library)))
        }
    }
}

/// One request's capture scope: its cache plus the concurrency decision
/// made when the request began.
pub struct Scope<'m> {
    manager: &'m ScopeManager,
    cache: Arc<dyn CaptureCache>,
    exporting: bool,
    concurrent: bool,
}

impl Scope<'_> {
    /// The cache installed for this scope.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn CaptureCache> {
        &self.cache
    }

    /// Strategy behind this scope's cache, for diagnostics.
    #[must_use]
    pub fn cache_kind(&self) -> CacheKind {
        self.cache.kind()
    }

    /// Books known to the site, for missing-book classification.
    #[must_use]
    pub fn library(&self) -> &Arc<Library> {
        self.manager.library()
    }

    /// Whether this request carries the bulk-export signal.
    #[must_use]
    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    /// Whether sub-captures may fan out onto worker threads.
    ///
    /// Decided once when the request began; constant for the scope's
    /// lifetime.
    #[must_use]
    pub fn concurrent_subcaptures(&self) -> bool {
        self.concurrent
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.manager.active_requests.fetch_sub(1, Ordering::SeqCst);
    }
}
