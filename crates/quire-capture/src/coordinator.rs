//! The capture protocol.
//!
//! A *capture* renders a page into a structured [`Page`] at a requested
//! [`CaptureLevel`], going through the scope's cache first. A cache miss
//! performs a *sub-dispatch*: a synchronous, re-entrant invocation of the
//! rendering layer as if the target page were being rendered on its own,
//! read-only, with textual output discarded below body level.
//!
//! Each sub-dispatch gets a fresh [`CaptureCtx`] frame: the current
//! node/page slots start cleared and the capture level is pinned to the
//! request. The caller's frame is untouched and is restored implicitly
//! when the call returns, on error paths included; there are no manual
//! save/restore pairs to forget.

use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use quire_model::{CaptureLevel, Page, PageRef};

use crate::cache::CaptureKey;
use crate::error::{CaptureError, RenderError};
use crate::scope::Scope;

/// The rendering layer, as the capture subsystem sees it.
///
/// An implementation must construct exactly one [`Page`] matching
/// `page_ref`, populate it honoring [`CaptureCtx::level`], and hand it
/// over via [`CaptureCtx::publish`] before returning. Whatever textual
/// output rendering produces below body level is the implementation's own
/// business; the coordinator only consumes the structured page.
///
/// Returning [`RenderError::Stopped`] ends the capture early without
/// failing it.
pub trait Renderer: Send + Sync {
    fn render(&self, ctx: &CaptureCtx<'_>, page_ref: &PageRef) -> Result<(), RenderError>;
}

/// The page handed over by the rendering layer, plus a flag recording an
/// attempt to hand over a second one.
#[derive(Default)]
struct ResultHolder {
    page: Option<Page>,
    overflow: bool,
}

/// Per-sub-dispatch rendering context.
///
/// Replaces ambient per-thread state with an explicit frame: the capture
/// level for this dispatch, the current node/page slots the rendering
/// layer works with, and the holder for the captured page.
pub struct CaptureCtx<'a> {
    coordinator: &'a CaptureCoordinator,
    scope: &'a Scope<'a>,
    target: PageRef,
    level: CaptureLevel,
    current_node: Mutex<Option<PageRef>>,
    current_page: Mutex<Option<Arc<Page>>>,
    result: Mutex<ResultHolder>,
}

impl<'a> CaptureCtx<'a> {
    fn new(
        coordinator: &'a CaptureCoordinator,
        scope: &'a Scope<'a>,
        target: PageRef,
        level: CaptureLevel,
    ) -> Self {
        Self {
            coordinator,
            scope,
            target,
            level,
            current_node: Mutex::new(None),
            current_page: Mutex::new(None),
            result: Mutex::new(ResultHolder::default()),
        }
    }

    /// The scope this capture runs in.
    #[must_use]
    pub fn scope(&self) -> &Scope<'a> {
        self.scope
    }

    /// The level this dispatch must produce. A context outside any capture
    /// has no restriction, which is [`CaptureLevel::unrestricted`].
    #[must_use]
    pub fn level(&self) -> CaptureLevel {
        self.level
    }

    /// The page this dispatch is expected to produce.
    #[must_use]
    pub fn target(&self) -> &PageRef {
        &self.target
    }

    /// Hand over the captured page.
    ///
    /// At most one page may be published per sub-dispatch; a second
    /// publication is a structural error reported to the capture's caller.
    /// The first page is kept.
    pub fn publish(&self, page: Page) {
        let mut result = self.result.lock().unwrap();
        if result.page.is_some() {
            result.overflow = true;
        } else {
            result.page = Some(page);
        }
    }

    /// Capture another page from within this render.
    ///
    /// The nested dispatch runs in its own frame; this frame's slots are
    /// unaffected.
    pub fn capture(
        &self,
        page_ref: &PageRef,
        level: CaptureLevel,
    ) -> Result<Arc<Page>, CaptureError> {
        self.coordinator.capture(self.scope, page_ref, level)
    }

    /// Current site-tree node, if the rendering layer set one.
    #[must_use]
    pub fn current_node(&self) -> Option<PageRef> {
        self.current_node.lock().unwrap().clone()
    }

    pub fn set_current_node(&self, node: Option<PageRef>) {
        *self.current_node.lock().unwrap() = node;
    }

    /// Page currently being rendered, if the rendering layer set one.
    #[must_use]
    pub fn current_page(&self) -> Option<Arc<Page>> {
        self.current_page.lock().unwrap().clone()
    }

    pub fn set_current_page(&self, page: Option<Arc<Page>>) {
        *self.current_page.lock().unwrap() = page;
    }

    fn into_result(self) -> ResultHolder {
        self.result.into_inner().unwrap()
    }
}

/// Orchestrates captures: cache fast path, sub-dispatch, identity
/// validation, cache insertion.
pub struct CaptureCoordinator {
    renderer: Arc<dyn Renderer>,
}

impl CaptureCoordinator {
    #[must_use]
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }

    /// Capture `target` at `level` within `scope`.
    ///
    /// Non-body levels hit the scope's cache first and insert on success.
    /// Body captures always dispatch and are never memoized.
    ///
    /// # Errors
    ///
    /// Structural errors ([`CaptureError::NoPageProduced`],
    /// [`CaptureError::WrongPage`], [`CaptureError::DuplicateResult`]),
    /// consistency errors found while caching, and rendering failures all
    /// propagate to the caller; none of them leaves a partially-built page
    /// in the cache. There are no retries at this layer.
    pub fn capture(
        &self,
        scope: &Scope<'_>,
        target: &PageRef,
        level: CaptureLevel,
    ) -> Result<Arc<Page>, CaptureError> {
        if level.cacheable() {
            let key = CaptureKey::new(target.clone(), level);
            if let Some(page) = scope.cache().get(&key) {
                tracing::trace!(key = %key, "capture cache hit");
                return Ok(page);
            }
        }

        let page = Arc::new(self.dispatch(scope, target, level)?);

        if level.cacheable() {
            scope
                .cache()
                .put(CaptureKey::new(target.clone(), level), Arc::clone(&page))?;
        }
        Ok(page)
    }

    /// Capture several pages at the same level.
    ///
    /// Fans out onto the worker pool when the scope allows it, blocking
    /// until every capture returns or one fails. Results keep the order of
    /// `targets`. Two workers may both render the same ref; the cache
    /// keeps the first result and both callers get a valid page.
    pub fn capture_many(
        &self,
        scope: &Scope<'_>,
        targets: &[PageRef],
        level: CaptureLevel,
    ) -> Result<Vec<Arc<Page>>, CaptureError> {
        if scope.concurrent_subcaptures() && targets.len() > 1 {
            targets
                .par_iter()
                .map(|target| self.capture(scope, target, level))
                .collect()
        } else {
            targets
                .iter()
                .map(|target| self.capture(scope, target, level))
                .collect()
        }
    }

    /// Run one sub-dispatch in a fresh context frame.
    fn dispatch(
        &self,
        scope: &Scope<'_>,
        target: &PageRef,
        level: CaptureLevel,
    ) -> Result<Page, CaptureError> {
        tracing::debug!(page = %target, level = %level, "sub-dispatch");
        let ctx = CaptureCtx::new(self, scope, target.clone(), level);

        match self.renderer.render(&ctx, target) {
            Ok(()) => {}
            Err(RenderError::Stopped) => {
                // Voluntary early termination ends only this capture.
                tracing::trace!(page = %target, "capture stopped early by page");
            }
            Err(err) => return Err(CaptureError::Render(err)),
        }

        let result = ctx.into_result();
        if result.overflow {
            return Err(CaptureError::DuplicateResult(target.clone()));
        }
        let mut page = result
            .page
            .ok_or_else(|| CaptureError::NoPageProduced(target.clone()))?;
        if page.page_ref() != target {
            return Err(CaptureError::WrongPage {
                expected: target.clone(),
                actual: page.page_ref().clone(),
            });
        }
        page.freeze();
        Ok(page)
    }
}
