//! Depth-first enumeration of the page graph.
//!
//! [`PageIndex`] walks the graph from a root page, pre-order, pulling each
//! node through the [`CaptureCoordinator`](crate::CaptureCoordinator) so
//! already-captured pages come from the scope's cache. A seen-set makes
//! the walk safe on diamonds and cycles: a page reachable over several
//! paths appears once, at its first-visited position. The resulting
//! `PageRef -> position` index yields stable anchor identifiers when many
//! pages are combined into one view.

use std::collections::HashMap;
use std::sync::Arc;

use quire_model::{CaptureLevel, Page, PageRef};

use crate::cache::AttrValue;
use crate::coordinator::CaptureCoordinator;
use crate::error::CaptureError;
use crate::scope::Scope;

/// Ordered enumeration of a page graph with positional lookup.
pub struct PageIndex {
    pages: Vec<Arc<Page>>,
    positions: HashMap<PageRef, usize>,
}

impl PageIndex {
    /// Enumerate the graph rooted at `root`, capturing every reachable
    /// page at `level`.
    ///
    /// Child references into missing books are skipped. When the scope
    /// allows fan-out, a node's unvisited children are pre-captured on the
    /// worker pool before the walk descends; the visit order itself stays
    /// deterministic.
    ///
    /// # Errors
    ///
    /// The first failing capture aborts the enumeration.
    pub fn enumerate(
        coordinator: &CaptureCoordinator,
        scope: &Scope<'_>,
        root: &PageRef,
        level: CaptureLevel,
    ) -> Result<Self, CaptureError> {
        let mut pages: Vec<Arc<Page>> = Vec::new();
        let mut positions: HashMap<PageRef, usize> = HashMap::new();
        let mut stack = vec![root.clone()];

        while let Some(page_ref) = stack.pop() {
            if positions.contains_key(&page_ref) {
                continue;
            }
            let page = coordinator.capture(scope, &page_ref, level)?;
            positions.insert(page_ref, pages.len());
            pages.push(Arc::clone(&page));

            let children: Vec<PageRef> = page
                .child_refs()
                .iter()
                .filter(|child| !scope.library().is_missing(child))
                .filter(|child| !positions.contains_key(*child))
                .cloned()
                .collect();

            if scope.concurrent_subcaptures() && children.len() > 1 {
                // Warm the cache in parallel; the walk below hits it.
                coordinator.capture_many(scope, &children, level)?;
            }
            // Reversed, so the first child is visited first.
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }

        tracing::debug!(root = %root, count = pages.len(), "page graph enumerated");
        Ok(Self { pages, positions })
    }

    /// Enumerate through the scope's attribute store, reusing an index
    /// already built for the same root and level within this scope.
    pub fn cached(
        coordinator: &CaptureCoordinator,
        scope: &Scope<'_>,
        root: &PageRef,
        level: CaptureLevel,
    ) -> Result<Arc<Self>, CaptureError> {
        let attr_key = format!("page-index:{root}@{level}");
        if let Some(value) = scope.cache().attribute(&attr_key)
            && let Ok(index) = value.downcast::<Self>()
        {
            return Ok(index);
        }
        let index = Arc::new(Self::enumerate(coordinator, scope, root, level)?);
        scope
            .cache()
            .set_attribute(&attr_key, Arc::clone(&index) as AttrValue);
        Ok(index)
    }

    /// Pages in visit order.
    #[must_use]
    pub fn pages(&self) -> &[Arc<Page>] {
        &self.pages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Position of `page_ref` in the enumeration, if visited.
    #[must_use]
    pub fn position(&self, page_ref: &PageRef) -> Option<usize> {
        self.positions.get(page_ref).copied()
    }

    #[must_use]
    pub fn get(&self, page_ref: &PageRef) -> Option<&Arc<Page>> {
        self.position(page_ref).map(|pos| &self.pages[pos])
    }

    /// Stable anchor identifier for `page_ref` in a combined view.
    #[must_use]
    pub fn anchor(&self, page_ref: &PageRef) -> Option<String> {
        self.position(page_ref).map(|pos| format!("p{pos}"))
    }
}
