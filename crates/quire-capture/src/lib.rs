//! Multi-level page capture, scoped caching, and graph consistency
//! verification for Quire.
//!
//! Rendering one page can require first capturing other pages it
//! references, at one of three increasing detail levels
//! ([`CaptureLevel`](quire_model::CaptureLevel)). This crate memoizes
//! those captures per logical scope and verifies, lazily and in any
//! discovery order, that declared parent/child edges are reciprocated.
//!
//! - [`CaptureCoordinator`]: the capture protocol (cache fast path,
//!   sub-dispatch into the [`Renderer`], identity validation)
//! - [`CaptureCache`] / [`PageCache`]: scope-lifetime memoization, one
//!   generic cache behind pluggable [`SyncPolicy`] locking strategies
//! - [`ScopeManager`] / [`Scope`]: per-request strategy selection and the
//!   shared export window with a time-to-live
//! - [`PageIndex`]: cycle-safe depth-first enumeration of the page graph
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use quire_capture::{CaptureConfig, CaptureCoordinator, PageIndex, Renderer, ScopeManager};
//! use quire_model::{CaptureLevel, Library, PageRef};
//!
//! # fn renderer() -> Arc<dyn Renderer> { unreachable!() }
//! let library = Arc::new(Library::new().with_book("manual"));
//! let manager = ScopeManager::new(CaptureConfig::default(), Arc::clone(&library));
//! let coordinator = CaptureCoordinator::new(renderer());
//!
//! // One scope per incoming request.
//! let scope = manager.begin_request(false);
//!
//! // Capture a page; repeated captures in this scope hit the cache.
//! let root = PageRef::new("manual", "index");
//! let page = coordinator.capture(&scope, &root, CaptureLevel::Meta)?;
//!
//! // Enumerate the whole graph for a combined view.
//! let index = PageIndex::enumerate(&coordinator, &scope, &root, CaptureLevel::Meta)?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod coordinator;
mod error;
mod policy;
mod scope;
#[cfg(test)]
pub(crate) mod testutil;
mod traverse;
mod verify;

pub use cache::{AttrValue, CacheKind, CaptureCache, CaptureKey, PageCache};
pub use coordinator::{CaptureCoordinator, CaptureCtx, Renderer};
pub use error::{CaptureError, ConsistencyError, RenderError};
pub use policy::{Concurrent, SingleThread, SyncPolicy, Synchronized};
pub use scope::{CaptureConfig, Scope, ScopeManager};
pub use traverse::PageIndex;
