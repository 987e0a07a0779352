//! Page and book data model for Quire.
//!
//! This crate provides the value types shared by the capture subsystem and
//! the rendering layer:
//!
//! - [`BookId`] / [`PageRef`]: page identity (book + book-relative path)
//! - [`CaptureLevel`]: how much of a page a capture must produce
//! - [`Page`]: a captured page with declared parent/child references and a
//!   mutable-until-frozen lifecycle
//! - [`Library`]: the set of known books, used to classify references into
//!   missing books
//!
//! # Example
//!
//! ```
//! use quire_model::{CaptureLevel, Page, PageRef};
//!
//! let mut page = Page::new(PageRef::new("manual", "intro"));
//! page.add_child_ref(PageRef::new("manual", "intro/setup"));
//! page.freeze();
//!
//! assert!(page.is_frozen());
//! assert!(CaptureLevel::Page < CaptureLevel::Body);
//! ```

mod level;
mod library;
mod page;

pub use level::CaptureLevel;
pub use library::Library;
pub use page::{BookId, Page, PageRef};
