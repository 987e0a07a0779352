//! Page identity and captured page data.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a book (a top-level grouping of pages).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identity of a page: book plus book-relative path.
///
/// Value semantics throughout; used as a map key by the capture cache.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRef {
    book: BookId,
    path: String,
}

impl PageRef {
    #[must_use]
    pub fn new(book: impl Into<BookId>, path: impl Into<String>) -> Self {
        Self {
            book: book.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn book(&self) -> &BookId {
        &self.book
    }

    /// Book-relative path, without leading slash (e.g. `guide/setup`).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.book, self.path)
    }
}

/// A captured page.
///
/// Created fresh for each capture, populated by the rendering layer while
/// mutable, then frozen. Frozen pages never change their declared
/// parent/child reference sets; the capture cache relies on this.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    page_ref: PageRef,
    /// Display title, if the capture level produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    parent_refs: Vec<PageRef>,
    child_refs: Vec<PageRef>,
    /// Opts this page out of parent-side consistency verification.
    #[serde(default)]
    allow_parent_mismatch: bool,
    /// Opts this page out of child-side consistency verification.
    #[serde(default)]
    allow_child_mismatch: bool,
    #[serde(skip)]
    frozen: bool,
}

impl Page {
    /// Create a new, mutable page for `page_ref`.
    #[must_use]
    pub fn new(page_ref: PageRef) -> Self {
        Self {
            page_ref,
            title: None,
            parent_refs: Vec::new(),
            child_refs: Vec::new(),
            allow_parent_mismatch: false,
            allow_child_mismatch: false,
            frozen: false,
        }
    }

    #[must_use]
    pub fn page_ref(&self) -> &PageRef {
        &self.page_ref
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.assert_mutable();
        self.title = Some(title.into());
    }

    /// Declared parent references, in declaration order.
    #[must_use]
    pub fn parent_refs(&self) -> &[PageRef] {
        &self.parent_refs
    }

    /// Declared child references, in declaration order.
    #[must_use]
    pub fn child_refs(&self) -> &[PageRef] {
        &self.child_refs
    }

    #[must_use]
    pub fn has_parent_ref(&self, r: &PageRef) -> bool {
        self.parent_refs.contains(r)
    }

    #[must_use]
    pub fn has_child_ref(&self, r: &PageRef) -> bool {
        self.child_refs.contains(r)
    }

    /// Declare a parent reference. Duplicate declarations are ignored.
    pub fn add_parent_ref(&mut self, r: PageRef) {
        self.assert_mutable();
        if !self.parent_refs.contains(&r) {
            self.parent_refs.push(r);
        }
    }

    /// Declare a child reference. Duplicate declarations are ignored.
    pub fn add_child_ref(&mut self, r: PageRef) {
        self.assert_mutable();
        if !self.child_refs.contains(&r) {
            self.child_refs.push(r);
        }
    }

    #[must_use]
    pub fn allow_parent_mismatch(&self) -> bool {
        self.allow_parent_mismatch
    }

    pub fn set_allow_parent_mismatch(&mut self, allow: bool) {
        self.assert_mutable();
        self.allow_parent_mismatch = allow;
    }

    #[must_use]
    pub fn allow_child_mismatch(&self) -> bool {
        self.allow_child_mismatch
    }

    pub fn set_allow_child_mismatch(&mut self, allow: bool) {
        self.assert_mutable();
        self.allow_child_mismatch = allow;
    }

    /// Seal the page. All mutators panic after this.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn assert_mutable(&self) {
        assert!(!self.frozen, "page {} is frozen", self.page_ref);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn make_ref(path: &str) -> PageRef {
        PageRef::new("manual", path)
    }

    #[test]
    fn test_page_ref_value_equality() {
        assert_eq!(make_ref("intro"), PageRef::new("manual", "intro"));
        assert_ne!(make_ref("intro"), PageRef::new("other", "intro"));
        assert_ne!(make_ref("intro"), make_ref("intro/setup"));
    }

    #[test]
    fn test_page_ref_display() {
        assert_eq!(make_ref("guide/setup").to_string(), "manual:guide/setup");
    }

    #[test]
    fn test_duplicate_refs_ignored() {
        let mut page = Page::new(make_ref("intro"));
        page.add_child_ref(make_ref("a"));
        page.add_child_ref(make_ref("a"));
        page.add_parent_ref(make_ref("root"));
        page.add_parent_ref(make_ref("root"));

        assert_eq!(page.child_refs().len(), 1);
        assert_eq!(page.parent_refs().len(), 1);
    }

    #[test]
    fn test_ref_membership() {
        let mut page = Page::new(make_ref("intro"));
        page.add_child_ref(make_ref("a"));

        assert!(page.has_child_ref(&make_ref("a")));
        assert!(!page.has_child_ref(&make_ref("b")));
        assert!(!page.has_parent_ref(&make_ref("a")));
    }

    #[test]
    fn test_freeze_marks_frozen() {
        let mut page = Page::new(make_ref("intro"));
        assert!(!page.is_frozen());
        page.freeze();
        assert!(page.is_frozen());
    }

    #[test]
    #[should_panic(expected = "is frozen")]
    fn test_frozen_page_rejects_mutation() {
        let mut page = Page::new(make_ref("intro"));
        page.freeze();
        page.add_child_ref(make_ref("a"));
    }

    #[test]
    fn test_serde_skips_frozen_flag() {
        let mut page = Page::new(make_ref("intro"));
        page.set_title("Intro");
        page.freeze();

        let json = serde_json::to_string(&page).unwrap();
        let restored: Page = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.page_ref(), page.page_ref());
        assert_eq!(restored.title(), Some("Intro"));
        // Deserialized pages come back mutable
        assert!(!restored.is_frozen());
    }
}
