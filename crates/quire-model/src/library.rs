//! The set of known books.

use std::collections::BTreeSet;

use crate::page::{BookId, PageRef};

/// Registry of books known to the site.
///
/// A [`PageRef`] whose book is not registered here points into a *missing*
/// book: it can never resolve to a page, and consistency verification
/// excludes such references by design.
#[derive(Clone, Debug, Default)]
pub struct Library {
    books: BTreeSet<BookId>,
}

impl Library {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration, for wiring and tests.
    #[must_use]
    pub fn with_book(mut self, book: impl Into<BookId>) -> Self {
        self.add_book(book);
        self
    }

    pub fn add_book(&mut self, book: impl Into<BookId>) {
        self.books.insert(book.into());
    }

    #[must_use]
    pub fn contains(&self, book: &BookId) -> bool {
        self.books.contains(book)
    }

    /// Whether `page_ref` points into a book this library does not know.
    #[must_use]
    pub fn is_missing(&self, page_ref: &PageRef) -> bool {
        !self.books.contains(page_ref.book())
    }

    /// Registered books, in sorted order.
    pub fn books(&self) -> impl Iterator<Item = &BookId> {
        self.books.iter()
    }
}
