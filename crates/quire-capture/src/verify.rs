//! Lazy bidirectional consistency verification.
//!
//! When a page enters a cache it claims parents and children that may not
//! have been captured yet. Claims that cannot be checked immediately are
//! parked here, keyed by the referenced page, and resolved when (if ever)
//! that page is cached in the same scope. This makes verification
//! order-independent: whichever side of a parent/child pair arrives second
//! completes the check.
//!
//! A mismatch where neither side is ever captured within one scope goes
//! undetected for that scope. That is an accepted approximation, not a
//! soundness guarantee.

use std::collections::HashMap;
use std::sync::Arc;

use quire_model::{Library, Page, PageRef};

use crate::error::ConsistencyError;

/// Claims recorded against pages that were not yet cached.
#[derive(Debug, Default)]
pub(crate) struct VerifyState {
    /// `parent -> children that declared it`, parent not yet cached.
    unverified_parents: HashMap<PageRef, Vec<PageRef>>,
    /// `child -> parents that declared it`, child not yet cached.
    unverified_children: HashMap<PageRef, Vec<PageRef>>,
}

impl VerifyState {
    #[cfg(test)]
    pub(crate) fn pending_parent_claims(&self) -> usize {
        self.unverified_parents.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn pending_child_claims(&self) -> usize {
        self.unverified_children.values().map(Vec::len).sum()
    }
}

/// Record `claimant` under `subject` for later resolution.
///
/// The common case is a single claimant per subject, so the initial
/// allocation stays minimal.
fn park(map: &mut HashMap<PageRef, Vec<PageRef>>, subject: &PageRef, claimant: &PageRef) {
    map.entry(subject.clone())
        .or_insert_with(|| Vec::with_capacity(1))
        .push(claimant.clone());
}

/// Verify a page that was just newly cached.
///
/// `lookup` resolves a [`PageRef`] against the owning cache (page level,
/// falling back to meta level) and must reflect a state that already
/// includes `page` itself.
///
/// Checks run in three passes:
/// 1. each declared parent, immediately if cached, else parked;
/// 2. each declared child, immediately if cached, else parked;
/// 3. claims previously parked against this page, resolved against its
///    actual reference sets.
///
/// References into missing books are unverifiable by design and skipped.
/// The first disagreement found is returned; parked claims for this page
/// are consumed either way.
pub(crate) fn verify_new_page(
    page: &Arc<Page>,
    state: &mut VerifyState,
    lookup: impl Fn(&PageRef) -> Option<Arc<Page>>,
    library: &Library,
) -> Result<(), ConsistencyError> {
    let me = page.page_ref();

    if !page.allow_parent_mismatch() {
        for parent_ref in page.parent_refs() {
            if library.is_missing(parent_ref) {
                continue;
            }
            match lookup(parent_ref) {
                Some(parent) => {
                    if !parent.has_child_ref(me) {
                        return Err(ConsistencyError::ParentDisagrees {
                            child: me.clone(),
                            parent: parent_ref.clone(),
                        });
                    }
                }
                None => {
                    tracing::trace!(page = %me, parent = %parent_ref, "parent not cached yet, parking claim");
                    park(&mut state.unverified_parents, parent_ref, me);
                }
            }
        }
    }

    if !page.allow_child_mismatch() {
        for child_ref in page.child_refs() {
            if library.is_missing(child_ref) {
                continue;
            }
            match lookup(child_ref) {
                Some(child) => {
                    if !child.has_parent_ref(me) {
                        return Err(ConsistencyError::ChildDisagrees {
                            parent: me.clone(),
                            child: child_ref.clone(),
                        });
                    }
                }
                None => {
                    tracing::trace!(page = %me, child = %child_ref, "child not cached yet, parking claim");
                    park(&mut state.unverified_children, child_ref, me);
                }
            }
        }
    }

    // Pages that named this page as their parent before it was cached.
    if let Some(claimants) = state.unverified_parents.remove(me) {
        for child_ref in claimants {
            if !page.has_child_ref(&child_ref) {
                return Err(ConsistencyError::ParentDisagrees {
                    child: child_ref,
                    parent: me.clone(),
                });
            }
        }
    }

    // Pages that named this page as their child before it was cached.
    if let Some(claimants) = state.unverified_children.remove(me) {
        for parent_ref in claimants {
            if !page.has_parent_ref(&parent_ref) {
                return Err(ConsistencyError::ChildDisagrees {
                    parent: parent_ref,
                    child: me.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> Library {
        Library::new().with_book("manual")
    }

    fn make_ref(path: &str) -> PageRef {
        PageRef::new("manual", path)
    }

    fn page_with(path: &str, parents: &[&str], children: &[&str]) -> Arc<Page> {
        let mut page = Page::new(make_ref(path));
        for p in parents {
            page.add_parent_ref(make_ref(p));
        }
        for c in children {
            page.add_child_ref(make_ref(c));
        }
        page.freeze();
        Arc::new(page)
    }

    /// Simple stand-in for the cache: a map of already-captured pages.
    fn lookup_in(
        pages: &HashMap<PageRef, Arc<Page>>,
    ) -> impl Fn(&PageRef) -> Option<Arc<Page>> + '_ {
        |r| pages.get(r).cloned()
    }

    #[test]
    fn test_agreeing_pair_child_first() {
        let library = library();
        let mut state = VerifyState::default();
        let mut cached = HashMap::new();

        let child = page_with("guide", &["index"], &[]);
        let parent = page_with("index", &[], &["guide"]);

        cached.insert(child.page_ref().clone(), Arc::clone(&child));
        verify_new_page(&child, &mut state, lookup_in(&cached), &library).unwrap();
        assert_eq!(state.pending_parent_claims(), 1);

        cached.insert(parent.page_ref().clone(), Arc::clone(&parent));
        verify_new_page(&parent, &mut state, lookup_in(&cached), &library).unwrap();
        assert_eq!(state.pending_parent_claims(), 0);
    }

    #[test]
    fn test_agreeing_pair_parent_first() {
        let library = library();
        let mut state = VerifyState::default();
        let mut cached = HashMap::new();

        let parent = page_with("index", &[], &["guide"]);
        let child = page_with("guide", &["index"], &[]);

        cached.insert(parent.page_ref().clone(), Arc::clone(&parent));
        verify_new_page(&parent, &mut state, lookup_in(&cached), &library).unwrap();
        assert_eq!(state.pending_child_claims(), 1);

        cached.insert(child.page_ref().clone(), Arc::clone(&child));
        verify_new_page(&child, &mut state, lookup_in(&cached), &library).unwrap();
        assert_eq!(state.pending_child_claims(), 0);
    }

    #[test]
    fn test_unresolved_claim_is_not_an_error() {
        let library = library();
        let mut state = VerifyState::default();
        let mut cached = HashMap::new();

        // Parent is never captured: the claim stays parked, silently.
        let child = page_with("guide", &["never-captured"], &[]);
        cached.insert(child.page_ref().clone(), Arc::clone(&child));

        verify_new_page(&child, &mut state, lookup_in(&cached), &library).unwrap();
        assert_eq!(state.pending_parent_claims(), 1);
    }

    #[test]
    fn test_mismatch_detected_immediately() {
        let library = library();
        let mut state = VerifyState::default();
        let mut cached = HashMap::new();

        let parent = page_with("index", &[], &["other"]);
        let child = page_with("guide", &["index"], &[]);

        cached.insert(parent.page_ref().clone(), Arc::clone(&parent));
        verify_new_page(&parent, &mut state, lookup_in(&cached), &library).unwrap();

        cached.insert(child.page_ref().clone(), Arc::clone(&child));
        let err = verify_new_page(&child, &mut state, lookup_in(&cached), &library).unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::ParentDisagrees {
                child: make_ref("guide"),
                parent: make_ref("index"),
            }
        );
    }

    #[test]
    fn test_mismatch_detected_on_deferred_resolution() {
        let library = library();
        let mut state = VerifyState::default();
        let mut cached = HashMap::new();

        // Claimant first, counterpart second: the error surfaces when the
        // counterpart is verified.
        let child = page_with("guide", &["index"], &[]);
        let parent = page_with("index", &[], &["other"]);

        cached.insert(child.page_ref().clone(), Arc::clone(&child));
        verify_new_page(&child, &mut state, lookup_in(&cached), &library).unwrap();

        cached.insert(parent.page_ref().clone(), Arc::clone(&parent));
        let err = verify_new_page(&parent, &mut state, lookup_in(&cached), &library).unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::ParentDisagrees {
                child: make_ref("guide"),
                parent: make_ref("index"),
            }
        );
    }

    #[test]
    fn test_opt_out_suppresses_mismatch() {
        let library = library();
        let mut state = VerifyState::default();
        let mut cached = HashMap::new();

        let mut child = Page::new(make_ref("guide"));
        child.add_parent_ref(make_ref("index"));
        child.set_allow_parent_mismatch(true);
        child.freeze();
        let child = Arc::new(child);
        let parent = page_with("index", &[], &["other"]);

        cached.insert(child.page_ref().clone(), Arc::clone(&child));
        verify_new_page(&child, &mut state, lookup_in(&cached), &library).unwrap();
        // Nothing parked: the opted-out direction records no claim.
        assert_eq!(state.pending_parent_claims(), 0);

        cached.insert(parent.page_ref().clone(), Arc::clone(&parent));
        verify_new_page(&parent, &mut state, lookup_in(&cached), &library).unwrap();
    }

    #[test]
    fn test_missing_book_reference_is_skipped() {
        let library = library();
        let mut state = VerifyState::default();
        let cached = HashMap::new();

        let mut page = Page::new(make_ref("guide"));
        page.add_parent_ref(PageRef::new("attic", "gone"));
        page.add_child_ref(PageRef::new("attic", "also-gone"));
        page.freeze();
        let page = Arc::new(page);

        verify_new_page(&page, &mut state, lookup_in(&cached), &library).unwrap();
        assert_eq!(state.pending_parent_claims(), 0);
        assert_eq!(state.pending_child_claims(), 0);
    }

    #[test]
    fn test_child_side_mismatch() {
        let library = library();
        let mut state = VerifyState::default();
        let mut cached = HashMap::new();

        let child = page_with("guide", &[], &[]);
        let parent = page_with("index", &[], &["guide"]);

        cached.insert(child.page_ref().clone(), Arc::clone(&child));
        verify_new_page(&child, &mut state, lookup_in(&cached), &library).unwrap();

        cached.insert(parent.page_ref().clone(), Arc::clone(&parent));
        let err = verify_new_page(&parent, &mut state, lookup_in(&cached), &library).unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::ChildDisagrees {
                parent: make_ref("index"),
                child: make_ref("guide"),
            }
        );
    }
}
