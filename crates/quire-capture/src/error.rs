//! Error types for the capture subsystem.

use quire_model::PageRef;

/// Error raised by the rendering layer during a sub-dispatch.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The page voluntarily ended its own capture early.
    ///
    /// This is a control signal, not a failure: the coordinator swallows it
    /// at the sub-dispatch boundary and proceeds with whatever page was
    /// published so far.
    #[error("capture stopped by page")]
    Stopped,
    /// Rendering failed. Propagates to the caller of the capture.
    #[error("render failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RenderError {
    /// Wrap an arbitrary error as a rendering failure.
    pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }
}

/// Bidirectional parent/child disagreement detected while caching a page.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    /// A page declares a parent that does not list it as a child.
    #[error("page {child} declares parent {parent}, which does not list it as a child")]
    ParentDisagrees {
        /// The page making the claim.
        child: PageRef,
        /// The declared parent.
        parent: PageRef,
    },
    /// A page declares a child that does not list it as a parent.
    #[error("page {parent} declares child {child}, which does not list it as a parent")]
    ChildDisagrees {
        /// The page making the claim.
        parent: PageRef,
        /// The declared child.
        child: PageRef,
    },
}

/// Error returned by [`CaptureCoordinator::capture`](crate::CaptureCoordinator::capture).
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The rendering layer returned without publishing a page.
    #[error("capture of {0} produced no page")]
    NoPageProduced(PageRef),
    /// The published page does not match the requested identity.
    #[error("capture of {expected} produced page {actual}")]
    WrongPage {
        /// The page that was asked for.
        expected: PageRef,
        /// The page that was published.
        actual: PageRef,
    },
    /// The rendering layer published more than one page in one sub-dispatch.
    #[error("cannot capture more than one page (capturing {0})")]
    DuplicateResult(PageRef),
    /// Caching the captured page uncovered a parent/child disagreement.
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    /// The rendering layer failed. [`RenderError::Stopped`] never appears
    /// here; the coordinator swallows it.
    #[error(transparent)]
    Render(RenderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_error_names_the_pair() {
        let err = ConsistencyError::ParentDisagrees {
            child: PageRef::new("manual", "guide"),
            parent: PageRef::new("manual", "index"),
        };
        let message = err.to_string();
        assert!(message.contains("manual:guide"));
        assert!(message.contains("manual:index"));
    }

    #[test]
    fn test_render_failure_keeps_source() {
        let err = RenderError::failed("template exploded");
        assert!(err.to_string().contains("template exploded"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
