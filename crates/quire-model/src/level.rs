//! Capture detail levels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How much of a page a capture must produce.
///
/// Levels form a total order: `Page < Meta < Body`. Callers compare with
/// `>=` to decide whether already-captured data satisfies a request, and
/// whether a capture result may be memoized at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureLevel {
    /// Identity and declared references only.
    Page,
    /// [`Page`](Self::Page) data plus content metadata (title, summary).
    Meta,
    /// Full rendered content. Never memoized.
    Body,
}

impl CaptureLevel {
    /// Whether captures at this level may be stored in a cache.
    ///
    /// Body captures carry rendered output owned by the caller and are
    /// always re-rendered.
    #[must_use]
    pub fn cacheable(self) -> bool {
        self < Self::Body
    }

    /// Level applied when a rendering context carries no explicit level:
    /// no restriction, produce everything.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::Body
    }
}

impl fmt::Display for CaptureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page => write!(f, "page"),
            Self::Meta => write!(f, "meta"),
            Self::Body => write!(f, "body"),
        }
    }
}
