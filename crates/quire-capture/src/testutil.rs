//! Scripted rendering layer for tests.
//!
//! [`MockRenderer`] plays the role of the real rendering collaborator:
//! each scripted page publishes a fresh [`Page`] built from its
//! [`PageScript`], honoring the dispatch's capture level. Behaviors cover
//! the protocol's failure modes. A dispatch counter makes cache hits
//! observable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use quire_model::{CaptureLevel, Page, PageRef};

use crate::coordinator::{CaptureCtx, Renderer};
use crate::error::RenderError;

/// What a scripted page does when dispatched.
pub(crate) enum Behavior {
    /// Publish the scripted page.
    Publish,
    /// Publish a page with a different identity.
    PublishWrongRef(PageRef),
    /// Return without publishing anything.
    PublishNothing,
    /// Publish the scripted page twice.
    PublishTwice,
    /// Publish, then signal voluntary early termination.
    StopAfterPublish,
    /// Signal voluntary early termination before publishing.
    StopBeforePublish,
    /// Fail rendering with the given message.
    Fail(&'static str),
    /// Capture another page first, then publish the scripted page.
    CaptureThenPublish(PageRef, CaptureLevel),
}

/// Script for one page.
pub(crate) struct PageScript {
    page_ref: PageRef,
    title: Option<String>,
    parents: Vec<PageRef>,
    children: Vec<PageRef>,
    allow_parent_mismatch: bool,
    allow_child_mismatch: bool,
    behavior: Behavior,
}

impl PageScript {
    pub(crate) fn new(page_ref: PageRef) -> Self {
        Self {
            page_ref,
            title: None,
            parents: Vec::new(),
            children: Vec::new(),
            allow_parent_mismatch: false,
            allow_child_mismatch: false,
            behavior: Behavior::Publish,
        }
    }

    pub(crate) fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_owned());
        self
    }

    pub(crate) fn with_parent(mut self, r: PageRef) -> Self {
        self.parents.push(r);
        self
    }

    pub(crate) fn with_child(mut self, r: PageRef) -> Self {
        self.children.push(r);
        self
    }

    pub(crate) fn with_allow_parent_mismatch(mut self) -> Self {
        self.allow_parent_mismatch = true;
        self
    }

    pub(crate) fn with_allow_child_mismatch(mut self) -> Self {
        self.allow_child_mismatch = true;
        self
    }

    pub(crate) fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Build a fresh page for one dispatch. Content metadata (the title)
    /// appears only from meta level up.
    fn build(&self, level: CaptureLevel) -> Page {
        self.build_as(&self.page_ref, level)
    }

    fn build_as(&self, page_ref: &PageRef, level: CaptureLevel) -> Page {
        let mut page = Page::new(page_ref.clone());
        if level >= CaptureLevel::Meta
            && let Some(title) = &self.title
        {
            page.set_title(title.clone());
        }
        for r in &self.parents {
            page.add_parent_ref(r.clone());
        }
        for r in &self.children {
            page.add_child_ref(r.clone());
        }
        page.set_allow_parent_mismatch(self.allow_parent_mismatch);
        page.set_allow_child_mismatch(self.allow_child_mismatch);
        page
    }
}

/// Scripted rendering collaborator with a dispatch counter.
#[derive(Default)]
pub(crate) struct MockRenderer {
    scripts: HashMap<PageRef, PageScript>,
    dispatches: AtomicUsize,
}

impl MockRenderer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page(mut self, script: PageScript) -> Self {
        self.scripts.insert(script.page_ref.clone(), script);
        self
    }

    /// Number of sub-dispatches served so far.
    pub(crate) fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

impl Renderer for MockRenderer {
    fn render(&self, ctx: &CaptureCtx<'_>, page_ref: &PageRef) -> Result<(), RenderError> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(page_ref)
            .ok_or_else(|| RenderError::failed(format!("no source for page {page_ref}")))?;

        match &script.behavior {
            Behavior::Publish => ctx.publish(script.build(ctx.level())),
            Behavior::PublishWrongRef(other) => {
                ctx.publish(script.build_as(other, ctx.level()));
            }
            Behavior::PublishNothing => {}
            Behavior::PublishTwice => {
                ctx.publish(script.build(ctx.level()));
                ctx.publish(script.build(ctx.level()));
            }
            Behavior::StopAfterPublish => {
                ctx.publish(script.build(ctx.level()));
                return Err(RenderError::Stopped);
            }
            Behavior::StopBeforePublish => return Err(RenderError::Stopped),
            Behavior::Fail(message) => return Err(RenderError::failed(*message)),
            Behavior::CaptureThenPublish(other, level) => {
                ctx.capture(other, *level).map_err(RenderError::failed)?;
                ctx.publish(script.build(ctx.level()));
            }
        }
        Ok(())
    }
}
