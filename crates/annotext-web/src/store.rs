#![forbid(unsafe_code)]

//! Per-view annotation store.
//!
//! Each pane owns the list produced by its most recent applied load. Lists are
//! replaced wholesale; there is no incremental patching. The store is read only
//! by the render step, after the writes of a cycle have completed.

use std::fmt;

use crate::convert::WebAnnotation;
use crate::pane::{PaneId, PaneMap};

/// Monotonic identifier of one reload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LoadToken(u64);

impl LoadToken {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for LoadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Annotation list recorded for one pane.
#[derive(Debug, Clone, PartialEq)]
pub struct PaneView {
    pub token: LoadToken,
    pub annotations: Vec<WebAnnotation>,
}

#[derive(Debug, Default)]
pub struct AnnotationStore {
    views: PaneMap<PaneView>,
}

impl AnnotationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `pane`'s list with the result of cycle `token`.
    ///
    /// Returns `false` and leaves the store untouched when the pane already
    /// holds a list from a newer cycle.
    pub fn record_view(
        &mut self,
        pane: PaneId,
        token: LoadToken,
        annotations: Vec<WebAnnotation>,
    ) -> bool {
        if self.views.get(pane).is_some_and(|view| view.token > token) {
            return false;
        }
        self.views.insert(pane, PaneView { token, annotations });
        true
    }

    #[must_use]
    pub fn view(&self, pane: PaneId) -> Option<&PaneView> {
        self.views.get(pane)
    }

    #[must_use]
    pub fn annotations(&self, pane: PaneId) -> &[WebAnnotation] {
        self.views.get(pane).map_or(&[], |view| view.annotations.as_slice())
    }

    /// All panes' lists concatenated in [`PaneId::ALL`] order.
    ///
    /// The same entity loaded by both panes appears once per pane.
    #[must_use]
    pub fn flatten_all(&self) -> Vec<WebAnnotation> {
        let mut out = Vec::with_capacity(self.len());
        for (_, view) in self.views.iter() {
            out.extend(view.annotations.iter().cloned());
        }
        out
    }

    /// Total annotation count across panes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.iter().map(|(_, view)| view.annotations.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }
}
