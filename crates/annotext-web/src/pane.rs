#![forbid(unsafe_code)]

//! Pane identity and the owned per-pane map.

use std::fmt;

/// One of the two independently scrollable views of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PaneId {
    Left,
    Right,
}

impl PaneId {
    /// Iteration order used wherever panes are visited; keeps flattening
    /// deterministic.
    pub const ALL: [Self; 2] = [Self::Left, Self::Right];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map with exactly one optional slot per [`PaneId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneMap<T> {
    left: Option<T>,
    right: Option<T>,
}

impl<T> Default for PaneMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PaneMap<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            left: None,
            right: None,
        }
    }

    fn slot(&self, pane: PaneId) -> &Option<T> {
        match pane {
            PaneId::Left => &self.left,
            PaneId::Right => &self.right,
        }
    }

    fn slot_mut(&mut self, pane: PaneId) -> &mut Option<T> {
        match pane {
            PaneId::Left => &mut self.left,
            PaneId::Right => &mut self.right,
        }
    }

    #[must_use]
    pub fn get(&self, pane: PaneId) -> Option<&T> {
        self.slot(pane).as_ref()
    }

    pub fn get_mut(&mut self, pane: PaneId) -> Option<&mut T> {
        self.slot_mut(pane).as_mut()
    }

    /// Store `value` for `pane`, returning the previous value.
    pub fn insert(&mut self, pane: PaneId, value: T) -> Option<T> {
        self.slot_mut(pane).replace(value)
    }

    pub fn remove(&mut self, pane: PaneId) -> Option<T> {
        self.slot_mut(pane).take()
    }

    pub fn clear(&mut self) {
        self.left = None;
        self.right = None;
    }

    /// Occupied slots in [`PaneId::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (PaneId, &T)> + '_ {
        PaneId::ALL
            .into_iter()
            .filter_map(move |pane| self.get(pane).map(|value| (pane, value)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.left.is_some()) + usize::from(self.right.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}
