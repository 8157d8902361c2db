#![forbid(unsafe_code)]

//! Unpacked annotation records for one document window.
//!
//! All offsets are in UTF-16 code units, the unit shared by the DOM and the
//! annotation server. Span offsets inside an [`AnnotatedText`] are relative to
//! its [`DocumentWindow`] until the converter rebases them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Stable entity identifier issued by the annotation store.
///
/// Independent of the rendering layer's `#` id convention; see
/// [`crate::convert::prefixed_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Vid(String);

impl Vid {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Vid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Vid {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Vid {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl<'de> Deserialize<'de> for Vid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The server emits numeric VIDs for plain annotations and strings for
        // synthetic ones (`12-3.1`); accept both.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawVid {
            Text(String),
            Number(u64),
        }

        Ok(match RawVid::deserialize(deserializer)? {
            RawVid::Text(text) => Self(text),
            RawVid::Number(number) => Self(number.to_string()),
        })
    }
}

/// Half-open `[start, end)` character range.
///
/// Serialized as a two-element array, matching the compact wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Offsets {
    pub start: usize,
    pub end: usize,
}

impl Offsets {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.end <= self.start
    }

    /// Both bounds moved forward by `base`.
    #[must_use]
    pub const fn shifted(self, base: usize) -> Self {
        Self {
            start: self.start.saturating_add(base),
            end: self.end.saturating_add(base),
        }
    }

    #[must_use]
    pub const fn is_well_formed(self) -> bool {
        self.start <= self.end
    }

    /// Offsets from a pair of JS numbers. Fractions are truncated; `NaN`,
    /// infinities, negatives and reversed pairs yield `None`.
    #[must_use]
    pub fn from_host_pair(start: f64, end: f64) -> Option<Self> {
        if !(start.is_finite() && end.is_finite()) || start < 0.0 || end < start {
            return None;
        }
        Some(Self::new(start as usize, end as usize))
    }
}

impl From<(usize, usize)> for Offsets {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl From<Offsets> for (usize, usize) {
    fn from(offsets: Offsets) -> Self {
        (offsets.start, offsets.end)
    }
}

/// Absolute `[start, end)` range of the root document covered by one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct DocumentWindow {
    pub start: usize,
    pub end: usize,
}

impl DocumentWindow {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.end <= self.start
    }

    /// Rebase window-relative offsets onto the root document.
    #[must_use]
    pub const fn absolute(self, relative: Offsets) -> Offsets {
        relative.shifted(self.start)
    }
}

impl From<(usize, usize)> for DocumentWindow {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl From<DocumentWindow> for (usize, usize) {
    fn from(window: DocumentWindow) -> Self {
        (window.start, window.end)
    }
}

/// Comment attached to an entity. Only its type feeds rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub kind: String,
}

/// Metadata tag (focus, match, error, ...) bound to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub vid: Vid,
    pub label: Option<String>,
    pub color: Option<String>,
    /// Window-relative regions; never empty after unpacking.
    pub offsets: Vec<Offsets>,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub vid: Vid,
    pub label: Option<String>,
    pub color: Option<String>,
    /// Entity the relation starts from.
    pub source: Vid,
    pub target: Vid,
    pub comments: Vec<Comment>,
}

/// One unpacked document-window payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnnotatedText {
    pub window: DocumentWindow,
    pub spans: Vec<Span>,
    pub relations: Vec<Relation>,
    pub markers: HashMap<Vid, Vec<Marker>>,
}

impl AnnotatedText {
    /// Markers bound to `vid`, in payload order.
    #[must_use]
    pub fn markers_for(&self, vid: &Vid) -> &[Marker] {
        self.markers.get(vid).map(Vec::as_slice).unwrap_or(&[])
    }
}
