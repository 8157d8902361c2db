#![forbid(unsafe_code)]

//! Compact v2 wire payload and its unpacking into [`AnnotatedText`].
//!
//! Shape (all collections optional):
//!
//! ```json
//! {
//!   "window": [100, 400],
//!   "spans": [{ "vid": 7, "offsets": [[5, 12]], "attributes": { "l": "PER", "c": "#ff0000" } }],
//!   "relations": [{
//!     "vid": 9,
//!     "arguments": [{ "target": 7 }, { "target": 8 }],
//!     "attributes": { "l": "dep" }
//!   }],
//!   "annotationMarkers": [{ "type": "focus", "vid": [7] }],
//!   "comments": [{ "vid": 7, "type": "error", "comment": "overlaps" }]
//! }
//! ```
//!
//! Records are decoded one at a time. A record that fails to decode or
//! violates a structural rule is skipped with a `warn!` and listed in the
//! [`UnpackReport`]; the rest of the payload is still used.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::UnpackError;
use crate::model::{
    AnnotatedText, Comment, DocumentWindow, Marker, Offsets, Relation, Span, Vid,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactAnnotatedText {
    pub window: DocumentWindow,
    #[serde(default)]
    pub spans: Vec<Value>,
    #[serde(default)]
    pub relations: Vec<Value>,
    #[serde(default)]
    pub annotation_markers: Vec<Value>,
    #[serde(default)]
    pub comments: Vec<Value>,
}

impl CompactAnnotatedText {
    pub fn from_json(json: &str) -> Result<Self, UnpackError> {
        serde_json::from_str(json).map_err(|e| UnpackError::Json(e.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct CompactAttributes {
    #[serde(default, rename = "l")]
    label: Option<String>,
    #[serde(default, rename = "c")]
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompactSpan {
    vid: Vid,
    offsets: Vec<Offsets>,
    #[serde(default)]
    attributes: CompactAttributes,
}

#[derive(Debug, Deserialize)]
struct CompactArgument {
    target: Vid,
}

#[derive(Debug, Deserialize)]
struct CompactRelation {
    vid: Vid,
    arguments: Vec<CompactArgument>,
    #[serde(default)]
    attributes: CompactAttributes,
}

#[derive(Debug, Deserialize)]
struct CompactMarker {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    vid: Vec<Vid>,
}

#[derive(Debug, Deserialize)]
struct CompactComment {
    vid: Vid,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Span,
    Relation,
    Marker,
    Comment,
}

impl RecordKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Span => "span",
            Self::Relation => "relation",
            Self::Marker => "marker",
            Self::Comment => "comment",
        }
    }
}

/// A record dropped while unpacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub kind: RecordKind,
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackReport {
    pub skipped: Vec<SkippedRecord>,
    /// Comments whose target entity is not part of this payload.
    pub orphan_comments: usize,
}

impl UnpackReport {
    fn skip(&mut self, kind: RecordKind, index: usize, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(
            target: "annotext_web::compact",
            record = kind.as_str(),
            index,
            reason = reason.as_str(),
            "skipping malformed record"
        );
        self.skipped.push(SkippedRecord {
            kind,
            index,
            reason,
        });
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, String> {
    T::deserialize(value).map_err(|e| e.to_string())
}

/// Unpack a compact payload into the record model.
///
/// Entities keep payload order. A repeated VID replaces the earlier record in
/// place.
pub fn unpack(
    compact: &CompactAnnotatedText,
) -> Result<(AnnotatedText, UnpackReport), UnpackError> {
    let window = compact.window;
    if window.end < window.start {
        return Err(UnpackError::InvalidWindow {
            start: window.start,
            end: window.end,
        });
    }

    let mut report = UnpackReport::default();

    let mut spans: Vec<Span> = Vec::with_capacity(compact.spans.len());
    let mut span_index: HashMap<Vid, usize> = HashMap::new();
    for (index, raw) in compact.spans.iter().enumerate() {
        let span = match decode::<CompactSpan>(raw) {
            Ok(span) => span,
            Err(reason) => {
                report.skip(RecordKind::Span, index, reason);
                continue;
            }
        };
        if span.offsets.is_empty() {
            report.skip(RecordKind::Span, index, "span has no offsets");
            continue;
        }
        if let Some(bad) = span.offsets.iter().find(|o| !o.is_well_formed()) {
            report.skip(
                RecordKind::Span,
                index,
                format!("inverted offsets [{}, {})", bad.start, bad.end),
            );
            continue;
        }
        let span = Span {
            vid: span.vid,
            label: span.attributes.label,
            color: span.attributes.color,
            offsets: span.offsets,
            comments: Vec::new(),
        };
        match span_index.get(&span.vid) {
            Some(&slot) => spans[slot] = span,
            None => {
                span_index.insert(span.vid.clone(), spans.len());
                spans.push(span);
            }
        }
    }

    let mut relations: Vec<Relation> = Vec::with_capacity(compact.relations.len());
    let mut relation_index: HashMap<Vid, usize> = HashMap::new();
    for (index, raw) in compact.relations.iter().enumerate() {
        let relation = match decode::<CompactRelation>(raw) {
            Ok(relation) => relation,
            Err(reason) => {
                report.skip(RecordKind::Relation, index, reason);
                continue;
            }
        };
        let mut arguments = relation.arguments.into_iter();
        let (Some(source), Some(target)) = (arguments.next(), arguments.next()) else {
            report.skip(RecordKind::Relation, index, "relation needs two arguments");
            continue;
        };
        let relation = Relation {
            vid: relation.vid,
            label: relation.attributes.label,
            color: relation.attributes.color,
            source: source.target,
            target: target.target,
            comments: Vec::new(),
        };
        match relation_index.get(&relation.vid) {
            Some(&slot) => relations[slot] = relation,
            None => {
                relation_index.insert(relation.vid.clone(), relations.len());
                relations.push(relation);
            }
        }
    }

    let mut markers: HashMap<Vid, Vec<Marker>> = HashMap::new();
    for (index, raw) in compact.annotation_markers.iter().enumerate() {
        let marker = match decode::<CompactMarker>(raw) {
            Ok(marker) => marker,
            Err(reason) => {
                report.skip(RecordKind::Marker, index, reason);
                continue;
            }
        };
        for vid in marker.vid {
            markers.entry(vid).or_default().push(Marker {
                kind: marker.kind.clone(),
            });
        }
    }

    for (index, raw) in compact.comments.iter().enumerate() {
        let comment = match decode::<CompactComment>(raw) {
            Ok(comment) => comment,
            Err(reason) => {
                report.skip(RecordKind::Comment, index, reason);
                continue;
            }
        };
        let attached = Comment { kind: comment.kind };
        if let Some(&slot) = span_index.get(&comment.vid) {
            spans[slot].comments.push(attached);
        } else if let Some(&slot) = relation_index.get(&comment.vid) {
            relations[slot].comments.push(attached);
        } else {
            report.orphan_comments += 1;
            debug!(
                target: "annotext_web::compact",
                vid = comment.vid.as_str(),
                "comment targets an entity outside this window"
            );
        }
    }

    let text = AnnotatedText {
        window,
        spans,
        relations,
        markers,
    };
    Ok((text, report))
}
