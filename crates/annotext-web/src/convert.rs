#![forbid(unsafe_code)]

//! Format converter: unpacked records → the widget's annotation shape.
//!
//! The widget speaks a W3C Web Annotation dialect: string ids carrying a `#`
//! prefix, a textual body, and either a text-position selector (spans) or a
//! pair of entity references (relations). Per-annotation color and style
//! classes ride along in the body for the rendering patch; the widget itself
//! ignores them.

use serde::Serialize;
use tracing::debug;

use crate::config::EditorConfig;
use crate::model::{AnnotatedText, Comment, Marker, Offsets, Relation, Span, Vid};

/// Reserved first character of every widget annotation id.
pub const ID_PREFIX: char = '#';

#[must_use]
pub fn prefixed_id(vid: &Vid) -> String {
    let mut id = String::with_capacity(vid.as_str().len() + 1);
    id.push(ID_PREFIX);
    id.push_str(vid.as_str());
    id
}

/// Inverse of [`prefixed_id`]. `None` when the prefix is missing or nothing
/// follows it.
#[must_use]
pub fn strip_id_prefix(id: &str) -> Option<Vid> {
    let raw = id.strip_prefix(ID_PREFIX)?;
    (!raw.is_empty()).then(|| Vid::new(raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Motivation {
    Linking,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationBody {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub purpose: &'static str,
    /// Display label.
    pub value: String,
    pub color: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionSelector {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnnotationTarget {
    Position { selector: PositionSelector },
    Entities([EntityRef; 2]),
}

/// Widget-native annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebAnnotation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motivation: Option<Motivation>,
    pub body: AnnotationBody,
    pub target: AnnotationTarget,
}

impl WebAnnotation {
    #[must_use]
    pub fn is_relation(&self) -> bool {
        self.motivation == Some(Motivation::Linking)
    }

    /// Absolute `[start, end)` of a span annotation.
    #[must_use]
    pub fn position(&self) -> Option<Offsets> {
        match &self.target {
            AnnotationTarget::Position { selector } => {
                Some(Offsets::new(selector.start, selector.end))
            }
            AnnotationTarget::Entities(_) => None,
        }
    }
}

/// Counters from one conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub spans: usize,
    pub relations: usize,
    /// Extra regions of multi-region spans that were not rendered.
    pub dropped_regions: usize,
}

/// Style classes: the highlight class, then one per marker, then one per
/// comment, each group in input order.
#[must_use]
pub fn style_classes(
    config: &EditorConfig,
    markers: &[Marker],
    comments: &[Comment],
) -> Vec<String> {
    let mut classes = Vec::with_capacity(1 + markers.len() + comments.len());
    classes.push(config.highlighted_class());
    classes.extend(markers.iter().map(|m| config.marker_class(&m.kind)));
    classes.extend(comments.iter().map(|c| config.marker_class(&c.kind)));
    classes
}

fn body(
    config: &EditorConfig,
    label: Option<&str>,
    color: Option<&str>,
    classes: Vec<String>,
) -> AnnotationBody {
    AnnotationBody {
        kind: "TextualBody",
        purpose: "tagging",
        value: label.unwrap_or_default().to_owned(),
        color: color.map_or_else(|| config.default_color.clone(), str::to_owned),
        classes,
    }
}

fn convert_span(doc: &AnnotatedText, span: &Span, config: &EditorConfig) -> Option<WebAnnotation> {
    // Multi-region spans render as their first region only.
    let first = span.offsets.first()?;
    let absolute = doc.window.absolute(*first);
    let classes = style_classes(config, doc.markers_for(&span.vid), &span.comments);
    Some(WebAnnotation {
        id: prefixed_id(&span.vid),
        kind: "Annotation",
        motivation: None,
        body: body(config, span.label.as_deref(), span.color.as_deref(), classes),
        target: AnnotationTarget::Position {
            selector: PositionSelector {
                kind: "TextPositionSelector",
                start: absolute.start,
                end: absolute.end,
            },
        },
    })
}

fn convert_relation(
    doc: &AnnotatedText,
    relation: &Relation,
    config: &EditorConfig,
) -> WebAnnotation {
    let classes = style_classes(config, doc.markers_for(&relation.vid), &relation.comments);
    WebAnnotation {
        id: prefixed_id(&relation.vid),
        kind: "Annotation",
        motivation: Some(Motivation::Linking),
        body: body(config, relation.label.as_deref(), relation.color.as_deref(), classes),
        target: AnnotationTarget::Entities([
            EntityRef {
                id: prefixed_id(&relation.source),
            },
            EntityRef {
                id: prefixed_id(&relation.target),
            },
        ]),
    }
}

/// Convert every span (first) and relation (second) of `doc`.
#[must_use]
pub fn convert(
    doc: &AnnotatedText,
    config: &EditorConfig,
) -> (Vec<WebAnnotation>, ConversionReport) {
    let mut report = ConversionReport::default();
    let mut out = Vec::with_capacity(doc.spans.len() + doc.relations.len());

    for span in &doc.spans {
        if let Some(annotation) = convert_span(doc, span, config) {
            report.spans += 1;
            report.dropped_regions += span.offsets.len().saturating_sub(1);
            out.push(annotation);
        }
    }
    for relation in &doc.relations {
        report.relations += 1;
        out.push(convert_relation(doc, relation, config));
    }

    if report.dropped_regions > 0 {
        debug!(
            target: "annotext_web::convert",
            dropped_regions = report.dropped_regions,
            "multi-region spans rendered by their first region"
        );
    }
    (out, report)
}
