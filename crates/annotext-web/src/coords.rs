#![forbid(unsafe_code)]

//! Coordinate resolver: pane-local ↔ root-absolute character offsets.
//!
//! Offsets are counted over the text nodes under the root in document order.
//! Nothing is cached; DOM content under the root may change between calls.

use crate::dom::{DocumentDom, NodeKind};
use crate::model::Offsets;

/// Absolute offset of the first character inside `pane`, or `None` when
/// `pane` is not `root` or one of its descendants.
pub fn start_offset<D: DocumentDom>(dom: &D, root: &D::Node, pane: &D::Node) -> Option<usize> {
    let mut consumed = 0usize;
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if node == *pane {
            return Some(consumed);
        }
        if dom.kind(&node) == NodeKind::Text {
            consumed = consumed.saturating_add(dom.text_len(&node));
            continue;
        }
        let mut children = dom.children(&node);
        children.reverse();
        stack.extend(children);
    }
    None
}

/// Convert a pane-local range into root-absolute offsets.
pub fn to_absolute<D: DocumentDom>(
    dom: &D,
    root: &D::Node,
    pane: &D::Node,
    local: Offsets,
) -> Option<Offsets> {
    start_offset(dom, root, pane).map(|base| local.shifted(base))
}

/// Location of an absolute offset inside a text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPosition<N> {
    pub node: N,
    /// Offset inside `node`, in UTF-16 code units.
    pub offset: usize,
}

/// Resolve an absolute offset to the text node containing it.
///
/// An offset on a boundary resolves to the start of the following node; the
/// end of the document resolves to the end of the last text node.
pub fn offset_to_position<D: DocumentDom>(
    dom: &D,
    root: &D::Node,
    offset: usize,
) -> Option<TextPosition<D::Node>> {
    let mut consumed = 0usize;
    let mut last: Option<(D::Node, usize)> = None;
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if dom.kind(&node) == NodeKind::Text {
            let len = dom.text_len(&node);
            if offset < consumed.saturating_add(len) {
                return Some(TextPosition {
                    node,
                    offset: offset - consumed,
                });
            }
            consumed = consumed.saturating_add(len);
            last = Some((node, len));
            continue;
        }
        let mut children = dom.children(&node);
        children.reverse();
        stack.extend(children);
    }
    match last {
        Some((node, len)) if offset == consumed => Some(TextPosition { node, offset: len }),
        _ => None,
    }
}
