#![forbid(unsafe_code)]

//! The DOM primitives this crate consumes, and an in-memory implementation.
//!
//! [`DocumentDom`] is deliberately small: tree walking, attribute and class
//! lookup, and the handful of mutations the rendering patch and `scroll_to`
//! need. The browser implementation lives in the `wasm` module;
//! [`HeadlessDom`] backs native hosts and tests.
//!
//! Methods take `&self`, like the browser DOM: nodes are handles into state
//! the document owns.

use std::cell::RefCell;
use std::collections::BTreeMap;

/// Coarse node classification used by the rendering patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text,
    /// HTML element (text-range highlight).
    Element,
    /// SVG element (relation connector).
    Graphic,
    Other,
}

pub trait DocumentDom {
    type Node: Clone + PartialEq;

    fn kind(&self, node: &Self::Node) -> NodeKind;

    /// Child nodes in document order.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Length of a text node in UTF-16 code units; `0` for anything else.
    fn text_len(&self, node: &Self::Node) -> usize;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn has_class(&self, node: &Self::Node, class: &str) -> bool;

    /// Descendants of `root` (excluding `root`) whose attribute `name` equals `value`.
    fn find_by_attribute(&self, root: &Self::Node, name: &str, value: &str) -> Vec<Self::Node>;

    /// Descendants of `node` (excluding `node`) carrying `class`.
    fn find_by_class(&self, node: &Self::Node, class: &str) -> Vec<Self::Node>;

    fn set_style(&self, node: &Self::Node, property: &str, value: &str);

    fn add_class(&self, node: &Self::Node, class: &str);

    /// Scroll `node` into the middle of its scroll container.
    fn scroll_into_view(&self, node: &Self::Node);

    /// Nearest inclusive ancestor of `node` carrying `class`.
    fn closest_with_class(&self, node: &Self::Node, class: &str) -> Option<Self::Node> {
        let mut current = Some(node.clone());
        while let Some(candidate) = current {
            if self.kind(&candidate) != NodeKind::Text && self.has_class(&candidate, class) {
                return Some(candidate);
            }
            current = self.parent(&candidate);
        }
        None
    }
}

/// CSS selector matching elements whose attribute `name` equals `value`.
///
/// `value` is emitted as a quoted CSS string, so ids such as `#12-3.1` or ones
/// containing quotes select literally.
#[must_use]
pub fn attribute_selector(name: &str, value: &str) -> String {
    let mut out = String::with_capacity(name.len() + value.len() + 6);
    out.push('[');
    out.push_str(name);
    out.push_str("=\"");
    for ch in value.chars() {
        match ch {
            '"' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            // Newlines cannot appear raw inside a CSS string.
            '\n' => out.push_str("\\a "),
            _ => out.push(ch),
        }
    }
    out.push_str("\"]");
    out
}

/// Handle into a [`HeadlessDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<usize>,
    children: Vec<usize>,
    text: String,
    attributes: BTreeMap<String, String>,
    classes: Vec<String>,
    style: BTreeMap<String, String>,
}

impl NodeData {
    fn new(kind: NodeKind, parent: Option<usize>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            text: String::new(),
            attributes: BTreeMap::new(),
            classes: Vec::new(),
            style: BTreeMap::new(),
        }
    }
}

/// In-memory document tree.
///
/// Node `0` is the root element, created by [`HeadlessDom::new`].
#[derive(Debug)]
pub struct HeadlessDom {
    nodes: RefCell<Vec<NodeData>>,
    scrolled: RefCell<Vec<NodeRef>>,
}

impl Default for HeadlessDom {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDom {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(vec![NodeData::new(NodeKind::Element, None)]),
            scrolled: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn root(&self) -> NodeRef {
        NodeRef(0)
    }

    fn append(&self, parent: NodeRef, mut data: NodeData) -> NodeRef {
        let mut nodes = self.nodes.borrow_mut();
        let id = nodes.len();
        data.parent = Some(parent.0);
        nodes.push(data);
        if let Some(parent) = nodes.get_mut(parent.0) {
            parent.children.push(id);
        }
        NodeRef(id)
    }

    /// Append an HTML element with the given classes.
    pub fn append_element(&self, parent: NodeRef, classes: &[&str]) -> NodeRef {
        let mut data = NodeData::new(NodeKind::Element, None);
        data.classes = classes.iter().map(|c| (*c).to_owned()).collect();
        self.append(parent, data)
    }

    /// Append an SVG element with the given classes.
    pub fn append_graphic(&self, parent: NodeRef, classes: &[&str]) -> NodeRef {
        let mut data = NodeData::new(NodeKind::Graphic, None);
        data.classes = classes.iter().map(|c| (*c).to_owned()).collect();
        self.append(parent, data)
    }

    pub fn append_text(&self, parent: NodeRef, text: &str) -> NodeRef {
        let mut data = NodeData::new(NodeKind::Text, None);
        data.text = text.to_owned();
        self.append(parent, data)
    }

    pub fn set_attribute(&self, node: NodeRef, name: &str, value: &str) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(node.0) {
            data.attributes.insert(name.to_owned(), value.to_owned());
        }
    }

    #[must_use]
    pub fn style(&self, node: NodeRef, property: &str) -> Option<String> {
        self.nodes
            .borrow()
            .get(node.0)
            .and_then(|data| data.style.get(property).cloned())
    }

    #[must_use]
    pub fn classes(&self, node: NodeRef) -> Vec<String> {
        self.nodes
            .borrow()
            .get(node.0)
            .map(|data| data.classes.clone())
            .unwrap_or_default()
    }

    /// Concatenated text under `node`, in document order.
    #[must_use]
    pub fn text_content(&self, node: NodeRef) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        let mut stack = vec![node.0];
        while let Some(id) = stack.pop() {
            let Some(data) = nodes.get(id) else {
                continue;
            };
            out.push_str(&data.text);
            stack.extend(data.children.iter().rev());
        }
        out
    }

    /// Nodes passed to [`DocumentDom::scroll_into_view`], oldest first.
    #[must_use]
    pub fn scrolled_into_view(&self) -> Vec<NodeRef> {
        self.scrolled.borrow().clone()
    }

    fn descendants_matching(
        &self,
        root: NodeRef,
        mut matches: impl FnMut(&NodeData) -> bool,
    ) -> Vec<NodeRef> {
        let nodes = self.nodes.borrow();
        let mut out = Vec::new();
        let Some(start) = nodes.get(root.0) else {
            return out;
        };
        let mut stack: Vec<usize> = start.children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(data) = nodes.get(id) else {
                continue;
            };
            if matches(data) {
                out.push(NodeRef(id));
            }
            stack.extend(data.children.iter().rev());
        }
        out
    }
}

impl DocumentDom for HeadlessDom {
    type Node = NodeRef;

    fn kind(&self, node: &NodeRef) -> NodeKind {
        self.nodes
            .borrow()
            .get(node.0)
            .map_or(NodeKind::Other, |data| data.kind)
    }

    fn children(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.nodes
            .borrow()
            .get(node.0)
            .map(|data| data.children.iter().copied().map(NodeRef).collect())
            .unwrap_or_default()
    }

    fn parent(&self, node: &NodeRef) -> Option<NodeRef> {
        self.nodes.borrow().get(node.0)?.parent.map(NodeRef)
    }

    fn text_len(&self, node: &NodeRef) -> usize {
        self.nodes
            .borrow()
            .get(node.0)
            .filter(|data| data.kind == NodeKind::Text)
            .map_or(0, |data| data.text.encode_utf16().count())
    }

    fn attribute(&self, node: &NodeRef, name: &str) -> Option<String> {
        self.nodes.borrow().get(node.0)?.attributes.get(name).cloned()
    }

    fn has_class(&self, node: &NodeRef, class: &str) -> bool {
        self.nodes
            .borrow()
            .get(node.0)
            .is_some_and(|data| data.classes.iter().any(|c| c == class))
    }

    fn find_by_attribute(&self, root: &NodeRef, name: &str, value: &str) -> Vec<NodeRef> {
        self.descendants_matching(*root, |data| {
            data.attributes.get(name).is_some_and(|v| v == value)
        })
    }

    fn find_by_class(&self, node: &NodeRef, class: &str) -> Vec<NodeRef> {
        self.descendants_matching(*node, |data| data.classes.iter().any(|c| c == class))
    }

    fn set_style(&self, node: &NodeRef, property: &str, value: &str) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(node.0) {
            data.style.insert(property.to_owned(), value.to_owned());
        }
    }

    fn add_class(&self, node: &NodeRef, class: &str) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(node.0)
            && !data.classes.iter().any(|c| c == class)
        {
            data.classes.push(class.to_owned());
        }
    }

    fn scroll_into_view(&self, node: &NodeRef) {
        self.scrolled.borrow_mut().push(*node);
    }
}
