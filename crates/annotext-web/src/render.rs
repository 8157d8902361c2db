#![forbid(unsafe_code)]

//! Render pass and the post-render hook list.
//!
//! The widget renders with a fixed theme. Per-annotation color and style
//! classes are applied afterwards by [`StylePatch`], a [`PostRenderHook`]
//! registered by the editor. Hooks run synchronously, in registration order,
//! once the widget's apply call has resolved.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::backend::{AnnotationWidget, ConnectorCanvas, EditorBackend};
use crate::color::Rgb;
use crate::config::EditorConfig;
use crate::convert::WebAnnotation;
use crate::dom::{DocumentDom, NodeKind};
use crate::error::WidgetError;

/// Attribute carrying a rendered annotation's prefixed id.
pub const ID_ATTRIBUTE: &str = "data-id";

/// What a hook sees after a render.
pub struct RenderContext<'a, D: DocumentDom> {
    pub dom: &'a D,
    pub root: &'a D::Node,
    pub connectors: &'a dyn ConnectorCanvas,
    pub config: &'a EditorConfig,
}

/// Observer called after every successful widget render.
pub trait PostRenderHook<D: DocumentDom> {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    fn after_render(&self, cx: &RenderContext<'_, D>, annotations: &[WebAnnotation]);
}

/// Shared, ordered hook list.
pub type HookList<D> = Rc<RefCell<Vec<Box<dyn PostRenderHook<D>>>>>;

/// Clears hover and floating-connection state left over from the DOM the
/// render just replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct DragStateReset;

impl<D: DocumentDom> PostRenderHook<D> for DragStateReset {
    fn name(&self) -> &'static str {
        "drag_state_reset"
    }

    fn after_render(&self, cx: &RenderContext<'_, D>, _annotations: &[WebAnnotation]) {
        cx.connectors.reset_drag_state();
    }
}

/// Applies per-annotation colors and style classes to rendered nodes.
///
/// Text-range elements get a translucent background and an opaque bottom
/// border; connector graphics get their inner path stroked. Both get the
/// annotation's style classes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StylePatch;

impl StylePatch {
    /// Patch every node tagged with `annotation`'s id. Returns the number of
    /// nodes touched.
    pub fn apply<D: DocumentDom>(
        &self,
        cx: &RenderContext<'_, D>,
        annotation: &WebAnnotation,
    ) -> usize {
        let color =
            Rgb::parse_hex(&annotation.body.color).unwrap_or_else(|| cx.config.default_rgb());
        let opaque = color.to_hex();
        let mut touched = 0;

        for node in cx.dom.find_by_attribute(cx.root, ID_ATTRIBUTE, &annotation.id) {
            match cx.dom.kind(&node) {
                NodeKind::Element => {
                    cx.dom.set_style(
                        &node,
                        "background-color",
                        &color.to_css_rgba(cx.config.highlight_opacity),
                    );
                    cx.dom.set_style(&node, "border-bottom-color", &opaque);
                }
                NodeKind::Graphic => {
                    for path in cx.dom.find_by_class(&node, &cx.config.connector_path_class) {
                        cx.dom.set_style(&path, "stroke", &opaque);
                    }
                }
                NodeKind::Text | NodeKind::Other => continue,
            }
            for class in &annotation.body.classes {
                cx.dom.add_class(&node, class);
            }
            touched += 1;
        }
        touched
    }
}

impl<D: DocumentDom> PostRenderHook<D> for StylePatch {
    fn name(&self) -> &'static str {
        "style_patch"
    }

    fn after_render(&self, cx: &RenderContext<'_, D>, annotations: &[WebAnnotation]) {
        let touched: usize = annotations.iter().map(|a| self.apply(cx, a)).sum();
        debug!(
            target: "annotext_web::render",
            annotations = annotations.len(),
            nodes = touched,
            "style patch applied"
        );
    }
}

/// Run `hooks` in order. A hook list that is being mutated from inside a hook
/// is skipped for this render.
pub fn run_hooks<D: DocumentDom>(
    hooks: &HookList<D>,
    cx: &RenderContext<'_, D>,
    annotations: &[WebAnnotation],
) {
    let Ok(hooks) = hooks.try_borrow() else {
        warn!(target: "annotext_web::render", "post-render hooks busy; skipped");
        return;
    };
    for hook in hooks.iter() {
        debug!(target: "annotext_web::render", hook = hook.name(), "post-render hook");
        hook.after_render(cx, annotations);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered { count: usize },
    /// The widget has not finished constructing; nothing was applied.
    WidgetNotReady,
    Failed(WidgetError),
    /// The editor was destroyed before the render started.
    Destroyed,
    /// A newer reload cycle owns the next render.
    Superseded,
}

impl RenderOutcome {
    #[must_use]
    pub const fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

/// A render detached from the editor: owned handles plus the flattened list.
pub struct RenderJob<B: EditorBackend> {
    pub dom: Rc<B::Dom>,
    pub root: <B::Dom as DocumentDom>::Node,
    pub widget: Rc<B::Widget>,
    pub connectors: Rc<B::Connectors>,
    pub hooks: HookList<B::Dom>,
    pub config: Rc<EditorConfig>,
    pub annotations: Vec<WebAnnotation>,
}

impl<B: EditorBackend> RenderJob<B> {
    /// Remove live connections, reset drag state, apply the list, then run
    /// the post-render hooks.
    pub async fn run(self) -> RenderOutcome {
        if !self.widget.is_ready() {
            error!(
                target: "annotext_web::render",
                annotations = self.annotations.len(),
                "annotation widget is not initialised; render skipped"
            );
            return RenderOutcome::WidgetNotReady;
        }

        self.connectors.remove_all_connections();
        self.connectors.reset_drag_state();

        let count = self.annotations.len();
        info!(target: "annotext_web::render", count, "rendering annotations");
        if let Err(err) = self.widget.set_annotations(&self.annotations).await {
            warn!(target: "annotext_web::render", error = %err, "widget rejected annotations");
            return RenderOutcome::Failed(err);
        }

        let cx = RenderContext {
            dom: &*self.dom,
            root: &self.root,
            connectors: &*self.connectors,
            config: &self.config,
        };
        run_hooks(&self.hooks, &cx, &self.annotations);
        RenderOutcome::Rendered { count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::convert::convert;
    use crate::dom::{HeadlessDom, NodeRef};
    use crate::model::{AnnotatedText, DocumentWindow, Offsets, Relation, Span, Vid};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[derive(Default)]
    struct QuietCanvas {
        resets: Cell<usize>,
    }

    impl ConnectorCanvas for QuietCanvas {
        fn remove_all_connections(&self) {}
        fn leave_annotation(&self) {
            self.resets.set(self.resets.get() + 1);
        }
        fn has_floating_edge(&self) -> bool {
            false
        }
        fn cancel_connection(&self) {}
        fn destroy(&self) {}
    }

    fn annotations() -> Vec<WebAnnotation> {
        let doc = AnnotatedText {
            window: DocumentWindow::new(0, 50),
            spans: vec![Span {
                vid: Vid::new("7"),
                label: Some("PER".into()),
                color: Some("#ff0000".into()),
                offsets: vec![Offsets::new(0, 4)],
                comments: Vec::new(),
            }],
            relations: vec![Relation {
                vid: Vid::new("9"),
                label: None,
                color: Some("#00ff00".into()),
                source: Vid::new("7"),
                target: Vid::new("7"),
                comments: Vec::new(),
            }],
            ..AnnotatedText::default()
        };
        convert(&doc, &EditorConfig::default()).0
    }

    fn rendered_dom() -> (HeadlessDom, NodeRef, NodeRef, NodeRef) {
        let dom = HeadlessDom::new();
        let root = dom.root();
        let span = dom.append_element(root, &["r6o-annotation"]);
        dom.set_attribute(span, ID_ATTRIBUTE, "#7");
        dom.append_text(span, "John");
        let edge = dom.append_graphic(root, &["r6o-connections-edge"]);
        dom.set_attribute(edge, ID_ATTRIBUTE, "#9");
        let path = dom.append_graphic(edge, &["r6o-connections-edge-path-inner"]);
        (dom, span, edge, path)
    }

    #[test]
    fn style_patch_colors_text_ranges_and_connectors() {
        let (dom, span, edge, path) = rendered_dom();
        let canvas = QuietCanvas::default();
        let config = EditorConfig::default();
        let root = dom.root();
        let cx = RenderContext {
            dom: &dom,
            root: &root,
            connectors: &canvas,
            config: &config,
        };
        StylePatch.after_render(&cx, &annotations());

        assert_eq!(dom.style(span, "background-color").as_deref(), Some("rgba(255, 0, 0, 0.2)"));
        assert_eq!(dom.style(span, "border-bottom-color").as_deref(), Some("#ff0000"));
        assert_eq!(
            dom.classes(span),
            vec!["r6o-annotation".to_owned(), "i7n-highlighted".to_owned()]
        );
        assert_eq!(dom.style(path, "stroke").as_deref(), Some("#00ff00"));
        assert_eq!(dom.style(edge, "background-color"), None);
        assert!(dom.classes(edge).contains(&"i7n-highlighted".to_owned()));
    }

    #[test]
    fn unparsable_color_falls_back_to_default() {
        let (dom, span, _, _) = rendered_dom();
        let canvas = QuietCanvas::default();
        let config = EditorConfig::default();
        let root = dom.root();
        let cx = RenderContext {
            dom: &dom,
            root: &root,
            connectors: &canvas,
            config: &config,
        };
        let mut annotation = annotations().remove(0);
        annotation.body.color = "tomato".into();
        assert_eq!(StylePatch.apply(&cx, &annotation), 1);
        assert_eq!(dom.style(span, "border-bottom-color").as_deref(), Some("#000000"));
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let (dom, span, _, _) = rendered_dom();
        let canvas = QuietCanvas::default();
        let config = EditorConfig::default();
        let root = dom.root();
        let cx = RenderContext {
            dom: &dom,
            root: &root,
            connectors: &canvas,
            config: &config,
        };
        let list: Vec<Box<dyn PostRenderHook<HeadlessDom>>> =
            vec![Box::new(DragStateReset), Box::new(StylePatch)];
        let hooks: HookList<HeadlessDom> = Rc::new(RefCell::new(list));
        run_hooks(&hooks, &cx, &annotations());
        assert_eq!(canvas.resets.get(), 1);
        assert!(dom.style(span, "background-color").is_some());
    }
}
