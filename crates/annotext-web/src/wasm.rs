#![forbid(unsafe_code)]

//! `wasm-bindgen` exports and JS collaborator bindings.
//!
//! The host passes in its transport client, rendering widget, connector plugin
//! and a viewport-tracker factory. Everything crosses the boundary as JSON
//! (`JSON.stringify` / `JSON.parse`) so the serde types in this crate stay the
//! single source of truth for shapes. Only compiled on `wasm32` targets.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use js_sys::{Array, Function, JSON, Promise, Reflect};
use serde::Serialize;
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{
    AddEventListenerOptions, CharacterData, Element, Event, HtmlElement, MouseEvent, Node,
    ScrollBehavior, ScrollIntoViewOptions, ScrollLogicalPosition, SvgElement,
};

use crate::backend::{
    AnnotationTransport, AnnotationWidget, ConnectorCanvas, EditorBackend, Timer, ViewportTracker,
};
use crate::compact::CompactAnnotatedText;
use crate::config::EditorConfig;
use crate::convert::WebAnnotation;
use crate::dom::{DocumentDom, NodeKind, attribute_selector};
use crate::editor::{AnnotationEditor, EditorParts};
use crate::error::{TransportError, WidgetError};
use crate::events::{MouseButton, PointerDisposition, PointerPhase, WidgetEvent};
use crate::loader::LoadOptions;
use crate::model::{Offsets, Vid};
use crate::pane::PaneId;

#[wasm_bindgen]
extern "C" {
    pub type JsTransport;

    #[wasm_bindgen(method, catch, js_name = loadAnnotations)]
    fn load_annotations(this: &JsTransport, options: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, js_name = createSpanAnnotation)]
    fn create_span_annotation(this: &JsTransport, regions: &JsValue);

    #[wasm_bindgen(method, js_name = createRelationAnnotation)]
    fn create_relation_annotation(this: &JsTransport, source: &str, target: &str);

    #[wasm_bindgen(method, js_name = selectAnnotation)]
    fn select_annotation(this: &JsTransport, id: &str);

    #[wasm_bindgen(method, js_name = openContextMenu)]
    fn open_context_menu(this: &JsTransport, id: &str, event: &MouseEvent);
}

#[wasm_bindgen]
extern "C" {
    pub type JsWidget;

    #[wasm_bindgen(method, catch, js_name = setAnnotations)]
    fn set_annotations(this: &JsWidget, annotations: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method)]
    fn on(this: &JsWidget, event: &str, handler: &Function);

    #[wasm_bindgen(method)]
    fn destroy(this: &JsWidget);
}

#[wasm_bindgen]
extern "C" {
    pub type JsConnections;

    #[wasm_bindgen(method, getter)]
    fn canvas(this: &JsConnections) -> JsCanvas;

    #[wasm_bindgen(method)]
    fn destroy(this: &JsConnections);

    pub type JsCanvas;

    #[wasm_bindgen(method, getter)]
    fn connections(this: &JsCanvas) -> JsValue;

    #[wasm_bindgen(method, setter)]
    fn set_connections(this: &JsCanvas, connections: &Array);

    #[wasm_bindgen(method, getter, js_name = currentFloatingEdge)]
    fn current_floating_edge(this: &JsCanvas) -> JsValue;

    #[wasm_bindgen(method, js_name = onLeaveAnnotation)]
    fn on_leave_annotation(this: &JsCanvas);

    #[wasm_bindgen(method, js_name = onCancelConnection)]
    fn on_cancel_connection(this: &JsCanvas);

    #[wasm_bindgen(method)]
    fn on(this: &JsCanvas, event: &str, handler: &Function);
}

#[wasm_bindgen]
extern "C" {
    pub type JsTracker;

    #[wasm_bindgen(method, getter, js_name = currentRange)]
    fn current_range(this: &JsTracker) -> JsValue;
}

fn console_error(msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(error) = Reflect::get(&console, &"error".into()) else {
        return;
    };
    let Ok(error_fn) = error.dyn_into::<Function>() else {
        return;
    };
    let _ = error_fn.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = if let Some(loc) = info.location() {
                format!("panic at {}:{}:{}: {info}", loc.file(), loc.line(), loc.column())
            } else {
                format!("panic: {info}")
            };
            console_error(&msg);
        }));
    });
}

fn install_tracing() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(tracing_wasm::set_as_global_default);
}

/// Best-effort message for a thrown JS value.
fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    JSON::stringify(value)
        .ok()
        .and_then(|s| s.as_string())
        .unwrap_or_else(|| "unknown JS error".to_owned())
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    let json = serde_json::to_string(value).map_err(|e| e.to_string())?;
    JSON::parse(&json).map_err(|e| describe(&e))
}

fn to_json(value: &JsValue) -> Option<String> {
    JSON::stringify(value).ok()?.as_string()
}

fn is_absent(value: &JsValue) -> bool {
    value.is_null() || value.is_undefined()
}

/// Await a value that may or may not be a thenable.
async fn settle(value: JsValue) -> Result<JsValue, JsValue> {
    JsFuture::from(Promise::resolve(&value)).await
}

fn node_list(list: &web_sys::NodeList) -> Vec<Node> {
    (0..list.length()).filter_map(|i| list.item(i)).collect()
}

/// [`DocumentDom`] over the browser DOM.
#[derive(Debug, Default)]
pub struct WebDom;

impl WebDom {
    fn query_all(root: &Node, selector: &str) -> Vec<Node> {
        let Some(element) = root.dyn_ref::<Element>() else {
            return Vec::new();
        };
        match element.query_selector_all(selector) {
            Ok(list) => node_list(&list),
            Err(err) => {
                warn!(
                    target: "annotext_web::render",
                    selector,
                    error = %describe(&err),
                    "invalid selector"
                );
                Vec::new()
            }
        }
    }
}

impl DocumentDom for WebDom {
    type Node = Node;

    fn kind(&self, node: &Node) -> NodeKind {
        match node.node_type() {
            Node::TEXT_NODE => NodeKind::Text,
            Node::ELEMENT_NODE if node.dyn_ref::<SvgElement>().is_some() => NodeKind::Graphic,
            Node::ELEMENT_NODE if node.dyn_ref::<HtmlElement>().is_some() => NodeKind::Element,
            _ => NodeKind::Other,
        }
    }

    fn children(&self, node: &Node) -> Vec<Node> {
        node_list(&node.child_nodes())
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_node()
    }

    fn text_len(&self, node: &Node) -> usize {
        if node.node_type() != Node::TEXT_NODE {
            return 0;
        }
        node.dyn_ref::<CharacterData>()
            .map_or(0, |text| text.length() as usize)
    }

    fn attribute(&self, node: &Node, name: &str) -> Option<String> {
        node.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn has_class(&self, node: &Node, class: &str) -> bool {
        node.dyn_ref::<Element>()
            .is_some_and(|element| element.class_list().contains(class))
    }

    fn find_by_attribute(&self, root: &Node, name: &str, value: &str) -> Vec<Node> {
        Self::query_all(root, &attribute_selector(name, value))
    }

    fn find_by_class(&self, node: &Node, class: &str) -> Vec<Node> {
        Self::query_all(node, &format!(".{class}"))
    }

    fn set_style(&self, node: &Node, property: &str, value: &str) {
        let style = if let Some(element) = node.dyn_ref::<HtmlElement>() {
            element.style()
        } else if let Some(element) = node.dyn_ref::<SvgElement>() {
            element.style()
        } else {
            return;
        };
        let _ = style.set_property(property, value);
    }

    fn add_class(&self, node: &Node, class: &str) {
        if let Some(element) = node.dyn_ref::<Element>() {
            let _ = element.class_list().add_1(class);
        }
    }

    fn scroll_into_view(&self, node: &Node) {
        let Some(element) = node.dyn_ref::<Element>() else {
            return;
        };
        let options = ScrollIntoViewOptions::new();
        options.set_behavior(ScrollBehavior::Auto);
        options.set_block(ScrollLogicalPosition::Center);
        options.set_inline(ScrollLogicalPosition::Nearest);
        element.scroll_into_view_with_scroll_into_view_options(&options);
    }
}

pub struct WebTransport(JsTransport);

impl AnnotationTransport for WebTransport {
    type MenuEvent = MouseEvent;

    async fn load_annotations(
        &self,
        options: &LoadOptions,
    ) -> Result<CompactAnnotatedText, TransportError> {
        let options = to_js(options).map_err(TransportError::Rejected)?;
        let pending = self
            .0
            .load_annotations(&options)
            .map_err(|e| TransportError::Rejected(describe(&e)))?;
        let value = settle(pending)
            .await
            .map_err(|e| TransportError::Rejected(describe(&e)))?;
        let json = to_json(&value)
            .ok_or_else(|| TransportError::Malformed("payload is not JSON".to_owned()))?;
        CompactAnnotatedText::from_json(&json).map_err(TransportError::from)
    }

    fn create_span_annotation(&self, regions: &[Offsets]) {
        match to_js(regions) {
            Ok(regions) => self.0.create_span_annotation(&regions),
            Err(err) => {
                warn!(
                    target: "annotext_web::events",
                    error = %err,
                    "span regions not serializable"
                );
            }
        }
    }

    fn create_relation_annotation(&self, source: &Vid, target: &Vid) {
        self.0.create_relation_annotation(source.as_str(), target.as_str());
    }

    fn select_annotation(&self, id: &Vid) {
        self.0.select_annotation(id.as_str());
    }

    fn open_context_menu(&self, id: &Vid, event: &MouseEvent) {
        self.0.open_context_menu(id.as_str(), event);
    }
}

/// The widget handle. Hosts that build the widget after the editor hand it
/// over later through [`WebWidget::replace`]; readiness is read on every call.
pub struct WebWidget(RefCell<JsValue>);

impl WebWidget {
    pub fn new(widget: JsValue) -> Self {
        Self(RefCell::new(widget))
    }

    /// Swap in a new widget handle, returning the previous one.
    pub fn replace(&self, widget: JsValue) -> JsValue {
        self.0.replace(widget)
    }

    fn handle(&self) -> Option<JsWidget> {
        let value = self.0.borrow();
        (!is_absent(&value)).then(|| value.clone().unchecked_into())
    }
}

impl AnnotationWidget for WebWidget {
    fn is_ready(&self) -> bool {
        !is_absent(&self.0.borrow())
    }

    async fn set_annotations(&self, annotations: &[WebAnnotation]) -> Result<(), WidgetError> {
        let Some(widget) = self.handle() else {
            return Err(WidgetError::Apply("widget is not initialised".to_owned()));
        };
        let list = to_js(annotations).map_err(WidgetError::Apply)?;
        let pending = widget
            .set_annotations(&list)
            .map_err(|e| WidgetError::Apply(describe(&e)))?;
        settle(pending)
            .await
            .map(|_| ())
            .map_err(|e| WidgetError::Apply(describe(&e)))
    }

    fn destroy(&self) {
        if let Some(widget) = self.handle() {
            widget.destroy();
        }
    }
}

pub struct WebConnections(JsConnections);

impl ConnectorCanvas for WebConnections {
    fn remove_all_connections(&self) {
        let canvas = self.0.canvas();
        if let Some(live) = canvas.connections().dyn_ref::<Array>() {
            for connection in live.iter() {
                if let Ok(remove) = Reflect::get(&connection, &"remove".into())
                    && let Some(remove) = remove.dyn_ref::<Function>()
                {
                    let _ = remove.call0(&connection);
                }
            }
        }
        canvas.set_connections(&Array::new());
    }

    fn leave_annotation(&self) {
        self.0.canvas().on_leave_annotation();
    }

    fn has_floating_edge(&self) -> bool {
        let edge = self.0.canvas().current_floating_edge();
        !is_absent(&edge) && edge.is_truthy()
    }

    fn cancel_connection(&self) {
        self.0.canvas().on_cancel_connection();
    }

    fn destroy(&self) {
        self.0.destroy();
    }
}

pub struct WebTracker(JsTracker);

impl ViewportTracker for WebTracker {
    fn current_range(&self) -> Option<Offsets> {
        let range = self.0.current_range();
        let pair = range.dyn_ref::<Array>()?;
        Offsets::from_host_pair(pair.get(0).as_f64()?, pair.get(1).as_f64()?)
    }
}

pub struct WebTimer;

impl Timer for WebTimer {
    async fn sleep(&self, duration: Duration) {
        let ms = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        let promise = Promise::new(&mut |resolve, _reject| {
            if let Some(window) = web_sys::window() {
                let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}

pub struct WebBackend;

impl EditorBackend for WebBackend {
    type Dom = WebDom;
    type Transport = WebTransport;
    type Widget = WebWidget;
    type Connectors = WebConnections;
    type Tracker = WebTracker;
    type Timer = WebTimer;
}

type SharedEditor = Rc<RefCell<AnnotationEditor<WebBackend>>>;

/// Run one reload cycle without holding the editor across an await.
fn spawn_reload(editor: Weak<RefCell<AnnotationEditor<WebBackend>>>) {
    spawn_local(async move {
        let Some(editor) = editor.upgrade() else {
            return;
        };
        let started = {
            let Ok(mut inner) = editor.try_borrow_mut() else {
                warn!(target: "annotext_web::loader", "editor busy; reload dropped");
                return;
            };
            inner.begin_reload().map(|ticket| (ticket, inner.load_context()))
        };
        let Some((ticket, ctx)) = started else {
            return;
        };
        let cycle = ctx.fetch(ticket).await;
        let job = {
            let Ok(mut inner) = editor.try_borrow_mut() else {
                warn!(target: "annotext_web::loader", "editor busy; reload result dropped");
                return;
            };
            let outcome = inner.finish_reload(cycle);
            inner.render_job_for(&outcome)
        };
        if let Ok(job) = job {
            let outcome = job.run().await;
            debug!(target: "annotext_web::render", ?outcome, "render finished");
        }
    });
}

struct Listener {
    kind: &'static str,
    capture: bool,
    closure: Closure<dyn FnMut(Event)>,
}

type WidgetHandler = Closure<dyn FnMut(JsValue)>;

/// JS-facing annotation editor.
///
/// `destroy` detaches the DOM listeners and tears down the core editor, but
/// the closures handed to trackers, the widget and the connector canvas live
/// until this value is dropped. Those objects may still call them; after
/// `destroy` every such call is a no-op.
#[wasm_bindgen]
pub struct AnnotextEditor {
    inner: SharedEditor,
    root: Element,
    widget: Rc<WebWidget>,
    tracker_factory: Function,
    listeners: Vec<Listener>,
    widget_handlers: Vec<WidgetHandler>,
    tracker_callbacks: Vec<Closure<dyn FnMut()>>,
}

#[wasm_bindgen(start)]
pub fn wasm_start() {
    install_panic_hook();
}

#[wasm_bindgen]
impl AnnotextEditor {
    /// `trackerFactory(element, onChange)` must return an object exposing
    /// `currentRange`. `options` is an optional editor config object.
    #[wasm_bindgen(constructor)]
    pub fn new(
        root: Element,
        transport: JsValue,
        widget: JsValue,
        connections: JsValue,
        tracker_factory: Function,
        options: JsValue,
    ) -> Result<AnnotextEditor, JsValue> {
        install_panic_hook();
        install_tracing();

        let json = if is_absent(&options) {
            None
        } else {
            Some(to_json(&options).ok_or_else(|| JsValue::from_str("options are not JSON"))?)
        };
        let config = EditorConfig::from_optional_json(json.as_deref())
            .map_err(|e| JsValue::from_str(&e.to_string()))?;

        let web_widget = Rc::new(WebWidget::new(widget.clone()));
        let parts = EditorParts::<WebBackend> {
            dom: Rc::new(WebDom),
            root: root.clone().into(),
            transport: Rc::new(WebTransport(transport.unchecked_into())),
            widget: Rc::clone(&web_widget),
            connectors: Rc::new(WebConnections(connections.clone().unchecked_into())),
            timer: Rc::new(WebTimer),
        };
        let inner = AnnotationEditor::new(config, parts)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;

        let mut editor = Self {
            inner: Rc::new(RefCell::new(inner)),
            root,
            widget: web_widget,
            tracker_factory,
            listeners: Vec::new(),
            widget_handlers: Vec::new(),
            tracker_callbacks: Vec::new(),
        };
        editor.install_pointer_listeners()?;
        editor.subscribe_widget(&widget);
        editor.subscribe_canvas(&connections);
        Ok(editor)
    }

    /// Hand over a widget built after the editor. Renders before this call
    /// report the widget as not ready.
    #[wasm_bindgen(js_name = attachWidget)]
    pub fn attach_widget(&mut self, widget: JsValue) -> Result<(), JsValue> {
        if self.is_destroyed() {
            return Err(JsValue::from_str("editor was destroyed"));
        }
        self.widget.replace(widget.clone());
        self.subscribe_widget(&widget);
        Ok(())
    }

    /// Register the element of pane `"left"` or `"right"` and attach its
    /// viewport tracker.
    #[wasm_bindgen(js_name = registerPane)]
    pub fn register_pane(&mut self, pane: &str, element: Element) -> Result<(), JsValue> {
        if self.is_destroyed() {
            return Err(JsValue::from_str("editor was destroyed"));
        }
        let pane = PaneId::parse(pane)
            .ok_or_else(|| JsValue::from_str(&format!("unknown pane `{pane}`")))?;
        self.inner
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("editor is busy"))?
            .register_pane(pane, element.clone().into());

        let weak = Rc::downgrade(&self.inner);
        let on_change =
            Closure::wrap(Box::new(move || spawn_reload(weak.clone())) as Box<dyn FnMut()>);
        let tracker = self
            .tracker_factory
            .call2(&JsValue::NULL, &element, on_change.as_ref())?;
        self.tracker_callbacks.push(on_change);

        if !is_absent(&tracker) {
            self.inner
                .try_borrow_mut()
                .map_err(|_| JsValue::from_str("editor is busy"))?
                .attach_tracker(pane, WebTracker(tracker.unchecked_into()));
        }
        Ok(())
    }

    /// Reload every pane's visible range and render once all settle.
    #[wasm_bindgen(js_name = loadAnnotations)]
    pub fn load_annotations(&self) {
        spawn_reload(Rc::downgrade(&self.inner));
    }

    /// Scroll the text at absolute `offset` into view.
    #[wasm_bindgen(js_name = scrollTo)]
    pub fn scroll_to(&self, offset: u32) -> bool {
        self.inner
            .try_borrow()
            .is_ok_and(|inner| inner.scroll_to(offset as usize))
    }

    /// Number of annotations currently held across both panes.
    #[wasm_bindgen(js_name = annotationCount)]
    pub fn annotation_count(&self) -> u32 {
        self.inner
            .try_borrow()
            .map_or(0, |inner| u32::try_from(inner.store().len()).unwrap_or(u32::MAX))
    }

    #[wasm_bindgen(js_name = isDestroyed)]
    pub fn is_destroyed(&self) -> bool {
        self.inner.try_borrow().is_ok_and(|inner| inner.is_destroyed())
    }

    /// Detach the DOM listeners and destroy the widget and connectors.
    /// Tracker and widget callbacks stay callable and do nothing from now on.
    pub fn destroy(&mut self) {
        for listener in self.listeners.drain(..) {
            let _ = self.root.remove_event_listener_with_callback_and_bool(
                listener.kind,
                listener.closure.as_ref().unchecked_ref(),
                listener.capture,
            );
        }
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.destroy();
        }
    }
}

impl AnnotextEditor {
    fn install_pointer_listeners(&mut self) -> Result<(), JsValue> {
        for phase in PointerPhase::ALL {
            let weak = Rc::downgrade(&self.inner);
            let closure = Closure::wrap(Box::new(move |event: Event| {
                let (Some(editor), Some(mouse)) = (weak.upgrade(), event.dyn_ref::<MouseEvent>())
                else {
                    return;
                };
                let Ok(inner) = editor.try_borrow() else {
                    return;
                };
                let button = MouseButton::from_dom(mouse.button());
                if inner.handle_pointer_button(phase, button) == PointerDisposition::Suppress {
                    event.prevent_default();
                    event.stop_propagation();
                }
            }) as Box<dyn FnMut(Event)>);
            self.listen(phase.event_type(), true, closure)?;
        }

        let weak = Rc::downgrade(&self.inner);
        let closure = Closure::wrap(Box::new(move |event: Event| {
            let (Some(editor), Some(mouse)) = (weak.upgrade(), event.dyn_ref::<MouseEvent>())
            else {
                return;
            };
            let Some(target) = event.target().and_then(|t| t.dyn_into::<Node>().ok()) else {
                return;
            };
            let Ok(mut inner) = editor.try_borrow_mut() else {
                return;
            };
            if inner.handle_context_menu(&target, mouse).suppress_default {
                event.prevent_default();
                event.stop_propagation();
            }
        }) as Box<dyn FnMut(Event)>);
        self.listen("contextmenu", false, closure)
    }

    fn listen(
        &mut self,
        kind: &'static str,
        capture: bool,
        closure: Closure<dyn FnMut(Event)>,
    ) -> Result<(), JsValue> {
        let options = AddEventListenerOptions::new();
        options.set_capture(capture);
        self.root.add_event_listener_with_callback_and_add_event_listener_options(
            kind,
            closure.as_ref().unchecked_ref(),
            &options,
        )?;
        self.listeners.push(Listener { kind, capture, closure });
        Ok(())
    }

    /// Handler forwarding the widget event `name` to the editor.
    fn widget_handler(&self, name: &'static str) -> WidgetHandler {
        let weak = Rc::downgrade(&self.inner);
        Closure::wrap(Box::new(move |payload: JsValue| {
            let Some(editor) = weak.upgrade() else {
                return;
            };
            let Some(json) = to_json(&payload) else {
                debug!(target: "annotext_web::events", event = name, "event payload is not JSON");
                return;
            };
            let event = match WidgetEvent::from_json(name, &json) {
                Ok(event) => event,
                Err(reason) => {
                    debug!(
                        target: "annotext_web::events",
                        event = name,
                        reason = reason.as_str(),
                        "widget event ignored"
                    );
                    return;
                }
            };
            if let Ok(mut inner) = editor.try_borrow_mut() {
                inner.handle_widget_event(&event);
            }
        }) as Box<dyn FnMut(JsValue)>)
    }

    fn subscribe_widget(&mut self, widget: &JsValue) {
        if is_absent(widget) {
            return;
        }
        for name in WidgetEvent::WIDGET_EVENTS {
            let handler = self.widget_handler(name);
            widget.unchecked_ref::<JsWidget>().on(name, handler.as_ref().unchecked_ref());
            self.widget_handlers.push(handler);
        }
    }

    fn subscribe_canvas(&mut self, connections: &JsValue) {
        if is_absent(connections) {
            return;
        }
        let canvas = connections.unchecked_ref::<JsConnections>().canvas();
        for name in WidgetEvent::CANVAS_EVENTS {
            let handler = self.widget_handler(name);
            canvas.on(name, handler.as_ref().unchecked_ref());
            self.widget_handlers.push(handler);
        }
    }
}
