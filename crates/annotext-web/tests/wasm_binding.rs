#![cfg(target_arch = "wasm32")]
#![forbid(unsafe_code)]

use annotext_web::AnnotationWidget;
use annotext_web::dom::{DocumentDom, NodeKind};
use annotext_web::wasm::{AnnotextEditor, WebDom, WebWidget};
use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{Element, HtmlElement, Node};

wasm_bindgen_test_configure!(run_in_browser);

fn element(html: &str) -> Element {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .expect("test runs in a browser");
    let element = document.create_element("div").expect("div");
    element.set_inner_html(html);
    element
}

fn object(body: &str) -> JsValue {
    Function::new_no_args(body)
        .call0(&JsValue::NULL)
        .expect("object literal")
}

fn connections() -> JsValue {
    object(
        "return { destroyed: 0, destroy() { this.destroyed += 1; }, \
         canvas: { connections: [], on() {}, onLeaveAnnotation() {}, onCancelConnection() {} } };",
    )
}

fn recording_widget() -> JsValue {
    object("return { names: [], on(name) { this.names.push(name); }, destroy() {} };")
}

fn get(target: &JsValue, key: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(key)).expect("property")
}

fn editor(widget: JsValue, tracker_factory: Function) -> AnnotextEditor {
    AnnotextEditor::new(
        element("<p>left</p><p>right</p>"),
        Object::new().into(),
        widget,
        connections(),
        tracker_factory,
        JsValue::UNDEFINED,
    )
    .expect("editor should build")
}

fn capturing_tracker_factory(global: &str) -> Function {
    Function::new_with_args(
        "element, onChange",
        &format!("globalThis.{global} = onChange; return {{ currentRange: null }};"),
    )
}

#[wasm_bindgen_test]
fn web_dom_reports_kinds_and_utf16_lengths() {
    let root = element(r#"<span class="r6o-annotation" data-id="&#35;7">ab😀</span>"#);
    let dom = WebDom;
    let node: Node = root.clone().into();
    assert_eq!(dom.kind(&node), NodeKind::Element);

    let span = dom.children(&node).remove(0);
    let text = dom.children(&span).remove(0);
    assert_eq!(dom.kind(&text), NodeKind::Text);
    assert_eq!(dom.text_len(&text), 4);
    assert_eq!(dom.text_len(&span), 0);
    assert_eq!(dom.attribute(&span, "data-id").as_deref(), Some("#7"));
    assert!(dom.has_class(&span, "r6o-annotation"));
    assert_eq!(dom.parent(&text), Some(span));
}

#[wasm_bindgen_test]
fn web_dom_finds_ids_that_need_quoting() {
    let dom = WebDom;
    let node: Node = element("<span></span><span></span>").into();
    let spans = dom.children(&node);
    let quoted = spans[0].dyn_ref::<Element>().expect("first span");
    quoted.set_attribute("data-id", r#"#a"b\c"#).expect("attribute");
    let plain = spans[1].dyn_ref::<Element>().expect("second span");
    plain.set_attribute("data-id", "#7").expect("attribute");

    let found = dom.find_by_attribute(&node, "data-id", r#"#a"b\c"#);
    assert_eq!(found, vec![spans[0].clone()]);
    assert_eq!(dom.find_by_attribute(&node, "data-id", "#7").len(), 1);
    assert!(dom.find_by_attribute(&node, "data-id", "#8").is_empty());
}

#[wasm_bindgen_test]
fn web_dom_styles_html_elements() {
    let root = element(r#"<span class="r6o-annotation">x</span>"#);
    let dom = WebDom;
    let node: Node = root.into();
    let span = dom.find_by_class(&node, "r6o-annotation").remove(0);

    dom.set_style(&span, "display", "none");
    dom.add_class(&span, "i7n-highlighted");

    let html = span.dyn_ref::<HtmlElement>().expect("html element");
    assert_eq!(html.style().get_property_value("display").as_deref(), Ok("none"));
    assert!(html.class_list().contains("i7n-highlighted"));
    assert!(dom.has_class(&span, "i7n-highlighted"));
}

#[wasm_bindgen_test]
fn widget_becomes_ready_once_handed_over() {
    let widget = WebWidget::new(JsValue::NULL);
    assert!(!widget.is_ready());

    let previous = widget.replace(recording_widget());
    assert!(previous.is_null());
    assert!(widget.is_ready());
}

#[wasm_bindgen_test]
fn late_widget_is_subscribed_to_gestures() {
    let factory = capturing_tracker_factory("__annotextLateWidget");
    let mut editor = editor(JsValue::NULL, factory);

    let widget = recording_widget();
    editor.attach_widget(widget.clone()).expect("attach before destroy");
    let names: Vec<JsValue> = get(&widget, "names").unchecked_into::<Array>().to_vec();
    assert_eq!(
        names,
        vec![JsValue::from_str("createAnnotation"), JsValue::from_str("selectAnnotation")]
    );

    editor.destroy();
    assert!(editor.attach_widget(recording_widget()).is_err());
}

#[wasm_bindgen_test]
fn tracker_callbacks_stay_callable_after_destroy() {
    let factory = capturing_tracker_factory("__annotextOnChange");
    let mut editor = editor(recording_widget(), factory);
    editor
        .register_pane("left", element("<p>left</p>"))
        .expect("pane registers");

    let on_change: Function = get(&js_sys::global(), "__annotextOnChange").unchecked_into();
    assert!(on_change.call0(&JsValue::NULL).is_ok());

    editor.destroy();
    assert!(editor.is_destroyed());
    assert!(on_change.call0(&JsValue::NULL).is_ok());
    assert_eq!(editor.annotation_count(), 0);
    assert!(!editor.scroll_to(0));
    assert!(editor.register_pane("right", element("<p>right</p>")).is_err());
}

#[wasm_bindgen_test]
fn destroy_tears_down_connectors_once() {
    let connections = connections();
    let mut editor = AnnotextEditor::new(
        element("<p>text</p>"),
        Object::new().into(),
        recording_widget(),
        connections.clone(),
        capturing_tracker_factory("__annotextTeardown"),
        JsValue::UNDEFINED,
    )
    .expect("editor should build");

    editor.destroy();
    editor.destroy();
    assert_eq!(get(&connections, "destroyed").as_f64(), Some(1.0));
}
