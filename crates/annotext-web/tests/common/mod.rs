//! Recording collaborators for driving an `AnnotationEditor` over a
//! `HeadlessDom`.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use annotext_web::compact::CompactAnnotatedText;
use annotext_web::dom::NodeRef;
use annotext_web::{
    AnnotationEditor, AnnotationTransport, AnnotationWidget, ConnectorCanvas, EditorBackend,
    EditorConfig, EditorParts, HeadlessDom, LoadOptions, Offsets, PaneId, TransportError,
    ViewportTracker, Vid, WebAnnotation, WidgetError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateSpan(Vec<Offsets>),
    CreateRelation(String, String),
    Select(String),
    OpenContextMenu(String, u32),
}

/// Native stand-in for the DOM mouse event passed to the context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuEvent(pub u32);

/// Serves canned JSON payloads keyed by absolute range.
#[derive(Default)]
pub struct RecordingTransport {
    pub payloads: RefCell<HashMap<(usize, usize), String>>,
    pub hang: Cell<bool>,
    pub loads: RefCell<Vec<LoadOptions>>,
    pub calls: RefCell<Vec<TransportCall>>,
}

impl RecordingTransport {
    pub fn serve(&self, range: (usize, usize), json: impl Into<String>) {
        self.payloads.borrow_mut().insert(range, json.into());
    }
}

impl AnnotationTransport for RecordingTransport {
    type MenuEvent = MenuEvent;

    async fn load_annotations(
        &self,
        options: &LoadOptions,
    ) -> Result<CompactAnnotatedText, TransportError> {
        self.loads.borrow_mut().push(*options);
        if self.hang.get() {
            std::future::pending::<()>().await;
        }
        let key = (options.range.start, options.range.end);
        let json = self
            .payloads
            .borrow()
            .get(&key)
            .cloned()
            .ok_or_else(|| TransportError::Rejected(format!("no payload for {key:?}")))?;
        CompactAnnotatedText::from_json(&json).map_err(TransportError::from)
    }

    fn create_span_annotation(&self, regions: &[Offsets]) {
        self.calls.borrow_mut().push(TransportCall::CreateSpan(regions.to_vec()));
    }

    fn create_relation_annotation(&self, source: &Vid, target: &Vid) {
        self.calls
            .borrow_mut()
            .push(TransportCall::CreateRelation(source.to_string(), target.to_string()));
    }

    fn select_annotation(&self, id: &Vid) {
        self.calls.borrow_mut().push(TransportCall::Select(id.to_string()));
    }

    fn open_context_menu(&self, id: &Vid, event: &MenuEvent) {
        self.calls
            .borrow_mut()
            .push(TransportCall::OpenContextMenu(id.to_string(), event.0));
    }
}

pub struct RecordingWidget {
    pub ready: Cell<bool>,
    pub fail: Cell<bool>,
    pub applied: RefCell<Vec<Vec<WebAnnotation>>>,
    pub destroyed: Cell<bool>,
}

impl Default for RecordingWidget {
    fn default() -> Self {
        Self {
            ready: Cell::new(true),
            fail: Cell::new(false),
            applied: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
        }
    }
}

impl AnnotationWidget for RecordingWidget {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    async fn set_annotations(&self, annotations: &[WebAnnotation]) -> Result<(), WidgetError> {
        if self.fail.get() {
            return Err(WidgetError::Apply("boom".to_owned()));
        }
        self.applied.borrow_mut().push(annotations.to_vec());
        Ok(())
    }

    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

#[derive(Default)]
pub struct CountingConnectors {
    pub removed: Cell<usize>,
    pub left: Cell<usize>,
    pub floating: Cell<bool>,
    pub cancelled: Cell<usize>,
    pub destroyed: Cell<bool>,
}

impl ConnectorCanvas for CountingConnectors {
    fn remove_all_connections(&self) {
        self.removed.set(self.removed.get() + 1);
    }

    fn leave_annotation(&self) {
        self.left.set(self.left.get() + 1);
    }

    fn has_floating_edge(&self) -> bool {
        self.floating.get()
    }

    fn cancel_connection(&self) {
        self.floating.set(false);
        self.cancelled.set(self.cancelled.get() + 1);
    }

    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

/// Tracker whose range the test moves by hand.
#[derive(Clone, Default)]
pub struct FixedTracker(pub Rc<Cell<Option<Offsets>>>);

impl FixedTracker {
    pub fn at(start: usize, end: usize) -> Self {
        Self(Rc::new(Cell::new(Some(Offsets::new(start, end)))))
    }

    pub fn scroll(&self, start: usize, end: usize) {
        self.0.set(Some(Offsets::new(start, end)));
    }
}

impl ViewportTracker for FixedTracker {
    fn current_range(&self) -> Option<Offsets> {
        self.0.get()
    }
}

/// Sleeps resolve on first poll. Loads are polled first, so only a load
/// that is still pending loses the race.
pub struct InstantTimer;

impl annotext_web::Timer for InstantTimer {
    async fn sleep(&self, _duration: Duration) {}
}

pub struct TestBackend;

impl EditorBackend for TestBackend {
    type Dom = HeadlessDom;
    type Transport = RecordingTransport;
    type Widget = RecordingWidget;
    type Connectors = CountingConnectors;
    type Tracker = FixedTracker;
    type Timer = InstantTimer;
}

/// An editor over
/// `<root>"preamble: "<left>…60 chars…</left><right>…60 chars…</right></root>`,
/// left pane starting at offset 10 and right pane at 70.
pub struct Harness {
    pub editor: AnnotationEditor<TestBackend>,
    pub dom: Rc<HeadlessDom>,
    pub left: NodeRef,
    pub right: NodeRef,
    pub transport: Rc<RecordingTransport>,
    pub widget: Rc<RecordingWidget>,
    pub connectors: Rc<CountingConnectors>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EditorConfig::default())
    }

    pub fn with_config(config: EditorConfig) -> Self {
        let dom = Rc::new(HeadlessDom::new());
        let root = dom.root();
        dom.append_text(root, "preamble: ");
        let left = dom.append_element(root, &["view-left"]);
        dom.append_text(left, &"l".repeat(60));
        let right = dom.append_element(root, &["view-right"]);
        dom.append_text(right, &"r".repeat(60));

        let transport = Rc::new(RecordingTransport::default());
        let widget = Rc::new(RecordingWidget::default());
        let connectors = Rc::new(CountingConnectors::default());
        let parts = EditorParts::<TestBackend> {
            dom: Rc::clone(&dom),
            root,
            transport: Rc::clone(&transport),
            widget: Rc::clone(&widget),
            connectors: Rc::clone(&connectors),
            timer: Rc::new(InstantTimer),
        };
        let editor = AnnotationEditor::new(config, parts).expect("default config is valid");
        Self {
            editor,
            dom,
            left,
            right,
            transport,
            widget,
            connectors,
        }
    }

    /// Register both panes with trackers at the given pane-local ranges.
    pub fn with_panes(mut self, left: (usize, usize), right: (usize, usize)) -> Self {
        self.editor.register_pane(PaneId::Left, self.left);
        self.editor.attach_tracker(PaneId::Left, FixedTracker::at(left.0, left.1));
        self.editor.register_pane(PaneId::Right, self.right);
        self.editor.attach_tracker(PaneId::Right, FixedTracker::at(right.0, right.1));
        self
    }
}

/// Compact payload with one span per `(vid, start, end)` triple.
pub fn spans_payload(window: (usize, usize), spans: &[(&str, usize, usize)]) -> String {
    let spans: Vec<String> = spans
        .iter()
        .map(|(vid, start, end)| format!(r#"{{ "vid": "{vid}", "offsets": [[{start}, {end}]] }}"#))
        .collect();
    format!(
        r#"{{ "window": [{}, {}], "spans": [{}] }}"#,
        window.0,
        window.1,
        spans.join(", ")
    )
}
