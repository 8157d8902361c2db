#![forbid(unsafe_code)]

//! The owning component: panes, loader, store, render pass and event adapter.
//!
//! [`AnnotationEditor::reload`] runs a whole cycle for hosts that can hold the
//! editor across an await. Hosts that share the editor behind a `RefCell`
//! drive the phases themselves:
//!
//! ```ignore
//! let ticket = editor.borrow_mut().begin_reload();
//! let ctx = editor.borrow().load_context();
//! let cycle = ctx.fetch(ticket?).await;
//! let outcome = editor.borrow_mut().finish_reload(cycle);
//! let job = editor.borrow().render_job_for(&outcome);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};

use crate::backend::{AnnotationTransport, AnnotationWidget, ConnectorCanvas, EditorBackend};
use crate::config::EditorConfig;
use crate::convert::WebAnnotation;
use crate::coords;
use crate::dom::DocumentDom;
use crate::error::ConfigError;
use crate::events::{
    AnnotationCommand, EventAdapter, EventDispatch, EventIgnoredReason, MouseButton,
    PointerDisposition, PointerPhase, WidgetEvent,
};
use crate::loader::{FetchedCycle, LoadContext, Loader, PaneSlot, ReloadOutcome, ReloadTicket};
use crate::pane::{PaneId, PaneMap};
use crate::render::{DragStateReset, HookList, PostRenderHook, RenderJob, RenderOutcome, StylePatch};
use crate::store::AnnotationStore;

type NodeOf<B> = <<B as EditorBackend>::Dom as DocumentDom>::Node;

/// Host-owned collaborators handed to [`AnnotationEditor::new`].
pub struct EditorParts<B: EditorBackend> {
    pub dom: Rc<B::Dom>,
    /// Element containing both panes; offsets are absolute to its text.
    pub root: NodeOf<B>,
    pub transport: Rc<B::Transport>,
    pub widget: Rc<B::Widget>,
    pub connectors: Rc<B::Connectors>,
    pub timer: Rc<B::Timer>,
}

/// What one [`AnnotationEditor::reload`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadReport {
    /// `None` when the editor was already destroyed.
    pub load: Option<ReloadOutcome>,
    pub render: RenderOutcome,
}

pub struct AnnotationEditor<B: EditorBackend> {
    config: Rc<EditorConfig>,
    dom: Rc<B::Dom>,
    root: NodeOf<B>,
    transport: Rc<B::Transport>,
    widget: Rc<B::Widget>,
    connectors: Rc<B::Connectors>,
    timer: Rc<B::Timer>,
    panes: PaneMap<PaneSlot<NodeOf<B>, B::Tracker>>,
    loader: Loader,
    store: AnnotationStore,
    hooks: HookList<B::Dom>,
    adapter: EventAdapter,
    destroyed: bool,
}

impl<B: EditorBackend> AnnotationEditor<B> {
    /// Validate `config` and wire the collaborators. The drag-state reset and
    /// the style patch are registered as the first post-render hooks.
    pub fn new(config: EditorConfig, parts: EditorParts<B>) -> Result<Self, ConfigError> {
        config.validate()?;
        let hooks: Vec<Box<dyn PostRenderHook<B::Dom>>> =
            vec![Box::new(DragStateReset), Box::new(StylePatch)];
        Ok(Self {
            config: Rc::new(config),
            dom: parts.dom,
            root: parts.root,
            transport: parts.transport,
            widget: parts.widget,
            connectors: parts.connectors,
            timer: parts.timer,
            panes: PaneMap::new(),
            loader: Loader::new(),
            store: AnnotationStore::new(),
            hooks: Rc::new(RefCell::new(hooks)),
            adapter: EventAdapter::new(),
            destroyed: false,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    #[must_use]
    pub fn dom(&self) -> &B::Dom {
        &self.dom
    }

    #[must_use]
    pub fn root(&self) -> &NodeOf<B> {
        &self.root
    }

    /// Register the element backing `pane`. Replacing a pane drops its
    /// tracker; the previous element is returned.
    pub fn register_pane(&mut self, pane: PaneId, node: NodeOf<B>) -> Option<NodeOf<B>> {
        debug!(target: "annotext_web::loader", pane = pane.as_str(), "pane registered");
        self.panes
            .insert(pane, PaneSlot { node, tracker: None })
            .map(|slot| slot.node)
    }

    /// Attach the viewport tracker of a registered pane.
    pub fn attach_tracker(&mut self, pane: PaneId, tracker: B::Tracker) -> bool {
        match self.panes.get_mut(pane) {
            Some(slot) => {
                slot.tracker = Some(tracker);
                true
            }
            None => false,
        }
    }

    pub fn unregister_pane(&mut self, pane: PaneId) -> Option<NodeOf<B>> {
        self.panes.remove(pane).map(|slot| slot.node)
    }

    #[must_use]
    pub fn pane_node(&self, pane: PaneId) -> Option<&NodeOf<B>> {
        self.panes.get(pane).map(|slot| &slot.node)
    }

    /// Append an observer run after every successful render.
    pub fn add_post_render_hook(&self, hook: Box<dyn PostRenderHook<B::Dom>>) {
        self.hooks.borrow_mut().push(hook);
    }

    #[must_use]
    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// Render payload: every pane's list, left pane first.
    #[must_use]
    pub fn flattened(&self) -> Vec<WebAnnotation> {
        self.store.flatten_all()
    }

    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// First phase of a reload; `None` once destroyed.
    pub fn begin_reload(&mut self) -> Option<ReloadTicket> {
        if self.destroyed {
            return None;
        }
        Some(self.loader.begin(&*self.dom, &self.root, &self.panes, &self.config.load))
    }

    #[must_use]
    pub fn load_context(&self) -> LoadContext<B::Transport, B::Timer> {
        LoadContext {
            transport: Rc::clone(&self.transport),
            timer: Rc::clone(&self.timer),
            timeout: self.config.load_timeout(),
        }
    }

    pub fn finish_reload(&mut self, cycle: FetchedCycle) -> ReloadOutcome {
        self.loader.finish(cycle, &mut self.store, &self.config)
    }

    /// Snapshot the store into a detached render.
    pub fn render_job(&self) -> Result<RenderJob<B>, RenderOutcome> {
        if self.destroyed {
            return Err(RenderOutcome::Destroyed);
        }
        Ok(RenderJob {
            dom: Rc::clone(&self.dom),
            root: self.root.clone(),
            widget: Rc::clone(&self.widget),
            connectors: Rc::clone(&self.connectors),
            hooks: Rc::clone(&self.hooks),
            config: Rc::clone(&self.config),
            annotations: self.store.flatten_all(),
        })
    }

    /// Render job for a finished cycle, unless a newer cycle owns the render.
    pub fn render_job_for(&self, outcome: &ReloadOutcome) -> Result<RenderJob<B>, RenderOutcome> {
        if self.destroyed {
            return Err(RenderOutcome::Destroyed);
        }
        if !outcome.render_requested || !self.loader.is_current(outcome.token) {
            debug!(
                target: "annotext_web::render",
                token = outcome.token.get(),
                "render skipped for superseded reload"
            );
            return Err(RenderOutcome::Superseded);
        }
        self.render_job()
    }

    /// Render the current store contents.
    pub async fn render(&self) -> RenderOutcome {
        match self.render_job() {
            Ok(job) => job.run().await,
            Err(outcome) => outcome,
        }
    }

    /// Load every pane's visible range concurrently, then render once.
    pub async fn reload(&mut self) -> ReloadReport {
        let Some(ticket) = self.begin_reload() else {
            return ReloadReport {
                load: None,
                render: RenderOutcome::Destroyed,
            };
        };
        let cycle = self.load_context().fetch(ticket).await;
        let outcome = self.finish_reload(cycle);
        let render = match self.render_job_for(&outcome) {
            Ok(job) => job.run().await,
            Err(skipped) => skipped,
        };
        ReloadReport {
            load: Some(outcome),
            render,
        }
    }

    fn execute(&self, command: &AnnotationCommand) {
        match command {
            AnnotationCommand::CreateSpan { regions } => {
                self.transport.create_span_annotation(regions);
            }
            AnnotationCommand::CreateRelation { source, target } => {
                self.transport.create_relation_annotation(source, target);
            }
            AnnotationCommand::Select { id } => self.transport.select_annotation(id),
            // Needs the native event; issued by `handle_context_menu`.
            AnnotationCommand::OpenContextMenu { .. } => {}
        }
    }

    /// Translate a widget or connector event and forward the command.
    pub fn handle_widget_event(&mut self, event: &WidgetEvent) -> EventDispatch {
        if self.destroyed {
            return EventDispatch::ignored(EventIgnoredReason::Destroyed);
        }
        let dispatch = self.adapter.dispatch_widget_event(event);
        if let Some(command) = &dispatch.command {
            self.execute(command);
        }
        dispatch
    }

    /// Right-click on `target`. When the dispatch asks for it, the host must
    /// prevent the default action and stop propagation.
    pub fn handle_context_menu(
        &mut self,
        target: &NodeOf<B>,
        event: &<B::Transport as AnnotationTransport>::MenuEvent,
    ) -> EventDispatch {
        if self.destroyed {
            return EventDispatch::ignored(EventIgnoredReason::Destroyed);
        }
        let dispatch = self
            .adapter
            .dispatch_context_menu(&*self.dom, target, &self.config.annotation_class);
        if let Some(AnnotationCommand::OpenContextMenu { id }) = &dispatch.command {
            self.transport.open_context_menu(id, event);
        }
        dispatch
    }

    #[must_use]
    pub fn handle_pointer_button(
        &self,
        phase: PointerPhase,
        button: MouseButton,
    ) -> PointerDisposition {
        self.adapter.pointer_button(phase, button)
    }

    /// Scroll the text at absolute `offset` into the middle of the view.
    /// Returns `false` when the offset lies outside the document.
    pub fn scroll_to(&self, offset: usize) -> bool {
        if self.destroyed {
            return false;
        }
        let Some(position) = coords::offset_to_position(&*self.dom, &self.root, offset) else {
            debug!(target: "annotext_web::render", offset, "scroll target outside document");
            return false;
        };
        let Some(container) = self.dom.parent(&position.node) else {
            return false;
        };
        self.dom.scroll_into_view(&container);
        true
    }

    /// Tear down the connector plugin and the widget and drop all state.
    /// Later reloads, renders and events are no-ops.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.connectors.destroy();
        self.widget.destroy();
        self.store.clear();
        self.panes.clear();
        info!(target: "annotext_web::render", "annotation editor destroyed");
    }
}
