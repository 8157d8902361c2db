#![forbid(unsafe_code)]

//! Collaborator traits: the boundary between the sync core and its host.
//!
//! The transport client, rendering widget, connector plugin and viewport
//! trackers are owned by the embedding environment. On `wasm32` they are JS
//! objects bound in the `wasm` module; native hosts and tests supply their own
//! implementations. All methods take `&self`: the collaborators are shared
//! handles living on a single event loop.
//!
//! Futures returned here are not `Send`. Nothing in this crate leaves the
//! thread that created it.

#![allow(async_fn_in_trait)]

use core::time::Duration;

use crate::compact::CompactAnnotatedText;
use crate::convert::WebAnnotation;
use crate::dom::DocumentDom;
use crate::error::{TransportError, WidgetError};
use crate::loader::LoadOptions;
use crate::model::{Offsets, Vid};

/// Server-facing client: loads annotations and receives user commands.
pub trait AnnotationTransport {
    /// Native event handed through to the context menu (the DOM
    /// `MouseEvent` on `wasm32`).
    type MenuEvent;

    /// Fetch the compact payload for `options.range`.
    async fn load_annotations(
        &self,
        options: &LoadOptions,
    ) -> Result<CompactAnnotatedText, TransportError>;

    /// Absolute `[start, end)` regions of a new span.
    fn create_span_annotation(&self, regions: &[Offsets]);

    fn create_relation_annotation(&self, source: &Vid, target: &Vid);

    fn select_annotation(&self, id: &Vid);

    fn open_context_menu(&self, id: &Vid, event: &Self::MenuEvent);
}

/// Per-pane visible-range source.
pub trait ViewportTracker {
    /// Pane-local `[start, end)` currently visible, if known.
    fn current_range(&self) -> Option<Offsets>;
}

/// The rendering widget's apply contract.
pub trait AnnotationWidget {
    /// `false` until the widget finished constructing.
    fn is_ready(&self) -> bool;

    /// Replace the rendered annotation list.
    async fn set_annotations(&self, annotations: &[WebAnnotation]) -> Result<(), WidgetError>;

    fn destroy(&self);
}

/// Connector plugin drawing relation edges.
pub trait ConnectorCanvas {
    fn remove_all_connections(&self);

    /// Drop hover state.
    fn leave_annotation(&self);

    /// Whether an uncommitted connection is following the pointer.
    fn has_floating_edge(&self) -> bool;

    fn cancel_connection(&self);

    fn destroy(&self);

    /// Clear every in-progress drawing interaction.
    fn reset_drag_state(&self) {
        self.leave_annotation();
        if self.has_floating_edge() {
            self.cancel_connection();
        }
    }
}

/// Async sleep used to bound load latency.
pub trait Timer {
    async fn sleep(&self, duration: Duration);
}

/// Unified collaborator set for one editor.
///
/// Groups the associated types so generic code names a single parameter.
pub trait EditorBackend {
    type Dom: DocumentDom + 'static;
    type Transport: AnnotationTransport + 'static;
    type Widget: AnnotationWidget + 'static;
    type Connectors: ConnectorCanvas + 'static;
    type Tracker: ViewportTracker + 'static;
    type Timer: Timer + 'static;
}
