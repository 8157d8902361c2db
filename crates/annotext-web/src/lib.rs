#![forbid(unsafe_code)]

//! `annotext-web` keeps a two-pane, browser-rendered document view in sync
//! with a server-held store of span and relation annotations.
//!
//! Design goals:
//! - **Host-driven**: the embedding environment owns the DOM, the rendering
//!   widget, the connector plugin and the transport client. This crate only
//!   sees them through the traits in [`backend`] and [`dom`].
//! - **Single-threaded**: everything runs on the browser event loop. Async
//!   boundaries are exactly the transport fetch and the widget apply call.
//! - **Last request wins**: every reload cycle carries a [`LoadToken`]; stale
//!   responses are dropped instead of racing the newer cycle for the store.
//! - **Fail quiet**: malformed widget events and missing panes are reported as
//!   outcome values and `tracing` diagnostics, never as panics.
//!
//! The native core is fully testable with [`dom::HeadlessDom`]. On `wasm32`
//! the `wasm` module exports `AnnotextEditor` for JS hosts.

pub mod backend;
pub mod color;
pub mod compact;
pub mod config;
pub mod convert;
pub mod coords;
pub mod dom;
pub mod editor;
pub mod error;
pub mod events;
pub mod loader;
pub mod model;
pub mod pane;
pub mod render;
pub mod store;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::AnnotextEditor;

pub use backend::{
    AnnotationTransport, AnnotationWidget, ConnectorCanvas, EditorBackend, Timer, ViewportTracker,
};
pub use config::{EditorConfig, LoadPolicy};
pub use convert::{ID_PREFIX, WebAnnotation, prefixed_id, strip_id_prefix};
pub use dom::{DocumentDom, HeadlessDom, NodeKind};
pub use editor::{AnnotationEditor, EditorParts, ReloadReport};
pub use error::{ConfigError, TransportError, UnpackError, WidgetError};
pub use events::{AnnotationCommand, EventDispatch, EventIgnoredReason, MouseButton, WidgetEvent};
pub use loader::{LoadOptions, ReloadOutcome};
pub use model::{AnnotatedText, DocumentWindow, Offsets, Vid};
pub use pane::{PaneId, PaneMap};
pub use render::{PostRenderHook, RenderOutcome, StylePatch};
pub use store::{AnnotationStore, LoadToken};

/// Wire format requested from the transport client.
pub const WIRE_FORMAT: &str = "compact_v2";
