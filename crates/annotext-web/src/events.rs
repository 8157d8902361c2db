#![forbid(unsafe_code)]

//! Event adapter: widget gestures → transport commands.
//!
//! Widget payloads are decoded with serde from the JSON the widget emits.
//! Anything malformed is ignored with a typed reason; no command is issued and
//! nothing surfaces to the user. Every forwarded command gets a sequence
//! number so hosts can correlate log lines.

use serde::Deserialize;
use tracing::debug;

use crate::convert::strip_id_prefix;
use crate::dom::DocumentDom;
use crate::model::{Offsets, Vid};
use crate::render::ID_ATTRIBUTE;

/// DOM mouse button, as reported by `MouseEvent.button`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Other(u8),
}

impl MouseButton {
    #[must_use]
    pub const fn from_u8(n: u8) -> Self {
        match n {
            0 => Self::Left,
            1 => Self::Middle,
            2 => Self::Right,
            other => Self::Other(other),
        }
    }

    /// `MouseEvent.button` is a signed short; out-of-range values map to
    /// `Other(u8::MAX)`.
    #[must_use]
    pub fn from_dom(button: i16) -> Self {
        u8::try_from(button).map_or(Self::Other(u8::MAX), Self::from_u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum WidgetSelector {
    TextPositionSelector { start: usize, end: usize },
    #[serde(other)]
    Other,
}

/// One selector or a list of them; the widget emits both.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SelectorList {
    Many(Vec<WidgetSelector>),
    One(WidgetSelector),
}

impl SelectorList {
    #[must_use]
    pub fn first_position(&self) -> Option<Offsets> {
        let selectors = match self {
            Self::Many(list) => list.as_slice(),
            Self::One(one) => std::slice::from_ref(one),
        };
        selectors.iter().find_map(|selector| match *selector {
            WidgetSelector::TextPositionSelector { start, end } => Some(Offsets::new(start, end)),
            WidgetSelector::Other => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WidgetEntity {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WidgetTarget {
    /// Connector endpoints, source first.
    Entities(Vec<WidgetEntity>),
    Selectors {
        #[serde(default)]
        selector: Option<SelectorList>,
    },
}

/// The subset of a widget annotation the adapter reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WidgetAnnotation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub target: Option<WidgetTarget>,
}

/// Events emitted by the widget and the connector plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    CreateAnnotation(WidgetAnnotation),
    SelectAnnotation(WidgetAnnotation),
    CreateConnection(WidgetAnnotation),
    SelectConnection(WidgetAnnotation),
}

impl WidgetEvent {
    /// Event names subscribed on the widget.
    pub const WIDGET_EVENTS: [&'static str; 2] = ["createAnnotation", "selectAnnotation"];

    /// Event names subscribed on the connector canvas.
    pub const CANVAS_EVENTS: [&'static str; 2] = ["createConnection", "selectConnection"];

    /// Decode the event `name` carrying the JSON `payload`.
    pub fn from_json(name: &str, payload: &str) -> Result<Self, EventIgnoredReason> {
        let ctor: fn(WidgetAnnotation) -> Self = match name {
            "createAnnotation" => Self::CreateAnnotation,
            "selectAnnotation" => Self::SelectAnnotation,
            "createConnection" => Self::CreateConnection,
            "selectConnection" => Self::SelectConnection,
            _ => return Err(EventIgnoredReason::UnknownEvent),
        };
        serde_json::from_str(payload)
            .map(ctor)
            .map_err(|_| EventIgnoredReason::Malformed)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateAnnotation(_) => "createAnnotation",
            Self::SelectAnnotation(_) => "selectAnnotation",
            Self::CreateConnection(_) => "createConnection",
            Self::SelectConnection(_) => "selectConnection",
        }
    }
}

/// Outbound call to the transport client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationCommand {
    CreateSpan { regions: Vec<Offsets> },
    CreateRelation { source: Vid, target: Vid },
    Select { id: Vid },
    OpenContextMenu { id: Vid },
}

/// Deterministic reason why an event produced no command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventIgnoredReason {
    UnknownEvent,
    /// Payload did not decode.
    Malformed,
    NoPositionSelector,
    /// An id was absent or lacked the reserved prefix.
    MissingId,
    /// Fewer than two connector endpoints.
    MissingEndpoint,
    /// Right-click outside any annotated region.
    NotAnnotated,
    /// The editor was destroyed.
    Destroyed,
}

impl EventIgnoredReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownEvent => "unknown_event",
            Self::Malformed => "malformed",
            Self::NoPositionSelector => "no_position_selector",
            Self::MissingId => "missing_id",
            Self::MissingEndpoint => "missing_endpoint",
            Self::NotAnnotated => "not_annotated",
            Self::Destroyed => "destroyed",
        }
    }
}

/// Result of one adapter dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDispatch {
    /// Assigned to forwarded commands only.
    pub sequence: Option<u64>,
    pub command: Option<AnnotationCommand>,
    pub ignored: Option<EventIgnoredReason>,
    /// Prevent the browser default and stop propagation.
    pub suppress_default: bool,
}

impl EventDispatch {
    #[must_use]
    pub const fn ignored(reason: EventIgnoredReason) -> Self {
        Self {
            sequence: None,
            command: None,
            ignored: Some(reason),
            suppress_default: false,
        }
    }

    #[must_use]
    pub const fn is_forwarded(&self) -> bool {
        self.command.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Up,
    Click,
}

impl PointerPhase {
    /// Phases filtered at the capture stage.
    pub const ALL: [Self; 3] = [Self::Down, Self::Up, Self::Click];

    /// DOM event type the phase is observed through.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Down => "mousedown",
            Self::Up => "mouseup",
            Self::Click => "click",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerDisposition {
    Pass,
    /// Swallow at the capture phase so the widget never starts a selection.
    Suppress,
}

fn stripped(id: Option<&str>) -> Result<Vid, EventIgnoredReason> {
    id.and_then(strip_id_prefix).ok_or(EventIgnoredReason::MissingId)
}

fn command_for(event: &WidgetEvent) -> Result<AnnotationCommand, EventIgnoredReason> {
    match event {
        WidgetEvent::CreateAnnotation(annotation) => {
            let position = match &annotation.target {
                Some(WidgetTarget::Selectors {
                    selector: Some(selectors),
                }) => selectors.first_position(),
                _ => None,
            };
            let region = position.ok_or(EventIgnoredReason::NoPositionSelector)?;
            Ok(AnnotationCommand::CreateSpan {
                regions: vec![region],
            })
        }
        WidgetEvent::CreateConnection(annotation) => {
            let Some(WidgetTarget::Entities(endpoints)) = &annotation.target else {
                return Err(EventIgnoredReason::MissingEndpoint);
            };
            let [source, target, ..] = endpoints.as_slice() else {
                return Err(EventIgnoredReason::MissingEndpoint);
            };
            Ok(AnnotationCommand::CreateRelation {
                source: stripped(source.id.as_deref())?,
                target: stripped(target.id.as_deref())?,
            })
        }
        WidgetEvent::SelectAnnotation(annotation) | WidgetEvent::SelectConnection(annotation) => {
            Ok(AnnotationCommand::Select {
                id: stripped(annotation.id.as_deref())?,
            })
        }
    }
}

/// Maps gestures to commands and numbers the forwarded ones.
#[derive(Debug, Default)]
pub struct EventAdapter {
    next_sequence: u64,
}

impl EventAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn forward(&mut self, command: AnnotationCommand, suppress_default: bool) -> EventDispatch {
        self.next_sequence = self.next_sequence.saturating_add(1);
        EventDispatch {
            sequence: Some(self.next_sequence),
            command: Some(command),
            ignored: None,
            suppress_default,
        }
    }

    pub fn dispatch_widget_event(&mut self, event: &WidgetEvent) -> EventDispatch {
        match command_for(event) {
            Ok(command) => {
                let dispatch = self.forward(command, false);
                debug!(
                    target: "annotext_web::events",
                    event = event.name(),
                    seq = dispatch.sequence,
                    "widget event forwarded"
                );
                dispatch
            }
            Err(reason) => {
                debug!(
                    target: "annotext_web::events",
                    event = event.name(),
                    reason = reason.as_str(),
                    "widget event ignored"
                );
                EventDispatch::ignored(reason)
            }
        }
    }

    /// Right-click on `target`: find the enclosing annotated region and ask
    /// for its context menu.
    pub fn dispatch_context_menu<D: DocumentDom>(
        &mut self,
        dom: &D,
        target: &D::Node,
        annotation_class: &str,
    ) -> EventDispatch {
        let Some(region) = dom.closest_with_class(target, annotation_class) else {
            return EventDispatch::ignored(EventIgnoredReason::NotAnnotated);
        };
        let id = match stripped(dom.attribute(&region, ID_ATTRIBUTE).as_deref()) {
            Ok(id) => id,
            Err(reason) => {
                debug!(
                    target: "annotext_web::events",
                    reason = reason.as_str(),
                    "context menu ignored"
                );
                return EventDispatch::ignored(reason);
            }
        };
        let dispatch = self.forward(AnnotationCommand::OpenContextMenu { id }, true);
        debug!(
            target: "annotext_web::events",
            seq = dispatch.sequence,
            "context menu requested"
        );
        dispatch
    }

    /// Capture-phase filter for mousedown, mouseup and click.
    #[must_use]
    pub fn pointer_button(&self, phase: PointerPhase, button: MouseButton) -> PointerDisposition {
        if button == MouseButton::Right {
            debug!(
                target: "annotext_web::events",
                phase = ?phase,
                "right button suppressed"
            );
            PointerDisposition::Suppress
        } else {
            PointerDisposition::Pass
        }
    }
}
