#![forbid(unsafe_code)]

//! Viewport-driven loader.
//!
//! A reload cycle runs in three phases so that a single-threaded host never
//! holds a borrow of the editor across an await:
//!
//! 1. [`Loader::begin`] (sync): issue a [`LoadToken`], read each pane's
//!    tracker and resolve its visible range to absolute offsets.
//! 2. [`fetch`] (async): load every pane concurrently, each bounded by the
//!    optional timeout. Borrows only the transport and timer.
//! 3. [`Loader::finish`] (sync): drop stale responses, unpack and convert the
//!    rest, and record them in the store.
//!
//! Only the newest token may write the store or request a render. A cycle that
//! was overtaken by a later [`Loader::begin`] is discarded whole.

use core::time::Duration;
use std::pin::pin;
use std::rc::Rc;

use futures_util::future::{Either, join_all, select};
use serde::Serialize;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::WIRE_FORMAT;
use crate::backend::{AnnotationTransport, Timer, ViewportTracker};
use crate::compact::{CompactAnnotatedText, unpack};
use crate::config::{EditorConfig, LoadPolicy};
use crate::convert::convert;
use crate::coords;
use crate::dom::DocumentDom;
use crate::error::TransportError;
use crate::model::Offsets;
use crate::pane::{PaneId, PaneMap};
use crate::store::{AnnotationStore, LoadToken};

/// Options sent with every `load_annotations` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    /// Absolute `[start, end)` to load.
    pub range: Offsets,
    pub include_text: bool,
    pub clip_spans: bool,
    pub clip_arcs: bool,
    pub long_arcs: bool,
    pub format: &'static str,
}

impl LoadOptions {
    #[must_use]
    pub fn for_range(range: Offsets, policy: &LoadPolicy) -> Self {
        Self {
            range,
            include_text: policy.include_text,
            clip_spans: policy.clip_spans,
            clip_arcs: policy.clip_arcs,
            long_arcs: policy.long_arcs,
            format: WIRE_FORMAT,
        }
    }
}

/// A registered pane: its DOM element and, once attached, its tracker.
#[derive(Debug, Clone)]
pub struct PaneSlot<N, K> {
    pub node: N,
    pub tracker: Option<K>,
}

/// Why a pane was left out of a cycle. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneSkipReason {
    NotRegistered,
    NoTracker,
    /// The tracker has not reported a visible range yet.
    NoRange,
    /// The pane element is no longer under the root.
    Unresolvable,
}

impl PaneSkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotRegistered => "not_registered",
            Self::NoTracker => "no_tracker",
            Self::NoRange => "no_range",
            Self::Unresolvable => "unresolvable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneRequest {
    pub pane: PaneId,
    pub options: LoadOptions,
}

/// Output of [`Loader::begin`].
#[derive(Debug, Clone)]
pub struct ReloadTicket {
    pub token: LoadToken,
    pub requests: Vec<PaneRequest>,
    pub skipped: Vec<(PaneId, PaneSkipReason)>,
    pub started: Instant,
}

#[derive(Debug, Clone)]
pub struct PaneResponse {
    pub pane: PaneId,
    pub range: Offsets,
    pub result: Result<CompactAnnotatedText, TransportError>,
}

/// Output of [`fetch`]: every pane's settled load.
#[derive(Debug, Clone)]
pub struct FetchedCycle {
    pub token: LoadToken,
    pub responses: Vec<PaneResponse>,
    pub skipped: Vec<(PaneId, PaneSkipReason)>,
    pub started: Instant,
}

/// One pane applied to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneLoadReport {
    pub pane: PaneId,
    pub range: Offsets,
    pub spans: usize,
    pub relations: usize,
    pub dropped_regions: usize,
    /// Malformed wire records skipped during unpacking.
    pub skipped_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneFailure {
    pub pane: PaneId,
    pub error: TransportError,
}

/// Result of finishing one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadOutcome {
    pub token: LoadToken,
    pub applied: Vec<PaneLoadReport>,
    pub failed: Vec<PaneFailure>,
    pub skipped: Vec<(PaneId, PaneSkipReason)>,
    /// Responses dropped because a newer cycle had started.
    pub stale: usize,
    /// Whether this cycle is still the newest and should render.
    pub render_requested: bool,
    pub elapsed: Duration,
}

impl ReloadOutcome {
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        !self.render_requested
    }
}

/// Token issuer and staleness gate.
#[derive(Debug, Default)]
pub struct Loader {
    latest: LoadToken,
}

impl Loader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest token issued so far.
    #[must_use]
    pub const fn latest(&self) -> LoadToken {
        self.latest
    }

    #[must_use]
    pub fn is_current(&self, token: LoadToken) -> bool {
        token == self.latest
    }

    /// Start a cycle: issue a token and build one request per loadable pane.
    ///
    /// Offsets are resolved against the DOM as it is now; nothing is cached.
    pub fn begin<D, K>(
        &mut self,
        dom: &D,
        root: &D::Node,
        panes: &PaneMap<PaneSlot<D::Node, K>>,
        policy: &LoadPolicy,
    ) -> ReloadTicket
    where
        D: DocumentDom,
        K: ViewportTracker,
    {
        self.latest = self.latest.next();
        let token = self.latest;
        let mut requests = Vec::with_capacity(2);
        let mut skipped = Vec::new();

        for pane in PaneId::ALL {
            match Self::request_for(dom, root, panes.get(pane)) {
                Ok(range) => requests.push(PaneRequest {
                    pane,
                    options: LoadOptions::for_range(range, policy),
                }),
                Err(reason) => skipped.push((pane, reason)),
            }
        }

        debug!(
            target: "annotext_web::loader",
            token = token.get(),
            requested = requests.len(),
            skipped = skipped.len(),
            "reload started"
        );
        ReloadTicket {
            token,
            requests,
            skipped,
            started: Instant::now(),
        }
    }

    fn request_for<D, K>(
        dom: &D,
        root: &D::Node,
        slot: Option<&PaneSlot<D::Node, K>>,
    ) -> Result<Offsets, PaneSkipReason>
    where
        D: DocumentDom,
        K: ViewportTracker,
    {
        let slot = slot.ok_or(PaneSkipReason::NotRegistered)?;
        let tracker = slot.tracker.as_ref().ok_or(PaneSkipReason::NoTracker)?;
        let local = tracker.current_range().ok_or(PaneSkipReason::NoRange)?;
        coords::to_absolute(dom, root, &slot.node, local).ok_or(PaneSkipReason::Unresolvable)
    }

    /// Apply a fetched cycle to `store`, unless it has been superseded.
    pub fn finish(
        &self,
        cycle: FetchedCycle,
        store: &mut AnnotationStore,
        config: &EditorConfig,
    ) -> ReloadOutcome {
        let token = cycle.token;
        let mut applied = Vec::new();
        let mut failed = Vec::new();
        let mut stale = 0usize;

        for response in cycle.responses {
            if !self.is_current(token) {
                stale += 1;
                continue;
            }
            let pane = response.pane;
            let payload = match response.result {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(
                        target: "annotext_web::loader",
                        pane = pane.as_str(),
                        token = token.get(),
                        error = %error,
                        "pane load failed; keeping previous annotations"
                    );
                    failed.push(PaneFailure { pane, error });
                    continue;
                }
            };
            let (doc, unpacked) = match unpack(&payload) {
                Ok(unpacked) => unpacked,
                Err(err) => {
                    let error = TransportError::from(err);
                    warn!(
                        target: "annotext_web::loader",
                        pane = pane.as_str(),
                        error = %error,
                        "pane payload rejected"
                    );
                    failed.push(PaneFailure { pane, error });
                    continue;
                }
            };
            let (annotations, converted) = convert(&doc, config);
            if !store.record_view(pane, token, annotations) {
                stale += 1;
                continue;
            }
            info!(
                target: "annotext_web::loader",
                pane = pane.as_str(),
                token = token.get(),
                spans = converted.spans,
                relations = converted.relations,
                "annotations loaded"
            );
            applied.push(PaneLoadReport {
                pane,
                range: response.range,
                spans: converted.spans,
                relations: converted.relations,
                dropped_regions: converted.dropped_regions,
                skipped_records: unpacked.skipped.len(),
            });
        }

        if stale > 0 {
            debug!(
                target: "annotext_web::loader",
                token = token.get(),
                latest = self.latest.get(),
                stale,
                "dropped responses from superseded reload"
            );
        }

        ReloadOutcome {
            token,
            applied,
            failed,
            skipped: cycle.skipped,
            stale,
            render_requested: self.is_current(token),
            elapsed: cycle.started.elapsed(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn load_bounded<T, M>(
    transport: &T,
    timer: &M,
    timeout: Option<Duration>,
    options: &LoadOptions,
) -> Result<CompactAnnotatedText, TransportError>
where
    T: AnnotationTransport,
    M: Timer,
{
    let Some(limit) = timeout else {
        return transport.load_annotations(options).await;
    };
    let load = pin!(transport.load_annotations(options));
    let sleep = pin!(timer.sleep(limit));
    match select(load, sleep).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => Err(TransportError::TimedOut {
            after_ms: duration_ms(limit),
        }),
    }
}

/// Load every requested pane concurrently; resolves once all have settled.
pub async fn fetch<T, M>(
    transport: &T,
    timer: &M,
    timeout: Option<Duration>,
    ticket: ReloadTicket,
) -> FetchedCycle
where
    T: AnnotationTransport,
    M: Timer,
{
    let results = join_all(
        ticket
            .requests
            .iter()
            .map(|request| load_bounded(transport, timer, timeout, &request.options)),
    )
    .await;

    let responses = ticket
        .requests
        .iter()
        .zip(results)
        .map(|(request, result)| PaneResponse {
            pane: request.pane,
            range: request.options.range,
            result,
        })
        .collect();

    FetchedCycle {
        token: ticket.token,
        responses,
        skipped: ticket.skipped,
        started: ticket.started,
    }
}

/// Owned handles needed by the async phase, detached from the editor.
#[derive(Debug)]
pub struct LoadContext<T, M> {
    pub transport: Rc<T>,
    pub timer: Rc<M>,
    pub timeout: Option<Duration>,
}

impl<T, M> Clone for LoadContext<T, M> {
    fn clone(&self) -> Self {
        Self {
            transport: Rc::clone(&self.transport),
            timer: Rc::clone(&self.timer),
            timeout: self.timeout,
        }
    }
}

impl<T: AnnotationTransport, M: Timer> LoadContext<T, M> {
    pub async fn fetch(&self, ticket: ReloadTicket) -> FetchedCycle {
        fetch(&*self.transport, &*self.timer, self.timeout, ticket).await
    }
}
