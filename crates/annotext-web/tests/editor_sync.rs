//! End-to-end reload and render cycles over a headless document.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use annotext_web::loader::{PaneFailure, PaneSkipReason};
use annotext_web::render::{ID_ATTRIBUTE, RenderContext};
use annotext_web::{
    EditorConfig, HeadlessDom, LoadToken, Offsets, PaneId, PostRenderHook, RenderOutcome,
    TransportError, WebAnnotation,
};
use common::{FixedTracker, Harness, spans_payload};
use futures_executor::block_on;
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

const LEFT_WINDOW: (usize, usize) = (10, 30);
const RIGHT_WINDOW: (usize, usize) = (75, 95);

fn loaded_harness() -> Harness {
    let harness = Harness::new().with_panes((0, 20), (5, 25));
    harness
        .transport
        .serve(LEFT_WINDOW, spans_payload(LEFT_WINDOW, &[("a", 5, 12), ("b", 0, 3)]));
    harness.transport.serve(
        RIGHT_WINDOW,
        spans_payload(RIGHT_WINDOW, &[("a", 0, 4), ("c", 1, 2), ("d", 3, 9)]),
    );
    harness
}

fn ids(annotations: &[WebAnnotation]) -> Vec<&str> {
    annotations.iter().map(|a| a.id.as_str()).collect()
}

#[test]
fn reload_loads_both_panes_and_renders_once() {
    let mut harness = loaded_harness();
    let report = block_on(harness.editor.reload());

    assert_eq!(report.render, RenderOutcome::Rendered { count: 5 });
    let load = report.load.expect("editor is live");
    assert_eq!(load.applied.len(), 2);
    assert!(load.failed.is_empty() && load.skipped.is_empty());

    let applied = harness.widget.applied.borrow();
    assert_eq!(applied.len(), 1);
    // Same entity loaded by both panes stays distinct; left pane first.
    assert_eq!(ids(&applied[0]), vec!["#a", "#b", "#a", "#c", "#d"]);
    assert_eq!(harness.editor.flattened().len(), 5);
}

#[test]
fn requests_use_absolute_ranges_and_fixed_options() {
    let mut harness = loaded_harness();
    block_on(harness.editor.reload());

    let loads = harness.transport.loads.borrow();
    let ranges: Vec<Offsets> = loads.iter().map(|o| o.range).collect();
    assert_eq!(ranges, vec![Offsets::new(10, 30), Offsets::new(75, 95)]);
    for options in loads.iter() {
        assert!(!options.include_text);
        assert!(options.clip_spans);
        assert!(!options.clip_arcs);
        assert!(options.long_arcs);
        assert_eq!(options.format, "compact_v2");
    }
}

#[test]
fn stored_selectors_are_absolute_to_the_root() {
    let mut harness = loaded_harness();
    block_on(harness.editor.reload());

    let left = harness.editor.store().annotations(PaneId::Left);
    assert_eq!(left[0].position(), Some(Offsets::new(15, 22)));
    let right = harness.editor.store().annotations(PaneId::Right);
    assert_eq!(right[2].position(), Some(Offsets::new(78, 84)));
}

#[test]
fn reload_with_unchanged_viewport_is_idempotent() {
    let mut harness = loaded_harness();
    block_on(harness.editor.reload());
    let first = harness.editor.flattened();
    block_on(harness.editor.reload());
    block_on(harness.editor.reload());

    assert_eq!(harness.editor.flattened(), first);
    let applied = harness.widget.applied.borrow();
    assert_eq!(applied.len(), 3);
    assert_eq!(applied[2], applied[0]);
}

#[test]
fn panes_without_tracker_or_range_are_skipped_quietly() {
    let mut harness = Harness::new();
    harness.editor.register_pane(PaneId::Left, harness.left);
    harness.editor.attach_tracker(PaneId::Left, FixedTracker::default());
    let report = block_on(harness.editor.reload());

    let load = report.load.expect("editor is live");
    assert_eq!(
        load.skipped,
        vec![
            (PaneId::Left, PaneSkipReason::NoRange),
            (PaneId::Right, PaneSkipReason::NotRegistered),
        ]
    );
    assert!(harness.transport.loads.borrow().is_empty());
    assert_eq!(report.render, RenderOutcome::Rendered { count: 0 });
}

#[test]
fn unregistered_pane_drops_out_of_later_cycles() {
    let mut harness = loaded_harness();
    assert_eq!(harness.editor.pane_node(PaneId::Right), Some(&harness.right));
    assert_eq!(harness.editor.unregister_pane(PaneId::Right), Some(harness.right));
    assert_eq!(harness.editor.pane_node(PaneId::Right), None);

    let report = block_on(harness.editor.reload());
    let load = report.load.expect("editor is live");
    assert_eq!(load.skipped, vec![(PaneId::Right, PaneSkipReason::NotRegistered)]);
    assert_eq!(harness.transport.loads.borrow().len(), 1);
    assert_eq!(report.render, RenderOutcome::Rendered { count: 2 });
}

#[test]
fn superseded_cycle_never_writes_or_renders() {
    let mut harness = Harness::new();
    let left = FixedTracker::at(0, 20);
    harness.editor.register_pane(PaneId::Left, harness.left);
    harness.editor.attach_tracker(PaneId::Left, left.clone());
    harness
        .transport
        .serve((10, 30), spans_payload((10, 30), &[("old", 0, 1)]));
    harness
        .transport
        .serve((40, 60), spans_payload((40, 60), &[("new", 0, 1)]));

    let first = harness.editor.begin_reload().expect("editor is live");
    left.scroll(30, 50);
    let second = harness.editor.begin_reload().expect("editor is live");
    let ctx = harness.editor.load_context();

    // Responses arrive out of order: the newer cycle settles first.
    let second = block_on(ctx.fetch(second));
    let first = block_on(ctx.fetch(first));
    let newest = harness.editor.finish_reload(second);
    let stale = harness.editor.finish_reload(first);

    assert!(newest.render_requested);
    assert!(stale.is_superseded());
    assert_eq!(stale.stale, 1);
    assert!(matches!(
        harness.editor.render_job_for(&stale),
        Err(RenderOutcome::Superseded)
    ));

    let view = harness.editor.store().view(PaneId::Left).expect("left pane loaded");
    assert_eq!(view.token, LoadToken::new(2));
    assert_eq!(ids(&view.annotations), vec!["#new"]);

    let job = harness.editor.render_job_for(&newest).ok().expect("newest cycle renders");
    assert_eq!(block_on(job.run()), RenderOutcome::Rendered { count: 1 });
}

#[test]
fn older_cycle_finishing_first_is_still_dropped() {
    let mut harness = loaded_harness();
    let first = harness.editor.begin_reload().expect("editor is live");
    let second = harness.editor.begin_reload().expect("editor is live");
    let ctx = harness.editor.load_context();

    let first = harness.editor.finish_reload(block_on(ctx.fetch(first)));
    assert_eq!(first.stale, 2);
    assert!(harness.editor.store().is_empty());

    let second = harness.editor.finish_reload(block_on(ctx.fetch(second)));
    assert_eq!(second.applied.len(), 2);
}

#[test]
fn timed_out_pane_keeps_previous_annotations() {
    let mut harness = loaded_harness();
    block_on(harness.editor.reload());
    let before = harness.editor.flattened();

    harness.transport.hang.set(true);
    let report = block_on(harness.editor.reload());
    let load = report.load.expect("editor is live");

    assert_eq!(
        load.failed,
        vec![
            PaneFailure {
                pane: PaneId::Left,
                error: TransportError::TimedOut { after_ms: 10_000 },
            },
            PaneFailure {
                pane: PaneId::Right,
                error: TransportError::TimedOut { after_ms: 10_000 },
            },
        ]
    );
    assert_eq!(report.render, RenderOutcome::Rendered { count: 5 });
    assert_eq!(harness.editor.flattened(), before);
}

#[test]
fn failing_pane_does_not_block_the_other() {
    let mut harness = Harness::new().with_panes((0, 20), (5, 25));
    harness
        .transport
        .serve(LEFT_WINDOW, spans_payload(LEFT_WINDOW, &[("a", 0, 1)]));
    let report = block_on(harness.editor.reload());
    let load = report.load.expect("editor is live");

    assert_eq!(load.applied.len(), 1);
    assert_eq!(load.failed.len(), 1);
    assert_eq!(load.failed[0].pane, PaneId::Right);
    assert!(matches!(load.failed[0].error, TransportError::Rejected(_)));
    assert_eq!(report.render, RenderOutcome::Rendered { count: 1 });
}

#[test]
#[traced_test]
fn render_is_skipped_when_widget_is_not_ready() {
    let mut harness = loaded_harness();
    harness.widget.ready.set(false);
    let report = block_on(harness.editor.reload());

    assert_eq!(report.render, RenderOutcome::WidgetNotReady);
    assert!(harness.widget.applied.borrow().is_empty());
    assert_eq!(harness.connectors.removed.get(), 0);
    assert!(logs_contain("annotation widget is not initialised"));
}

#[test]
fn widget_failure_is_reported() {
    let mut harness = loaded_harness();
    harness.widget.fail.set(true);
    let report = block_on(harness.editor.reload());
    assert!(matches!(report.render, RenderOutcome::Failed(_)));
}

#[test]
fn render_clears_connections_and_drag_state() {
    let mut harness = loaded_harness();
    harness.connectors.floating.set(true);
    block_on(harness.editor.reload());

    assert_eq!(harness.connectors.removed.get(), 1);
    // Once before the apply call and once from the post-render hook.
    assert_eq!(harness.connectors.left.get(), 2);
    assert_eq!(harness.connectors.cancelled.get(), 1);
}

#[test]
fn style_patch_runs_after_render() {
    let mut harness = loaded_harness();
    let rendered = harness.dom.append_element(harness.left, &["r6o-annotation"]);
    harness.dom.set_attribute(rendered, ID_ATTRIBUTE, "#b");
    block_on(harness.editor.reload());

    assert_eq!(
        harness.dom.style(rendered, "background-color").as_deref(),
        Some("rgba(0, 0, 0, 0.2)")
    );
    assert!(harness.dom.classes(rendered).contains(&"i7n-highlighted".to_owned()));
}

struct CountingHook(Rc<Cell<usize>>);

impl PostRenderHook<HeadlessDom> for CountingHook {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn after_render(&self, _cx: &RenderContext<'_, HeadlessDom>, annotations: &[WebAnnotation]) {
        self.0.set(self.0.get() + annotations.len());
    }
}

#[test]
fn registered_hooks_observe_each_render() {
    let mut harness = loaded_harness();
    let seen = Rc::new(Cell::new(0));
    harness
        .editor
        .add_post_render_hook(Box::new(CountingHook(Rc::clone(&seen))));
    block_on(harness.editor.reload());
    block_on(harness.editor.render());
    assert_eq!(seen.get(), 10);
}

#[test]
fn custom_class_prefix_reaches_the_widget() {
    let config = EditorConfig {
        class_prefix: String::new(),
        ..EditorConfig::default()
    };
    let mut harness = Harness::with_config(config).with_panes((0, 20), (5, 25));
    harness
        .transport
        .serve(LEFT_WINDOW, spans_payload(LEFT_WINDOW, &[("a", 0, 1)]));
    block_on(harness.editor.reload());
    let applied = harness.widget.applied.borrow();
    assert_eq!(applied[0][0].body.classes, vec!["highlighted".to_owned()]);
}

#[test]
fn scroll_to_targets_the_containing_element() {
    let harness = Harness::new();
    assert!(harness.editor.scroll_to(75));
    assert!(harness.editor.scroll_to(130));
    assert!(!harness.editor.scroll_to(131));
    assert_eq!(harness.dom.scrolled_into_view(), vec![harness.right, harness.right]);
}

#[test]
fn destroy_tears_down_and_disables_the_editor() {
    let mut harness = loaded_harness();
    block_on(harness.editor.reload());
    harness.editor.destroy();

    assert!(harness.connectors.destroyed.get());
    assert!(harness.widget.destroyed.get());
    assert!(harness.editor.store().is_empty());
    assert!(harness.editor.is_destroyed());

    let report = block_on(harness.editor.reload());
    assert_eq!(report.load, None);
    assert_eq!(report.render, RenderOutcome::Destroyed);
    assert!(!harness.editor.scroll_to(20));
}
