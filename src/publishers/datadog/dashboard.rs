//! Dashboard layout: series naming, widget construction, and the widget diff.
//!
//! A managed dashboard holds two summary widgets fed by the summary series, and one timeseries
//! widget per metric fed by the metric's detailed series. Widgets that are not managed are left
//! untouched.

use serde_json::{Value, json};
use std::collections::BTreeSet;
use strum::{Display, EnumString};

pub const TOP_OFFENDERS_TITLE: &str = "Top offenders";
pub const CHANGE_TITLE: &str = "Change vs previous day";

const GRID_COLUMNS: usize = 3;
const GRID_TOP: usize = 30;
const GRID_COLUMN_WIDTH: usize = 37;
const GRID_ROW_HEIGHT: usize = 17;
const WIDGET_WIDTH: usize = 35;
const WIDGET_HEIGHT: usize = 13;

/// The two dashboard flavors a binding can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DashboardType {
    /// Widgets flow in order, no explicit positions
    Timeboard,

    /// Widgets are placed on a free grid
    Screenboard,
}

impl DashboardType {
    #[must_use]
    pub const fn layout_type(self) -> &'static str {
        match self {
            Self::Timeboard => "ordered",
            Self::Screenboard => "free",
        }
    }
}

/// Name of the series shared by every metric of a dashboard, tagged with `test_name`.
pub fn summary_series(prefix: &str, dashboard: &str) -> String {
    format!("{prefix}.{}", dashboard.trim().replace(' ', "_"))
}

/// Name of the series holding the values of one metric.
pub fn detail_series(prefix: &str, dashboard: &str, metric: &str) -> String {
    format!("{}.{metric}", summary_series(prefix, dashboard))
}

/// The widgets a dashboard should end up with, and how that differs from what it has.
#[derive(Debug)]
pub struct WidgetPlan {
    pub widgets: Vec<Value>,
    pub added: usize,
    pub removed: usize,
}

impl WidgetPlan {
    pub const fn is_unchanged(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Diffs the existing widgets of a dashboard against the metrics that should be shown.
///
/// Unmanaged widgets are kept as they are. Managed metric widgets for metrics no longer present
/// are dropped, missing ones are appended in the order of `metrics`.
pub fn plan_widgets(existing: &[Value], summary: &str, metrics: &[&str], free_layout: bool) -> WidgetPlan {
    let query_prefix = format!("avg:{summary}.");
    let wanted: BTreeSet<&str> = metrics.iter().copied().collect();

    let mut widgets = Vec::with_capacity(existing.len() + metrics.len() + 2);
    let mut shown = BTreeSet::new();
    let mut removed = 0;
    let mut has_top_offenders = false;
    let mut has_change = false;

    for widget in existing {
        if let Some(metric) = managed_metric(widget, &query_prefix) {
            if wanted.contains(metric) && shown.insert(metric.to_string()) {
                widgets.push(widget.clone());
            } else {
                removed += 1;
            }
            continue;
        }

        match widget_title(widget) {
            Some(TOP_OFFENDERS_TITLE) => has_top_offenders = true,
            Some(CHANGE_TITLE) => has_change = true,
            _ => {}
        }

        widgets.push(widget.clone());
    }

    let mut added = 0;

    if !has_top_offenders {
        widgets.push(top_offenders_widget(summary, free_layout));
        added += 1;
    }

    if !has_change {
        widgets.push(change_widget(summary, free_layout));
        added += 1;
    }

    let mut occupied: BTreeSet<(usize, usize)> = widgets.iter().filter_map(layout_origin).collect();

    for metric in metrics {
        if shown.insert((*metric).to_string()) {
            let slot = free_layout.then(|| claim_free_slot(&mut occupied));
            widgets.push(metric_widget(&format!("{summary}.{metric}"), metric, slot));
            added += 1;
        }
    }

    WidgetPlan { widgets, added, removed }
}

/// Top-left corner of the grid cell with the given index.
const fn grid_slot(index: usize) -> (usize, usize) {
    (1 + GRID_COLUMN_WIDTH * (index % GRID_COLUMNS), GRID_TOP + GRID_ROW_HEIGHT * (index / GRID_COLUMNS))
}

/// Takes the first grid cell no widget starts in.
fn claim_free_slot(occupied: &mut BTreeSet<(usize, usize)>) -> usize {
    let index = (0..).find(|i| !occupied.contains(&grid_slot(*i))).unwrap_or_default();
    let _ = occupied.insert(grid_slot(index));
    index
}

fn layout_origin(widget: &Value) -> Option<(usize, usize)> {
    let layout = widget.get("layout")?;
    let x = usize::try_from(layout.get("x")?.as_u64()?).ok()?;
    let y = usize::try_from(layout.get("y")?.as_u64()?).ok()?;
    Some((x, y))
}

fn widget_title(widget: &Value) -> Option<&str> {
    widget.pointer("/definition/title").and_then(Value::as_str)
}

fn widget_query(widget: &Value) -> Option<&str> {
    widget.pointer("/definition/requests/0/q").and_then(Value::as_str)
}

/// The metric shown by a managed timeseries widget, if the widget is one.
fn managed_metric<'a>(widget: &'a Value, query_prefix: &str) -> Option<&'a str> {
    if widget.pointer("/definition/type").and_then(Value::as_str) != Some("timeseries") {
        return None;
    }

    let rest = widget_query(widget)?.strip_prefix(query_prefix)?;
    let metric = rest.split('{').next()?;
    (!metric.is_empty()).then_some(metric)
}

fn metric_widget(series: &str, title: &str, grid_position: Option<usize>) -> Value {
    let mut widget = json!({
        "definition": {
            "type": "timeseries",
            "title": title,
            "show_legend": false,
            "requests": [{ "q": format!("avg:{series}{{*}}"), "display_type": "line" }],
        }
    });

    if let Some(index) = grid_position {
        let (x, y) = grid_slot(index);
        widget["layout"] = json!({
            "x": x,
            "y": y,
            "width": WIDGET_WIDTH,
            "height": WIDGET_HEIGHT,
        });
    }

    widget
}

fn top_offenders_widget(summary: &str, free_layout: bool) -> Value {
    let mut widget = json!({
        "definition": {
            "type": "toplist",
            "title": TOP_OFFENDERS_TITLE,
            "requests": [{ "q": format!("top(avg:{summary}{{*}} by {{test_name}}, 10, 'last', 'desc')") }],
        }
    });

    if free_layout {
        widget["layout"] = json!({ "x": 1, "y": 0, "width": 54, "height": 28 });
    }

    widget
}

fn change_widget(summary: &str, free_layout: bool) -> Value {
    let mut widget = json!({
        "definition": {
            "type": "change",
            "title": CHANGE_TITLE,
            "requests": [{
                "q": format!("avg:{summary}{{*}} by {{test_name}}"),
                "compare_to": "day_before",
                "change_type": "absolute",
                "order_by": "change",
                "order_dir": "desc",
                "increase_good": false,
            }],
        }
    });

    if free_layout {
        widget["layout"] = json!({ "x": 57, "y": 0, "width": 54, "height": 28 });
    }

    widget
}
