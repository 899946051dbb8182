//! Pipeline orchestrator.
//!
//! Drives one run over a group: members first, then events (accumulating the
//! cascade-eligible event ids in discovery order), then RSVPs and attendance
//! per eligible event. Every page is transformed and forwarded to the sink
//! as soon as it is produced - nothing is buffered across phases except the
//! event-id working set, so total record volume is unbounded while working
//! memory stays one page deep.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::sink::TableSink;
use crate::source::{PageSource, ScanRequest};
use crate::transform::{
    transform_attendances, transform_events, transform_members, transform_rsvps,
};
use crate::types::{PipelineConfig, Row, RunSummary, RunTrigger};

/// One extraction-transform-load run, wired to its two collaborators.
pub struct Pipeline<S: PageSource, K: TableSink> {
    source: S,
    sink: K,
    config: PipelineConfig,
}

impl<S: PageSource, K: TableSink> Pipeline<S, K> {
    pub fn new(source: S, sink: K, config: PipelineConfig) -> Self {
        Pipeline {
            source,
            sink,
            config,
        }
    }

    /// Run all three phases for one group.
    ///
    /// Any fetch or sink error aborts the run immediately; pages already
    /// emitted stay emitted (append-only sink semantics are assumed).
    pub fn run(&mut self, trigger: &RunTrigger) -> Result<RunSummary> {
        let Pipeline {
            source,
            sink,
            config,
        } = self;

        // Captured once, before any fetch: every row of this run carries it.
        let requested_at = Utc::now();
        let force = trigger.force_rsvps.unwrap_or(config.force_rsvps);
        let window = Duration::hours(config.recency_window_hours);
        let dataset = config.dataset_id.as_str();
        let group_id = trigger.group_id.as_str();
        let group_value = Value::String(group_id.to_string());
        let mut summary = RunSummary::default();

        info!(group_id, "processing members");
        for page in source.scan(&ScanRequest::members(group_id))? {
            let page = page.context("member page fetch failed")?;
            let rows = transform_members(&page, requested_at);
            debug!(rows = rows.len(), "writing members page");
            sink.write_page(dataset, "members", &rows)
                .context("member page write failed")?;
            summary.members += rows.len();
        }

        info!(group_id, "processing events");
        let mut event_ids: Vec<CascadeTarget> = Vec::new();
        for page in source.scan(&ScanRequest::events(group_id))? {
            let page = page.context("event page fetch failed")?;
            let rows = transform_events(&page, requested_at);
            event_ids.extend(cascade_event_ids(&rows, Utc::now(), window, force));
            debug!(rows = rows.len(), "writing events page");
            sink.write_page(dataset, "events", &rows)
                .context("event page write failed")?;
            summary.events += rows.len();
        }
        summary.cascaded_events = event_ids.len();

        info!(
            group_id,
            events = event_ids.len(),
            "processing rsvps and attendances"
        );
        for target in &event_ids {
            let segment = target.segment.as_str();
            debug!(event_id = %segment, "processing event");

            for page in source.scan(&ScanRequest::rsvps(group_id, segment))? {
                let page = page
                    .with_context(|| format!("rsvp page fetch failed for event {segment}"))?;
                let rows = transform_rsvps(&page, requested_at);
                sink.write_page(dataset, "rsvps", &rows)
                    .with_context(|| format!("rsvp page write failed for event {segment}"))?;
                summary.rsvps += rows.len();
            }

            for page in source.scan(&ScanRequest::attendances(group_id, segment))? {
                let page = page.with_context(|| {
                    format!("attendance page fetch failed for event {segment}")
                })?;
                let rows = transform_attendances(&page, &group_value, &target.id, requested_at);
                sink.write_page(dataset, "attendances", &rows)
                    .with_context(|| {
                        format!("attendance page write failed for event {segment}")
                    })?;
                summary.attendances += rows.len();
            }
        }

        info!(
            members = summary.members,
            events = summary.events,
            rsvps = summary.rsvps,
            attendances = summary.attendances,
            "run complete"
        );
        Ok(summary)
    }

    /// Release the sink, e.g. to flush or inspect it after a run.
    pub fn into_sink(self) -> K {
        self.sink
    }
}

/// An event selected for follow-on RSVP/attendance fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeTarget {
    /// Id rendered as a URL path segment.
    pub segment: String,

    /// Original id value, stamped into attendance rows untouched.
    pub id: Value,
}

/// Select the events from a transformed events page that cascade into
/// RSVP/attendance fetches.
///
/// An event is eligible when it started after `now - window`, or
/// unconditionally when `force` is set. Rows without an addressable id never
/// cascade; this is the only place that rule lives. Discovery order is
/// preserved.
pub fn cascade_event_ids(
    events: &[Row],
    now: DateTime<Utc>,
    window: Duration,
    force: bool,
) -> Vec<CascadeTarget> {
    let cutoff = now - window;
    events
        .iter()
        .filter_map(|row| {
            let id = row.get("id").filter(|v| !v.is_null())?;
            let segment = id_segment(id)?;
            let target = CascadeTarget {
                segment,
                id: id.clone(),
            };
            if force {
                return Some(target);
            }
            let started_at = row.get("started_at")?.as_str()?;
            let started_at = DateTime::parse_from_rfc3339(started_at).ok()?;
            (started_at.with_timezone(&Utc) > cutoff).then_some(target)
        })
        .collect()
}

/// Render an id value as a URL path segment. String and numeric ids only.
fn id_segment(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
