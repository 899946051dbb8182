use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One raw or transformed record - a mapping from column name to value.
///
/// Column order is meaningful (the sink contract is an exact ordered column
/// list), which is why the crate enables serde_json's `preserve_order`.
pub type Row = Map<String, Value>;

/// One batch of records as returned by a single paginated fetch call.
pub type Page = Vec<Row>;

/// Structured input that starts one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrigger {
    /// Group whose members/events/RSVPs/attendance are synced.
    pub group_id: String,

    /// When set, overrides [`PipelineConfig::force_rsvps`] for this run.
    #[serde(default)]
    pub force_rsvps: Option<bool>,
}

impl RunTrigger {
    pub fn new(group_id: impl Into<String>) -> Self {
        RunTrigger {
            group_id: group_id.into(),
            force_rsvps: None,
        }
    }

    pub fn with_force_rsvps(mut self, force: bool) -> Self {
        self.force_rsvps = Some(force);
        self
    }
}

/// Run-level configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target dataset name passed to the sink on every write.
    pub dataset_id: String,

    /// Events that started within the last N hours cascade into
    /// RSVP/attendance fetches.
    pub recency_window_hours: i64,

    /// Default for the cascade-filter override when the trigger carries none.
    pub force_rsvps: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            dataset_id: String::from("turnout_raw"),
            recency_window_hours: 24,
            force_rsvps: false,
        }
    }
}

/// Row counts emitted during one run, per target table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub members: usize,
    pub events: usize,
    pub rsvps: usize,
    pub attendances: usize,

    /// Event ids that passed the cascade filter.
    pub cascaded_events: usize,
}
