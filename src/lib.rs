//! # Turnout - group-event API extraction to warehouse tables
//!
//! Extracts paginated records from a group-oriented social/event API
//! (members, events, RSVPs, attendance), reshapes each record type into a
//! fixed warehouse schema, and streams the results page by page into an
//! analytical table sink.
//!
//! ## Modules
//!
//! - **project**: total field-projection utilities (nested extraction,
//!   timestamp decoding, derived columns, null normalization)
//! - **transform**: the four per-resource-type transformers
//! - **pipeline**: the phase orchestrator and RSVP cascade filter
//! - **source**: the paginated fetch collaborator (`PageSource`)
//! - **sink**: the warehouse write collaborator (`TableSink`)
//!
//! ## Quick Start
//!
//! ### Transforming a page
//!
//! ```rust
//! use chrono::Utc;
//! use serde_json::json;
//! use turnout::transform::transform_events;
//!
//! let raw = vec![
//!     serde_json::from_value(json!({"id": "e1", "duration": 60000})).unwrap(),
//! ];
//!
//! let rows = transform_events(&raw, Utc::now());
//! assert_eq!(rows[0]["duration"], json!(60));
//! ```
//!
//! ### Running a full sync
//!
//! ```rust,no_run
//! use turnout::{
//!     sync, HttpPageSource, JsonlSink, PipelineConfig, RunTrigger, StaticToken,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = HttpPageSource::new(
//!     "https://api.example.com",
//!     StaticToken(String::from("token")),
//! );
//! let sink = JsonlSink::new("./warehouse")?;
//!
//! let summary = sync(source, sink, PipelineConfig::default(), &RunTrigger::new("rust-nyc"))?;
//! println!("{} members, {} events", summary.members, summary.events);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;

pub mod pipeline;
pub mod project;
pub mod sink;
pub mod source;
pub mod transform;
pub mod types;

// Re-export commonly used types for convenience
pub use pipeline::{cascade_event_ids, CascadeTarget, Pipeline};
pub use sink::{JsonlSink, MemorySink, TableSink};
pub use source::{
    FetchError, HttpPageSource, PageSource, PageStream, ScanRequest, StaticToken, TokenProvider,
};
pub use types::{Page, PipelineConfig, Row, RunSummary, RunTrigger};

/// Main entry point: run all three phases for one group.
pub fn sync<S: PageSource, K: TableSink>(
    source: S,
    sink: K,
    config: PipelineConfig,
    trigger: &RunTrigger,
) -> Result<RunSummary> {
    Pipeline::new(source, sink, config).run(trigger)
}
