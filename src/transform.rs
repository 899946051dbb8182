//! Per-resource-type record transformers.
//!
//! Each transformer is a deterministic pipeline stage: raw page in, projected
//! rows out. The steps run in a fixed order -- nested lifts, timestamp casts,
//! derived columns, composites -- then `requested_at` (run constant, passed
//! in) and `inserted_at` (captured once per call) are stamped, missing values
//! are normalized, and the row is projected down to the exact column list for
//! its target table. Raw pages are borrowed, never mutated.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::project::{
    add_column, cast_to_datetime, compose_location, lift_nested, normalize_missing,
    project_columns, timestamp_value, ColumnValue,
};
use crate::types::{Page, Row};

/// Target schema for the `members` table.
pub const MEMBER_COLUMNS: &[&str] = &[
    "id",
    "created_at",
    "joined_at",
    "updated_at",
    "visited_at",
    "role",
    "location",
    "requested_at",
    "inserted_at",
];

/// Target schema for the `events` table.
pub const EVENT_COLUMNS: &[&str] = &[
    "id",
    "name",
    "group_id",
    "started_at",
    "duration",
    "rsvp_limit",
    "status",
    "yes_rsvp_count",
    "waitlist_count",
    "venue",
    "is_online_event",
    "visibility",
    "pro_is_email_shared",
    "member_pay_fee",
    "created_at",
    "updated_at",
    "requested_at",
    "inserted_at",
];

/// Target schema for the `rsvps` table.
pub const RSVP_COLUMNS: &[&str] = &[
    "member_id",
    "event_id",
    "group_id",
    "response",
    "guests",
    "created_at",
    "updated_at",
    "requested_at",
    "inserted_at",
];

/// Target schema for the `attendances` table.
pub const ATTENDANCE_COLUMNS: &[&str] = &[
    "id",
    "member_id",
    "event_id",
    "group_id",
    "status",
    "guests",
    "updated_at",
    "requested_at",
    "inserted_at",
];

/// Finish a page: stamp the batch markers, normalize missing values, project.
fn finish(
    mut rows: Page,
    columns: &[&str],
    requested_at: DateTime<Utc>,
    inserted_at: DateTime<Utc>,
) -> Page {
    add_column(
        &mut rows,
        "requested_at",
        ColumnValue::Literal(timestamp_value(requested_at)),
    );
    add_column(
        &mut rows,
        "inserted_at",
        ColumnValue::Literal(timestamp_value(inserted_at)),
    );
    rows.into_iter()
        .map(|mut row| {
            // project_columns also null-fills listed columns; the explicit
            // pass here is the documented missing-value step, running after
            // every derived column has been computed.
            normalize_missing(&mut row, columns);
            project_columns(row, columns)
        })
        .collect()
}

/// Transform a page of raw member records into `members` rows.
///
/// Join/visit/update timestamps live under the nested `group_profile` object;
/// `created_at` comes from the flat `joined` epoch field; `location` is
/// composed from the flat `country`/`city`/`lon`/`lat` fields.
pub fn transform_members(page: &[Row], requested_at: DateTime<Utc>) -> Page {
    let inserted_at = Utc::now();
    let mut rows: Page = page.to_vec();
    for row in rows.iter_mut() {
        lift_nested(row, &["group_profile", "created"], "joined_at");
        lift_nested(row, &["group_profile", "visited"], "visited_at");
        lift_nested(row, &["group_profile", "updated"], "updated_at");
        lift_nested(row, &["group_profile", "role"], "role");
        cast_to_datetime(row, "joined_at", None);
        cast_to_datetime(row, "visited_at", None);
        cast_to_datetime(row, "updated_at", None);
        cast_to_datetime(row, "joined", Some("created_at"));
        compose_location(row, "country", "city", "lon", "lat", "location");
    }
    finish(rows, MEMBER_COLUMNS, requested_at, inserted_at)
}

/// Transform a page of raw event records into `events` rows.
///
/// `duration` arrives in milliseconds and is rescaled to seconds; `venue` is
/// rebuilt as `{name, location}` from the nested venue fields.
pub fn transform_events(page: &[Row], requested_at: DateTime<Utc>) -> Page {
    let inserted_at = Utc::now();
    let mut rows: Page = page.to_vec();
    for row in rows.iter_mut() {
        cast_to_datetime(row, "created", Some("created_at"));
        cast_to_datetime(row, "time", Some("started_at"));
        cast_to_datetime(row, "updated", Some("updated_at"));
        lift_nested(row, &["group", "id"], "group_id");
        lift_nested(row, &["venue", "country"], "country");
        lift_nested(row, &["venue", "city"], "city");
        lift_nested(row, &["venue", "lon"], "lon");
        lift_nested(row, &["venue", "lat"], "lat");
        lift_nested(row, &["venue", "name"], "venue_name");
        compose_location(row, "country", "city", "lon", "lat", "location");
        let venue = json!({
            "name": row.get("venue_name").cloned().unwrap_or(Value::Null),
            "location": row.get("location").cloned().unwrap_or(Value::Null),
        });
        row.insert("venue".to_string(), venue);
    }
    add_column(&mut rows, "duration", ColumnValue::Computed(&duration_seconds));
    finish(rows, EVENT_COLUMNS, requested_at, inserted_at)
}

/// Transform a page of raw RSVP records into `rsvps` rows.
///
/// Identity fields come from the record's own nested `member`/`event`/`group`
/// objects, in contrast to attendance where the orchestrator injects them.
pub fn transform_rsvps(page: &[Row], requested_at: DateTime<Utc>) -> Page {
    let inserted_at = Utc::now();
    let mut rows: Page = page.to_vec();
    for row in rows.iter_mut() {
        lift_nested(row, &["member", "id"], "member_id");
        lift_nested(row, &["event", "id"], "event_id");
        lift_nested(row, &["group", "id"], "group_id");
        cast_to_datetime(row, "updated", Some("updated_at"));
        cast_to_datetime(row, "created", Some("created_at"));
    }
    finish(rows, RSVP_COLUMNS, requested_at, inserted_at)
}

/// Transform a page of raw attendance records into `attendances` rows.
///
/// The attendance payload carries no event/group nesting, so `event_id` and
/// `group_id` identify the event currently being scanned and are supplied by
/// the caller. The source `attendance_id` is renamed to `id`.
pub fn transform_attendances(
    page: &[Row],
    group_id: &Value,
    event_id: &Value,
    requested_at: DateTime<Utc>,
) -> Page {
    let inserted_at = Utc::now();
    let mut rows: Page = page.to_vec();
    for row in rows.iter_mut() {
        lift_nested(row, &["member", "id"], "member_id");
        cast_to_datetime(row, "updated", Some("updated_at"));
        row.insert("event_id".to_string(), event_id.clone());
        row.insert("group_id".to_string(), group_id.clone());
        let id = row.remove("attendance_id").unwrap_or(Value::Null);
        row.insert("id".to_string(), id);
    }
    finish(rows, ATTENDANCE_COLUMNS, requested_at, inserted_at)
}

/// Rescale a millisecond duration to seconds.
///
/// Integer result when evenly divisible, fractional otherwise; missing or
/// non-numeric input stays absent.
fn duration_seconds(row: &Row) -> Value {
    match row.get("duration") {
        Some(Value::Number(n)) => {
            if let Some(ms) = n.as_i64() {
                if ms % 1000 == 0 {
                    json!(ms / 1000)
                } else {
                    json!(ms as f64 / 1000.0)
                }
            } else {
                match n.as_f64().filter(|f| f.is_finite()) {
                    Some(ms) => json!(ms / 1000.0),
                    None => Value::Null,
                }
            }
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(value: Value) -> Page {
        serde_json::from_value(value).unwrap()
    }

    fn columns(row: &Row) -> Vec<&str> {
        row.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_member_transform() {
        let raw = page(json!([{
            "id": 1,
            "joined": 1600000000000i64,
            "group_profile": {
                "created": 1600000000000i64,
                "visited": 1600086400000i64,
                "updated": 1600172800000i64,
                "role": "organizer"
            },
            "country": "US",
            "city": "NYC",
            "lon": -74.0,
            "lat": 40.7
        }]));

        let rows = transform_members(&raw, Utc::now());
        assert_eq!(rows.len(), 1);
        assert_eq!(columns(&rows[0]), MEMBER_COLUMNS);
        assert_eq!(rows[0]["role"], json!("organizer"));
        assert_eq!(rows[0]["created_at"], json!("2020-09-13T12:26:40+00:00"));
        assert_eq!(rows[0]["joined_at"], json!("2020-09-13T12:26:40+00:00"));
        assert_eq!(
            rows[0]["location"],
            json!({"country": "US", "city": "NYC", "geo": {"lon": -74.0, "lat": 40.7}})
        );
    }

    #[test]
    fn test_member_missing_profile_keeps_shape() {
        let raw = page(json!([{"id": 2}]));
        let rows = transform_members(&raw, Utc::now());

        assert_eq!(columns(&rows[0]), MEMBER_COLUMNS);
        assert_eq!(rows[0]["joined_at"], Value::Null);
        assert_eq!(rows[0]["role"], Value::Null);
        assert_eq!(
            rows[0]["location"],
            json!({"country": null, "city": null, "geo": {"lon": null, "lat": null}})
        );
    }

    #[test]
    fn test_event_duration_millis_to_seconds() {
        let raw = page(json!([{"id": "e1", "duration": 60000}]));
        let rows = transform_events(&raw, Utc::now());
        assert_eq!(rows[0]["duration"], json!(60));
    }

    #[test]
    fn test_event_duration_fractional_and_missing() {
        let raw = page(json!([
            {"id": "e1", "duration": 90500},
            {"id": "e2"}
        ]));
        let rows = transform_events(&raw, Utc::now());
        assert_eq!(rows[0]["duration"], json!(90.5));
        assert_eq!(rows[1]["duration"], Value::Null);
    }

    #[test]
    fn test_event_venue_composite() {
        let raw = page(json!([{
            "id": "e1",
            "name": "Rust Meetup",
            "time": 1600000000000i64,
            "group": {"id": 99},
            "venue": {
                "name": "The Loft",
                "country": "US",
                "city": "NYC",
                "lon": -74.0,
                "lat": 40.7
            }
        }]));

        let rows = transform_events(&raw, Utc::now());
        assert_eq!(columns(&rows[0]), EVENT_COLUMNS);
        assert_eq!(rows[0]["group_id"], json!(99));
        assert_eq!(rows[0]["started_at"], json!("2020-09-13T12:26:40+00:00"));
        assert_eq!(
            rows[0]["venue"],
            json!({
                "name": "The Loft",
                "location": {
                    "country": "US",
                    "city": "NYC",
                    "geo": {"lon": -74.0, "lat": 40.7}
                }
            })
        );
    }

    #[test]
    fn test_rsvp_ids_derived_from_nested_fields() {
        let raw = page(json!([{
            "member": {"id": 5},
            "event": {"id": "e1"},
            "group": {"id": 99},
            "response": "yes",
            "guests": 2,
            "created": 1600000000000i64,
            "updated": 1600086400000i64
        }]));

        let rows = transform_rsvps(&raw, Utc::now());
        assert_eq!(columns(&rows[0]), RSVP_COLUMNS);
        assert_eq!(rows[0]["member_id"], json!(5));
        assert_eq!(rows[0]["event_id"], json!("e1"));
        assert_eq!(rows[0]["group_id"], json!(99));
        assert_eq!(rows[0]["response"], json!("yes"));
    }

    #[test]
    fn test_attendance_rename_and_injected_context() {
        let raw = page(json!([{
            "attendance_id": 42,
            "member": {"id": 5},
            "status": "attended",
            "guests": 0,
            "updated": 1600000000000i64
        }]));

        let rows =
            transform_attendances(&raw, &json!("g1"), &json!("e1"), Utc::now());
        assert_eq!(columns(&rows[0]), ATTENDANCE_COLUMNS);
        assert_eq!(rows[0]["id"], json!(42));
        assert!(!rows[0].contains_key("attendance_id"));
        assert_eq!(rows[0]["event_id"], json!("e1"));
        assert_eq!(rows[0]["group_id"], json!("g1"));
        assert_eq!(rows[0]["member_id"], json!(5));
    }

    #[test]
    fn test_column_exactness_under_fuzzed_fields() {
        // Extra fields dropped, missing fields filled - for every transformer.
        let noisy = page(json!([
            {"id": 1, "unexpected": {"deep": [1, 2]}, "stray": true},
            {}
        ]));
        let requested_at = Utc::now();

        for rows in [
            transform_members(&noisy, requested_at),
            transform_events(&noisy, requested_at),
            transform_rsvps(&noisy, requested_at),
            transform_attendances(&noisy, &json!("g"), &json!("e"), requested_at),
        ] {
            assert_eq!(rows.len(), 2);
        }

        for row in transform_members(&noisy, requested_at) {
            assert_eq!(columns(&row), MEMBER_COLUMNS);
        }
        for row in transform_events(&noisy, requested_at) {
            assert_eq!(columns(&row), EVENT_COLUMNS);
        }
        for row in transform_rsvps(&noisy, requested_at) {
            assert_eq!(columns(&row), RSVP_COLUMNS);
        }
        for row in transform_attendances(&noisy, &json!("g"), &json!("e"), requested_at) {
            assert_eq!(columns(&row), ATTENDANCE_COLUMNS);
        }
    }

    #[test]
    fn test_transform_is_idempotent_except_inserted_at() {
        let raw = page(json!([{
            "id": 1,
            "joined": 1600000000000i64,
            "group_profile": {"created": 1600000000000i64, "role": "member"}
        }]));
        let requested_at = Utc::now();

        let first = transform_members(&raw, requested_at);
        let second = transform_members(&raw, requested_at);

        let take_inserted_at = |row: &Row| {
            let mut row = row.clone();
            let inserted_at = row.remove("inserted_at").unwrap();
            (row, inserted_at)
        };
        let (row_a, inserted_a) = take_inserted_at(&first[0]);
        let (row_b, inserted_b) = take_inserted_at(&second[0]);
        assert_eq!(row_a, row_b);

        let parse = |v: &Value| {
            chrono::DateTime::parse_from_rfc3339(v.as_str().unwrap()).unwrap()
        };
        assert!(parse(&inserted_b) >= parse(&inserted_a));
    }

    #[test]
    fn test_raw_page_is_not_mutated() {
        let raw = page(json!([{"id": 1, "duration": 60000}]));
        let before = raw.clone();
        let _ = transform_events(&raw, Utc::now());
        assert_eq!(raw, before);
    }
}
