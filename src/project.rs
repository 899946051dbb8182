//! Field projection utilities shared by all record transformers.
//!
//! Every function here is total: a missing or malformed input degrades to a
//! JSON null in the output row, never an error. The internal missing sentinel
//! is an absent key (or an explicit source `null`); `normalize_missing` and
//! `project_columns` collapse both into the single canonical representation
//! the sink sees.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::types::{Page, Row};

/// Walk a key path through nested objects.
///
/// Returns `None` as soon as any intermediate key is missing or a non-object
/// is reached. An explicit JSON `null` leaf counts as absent.
pub fn nested_get<'a>(row: &'a Row, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = row.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Materialize a nested value under a flat column name, null when absent.
pub fn lift_nested(row: &mut Row, path: &[&str], new_col: &str) {
    let value = nested_get(row, path).cloned().unwrap_or(Value::Null);
    row.insert(new_col.to_string(), value);
}

/// Decode an epoch-millisecond number into an absolute timestamp.
///
/// Non-numeric and non-finite inputs yield `None`.
pub fn epoch_millis(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        Value::Number(n) => {
            if let Some(ms) = n.as_i64() {
                Some(ms)
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
            }
        }
        _ => None,
    }?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Render a timestamp the way output rows carry it.
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339())
}

/// Replace an epoch-millisecond column with an RFC 3339 timestamp.
///
/// When `new_col` is given the source column is left in place and the
/// converted value lands under the new name. Absent or non-numeric sources
/// convert to null.
pub fn cast_to_datetime(row: &mut Row, col: &str, new_col: Option<&str>) {
    let target = new_col.unwrap_or(col);
    let converted = row
        .get(col)
        .and_then(epoch_millis)
        .map(timestamp_value)
        .unwrap_or(Value::Null);
    row.insert(target.to_string(), converted);
}

/// Build the fixed `{country, city, geo: {lon, lat}}` composite from four
/// flat source columns.
///
/// Missing inputs appear as nulls inside the composite; construction itself
/// never fails.
pub fn compose_location(
    row: &mut Row,
    country_col: &str,
    city_col: &str,
    lon_col: &str,
    lat_col: &str,
    new_col: &str,
) {
    let field = |col: &str| row.get(col).cloned().unwrap_or(Value::Null);
    let location = json!({
        "country": field(country_col),
        "city": field(city_col),
        "geo": {
            "lon": field(lon_col),
            "lat": field(lat_col),
        },
    });
    row.insert(new_col.to_string(), location);
}

/// How a derived column gets its value.
pub enum ColumnValue<'a> {
    /// The same literal value on every row.
    Literal(Value),
    /// A pure function of the row.
    Computed(&'a dyn Fn(&Row) -> Value),
}

/// Add (or overwrite) a column across a page.
///
/// Literal and computed forms go through the same entry point so call sites
/// never special-case between them.
pub fn add_column(page: &mut Page, new_col: &str, value: ColumnValue<'_>) {
    for row in page.iter_mut() {
        let v = match &value {
            ColumnValue::Literal(v) => v.clone(),
            ColumnValue::Computed(f) => f(row),
        };
        row.insert(new_col.to_string(), v);
    }
}

/// Ensure every listed column exists, filling absences with null.
///
/// Runs after all derived columns are computed, so derivations still see the
/// original missing markers.
pub fn normalize_missing(row: &mut Row, columns: &[&str]) {
    for &col in columns {
        row.entry(col).or_insert(Value::Null);
    }
}

/// Restrict a row to an exact ordered column list.
///
/// Extra source columns are dropped; listed columns that are still absent
/// come out as null.
pub fn project_columns(mut row: Row, columns: &[&str]) -> Row {
    let mut out = Row::new();
    for &col in columns {
        out.insert(col.to_string(), row.remove(col).unwrap_or(Value::Null));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_nested_get_walks_path() {
        let r = row(json!({"group_profile": {"created": 1700000000000i64}}));
        assert_eq!(
            nested_get(&r, &["group_profile", "created"]),
            Some(&json!(1700000000000i64))
        );
    }

    #[test]
    fn test_nested_get_missing_path_is_absent() {
        let r = row(json!({"group_profile": {"created": 1}}));
        assert_eq!(nested_get(&r, &["group_profile", "visited"]), None);
        assert_eq!(nested_get(&r, &["venue", "city"]), None);
        // Walking through a scalar is absent, not an error
        assert_eq!(nested_get(&r, &["group_profile", "created", "deep"]), None);
    }

    #[test]
    fn test_nested_get_null_leaf_is_absent() {
        let r = row(json!({"group": {"id": null}}));
        assert_eq!(nested_get(&r, &["group", "id"]), None);
    }

    #[test]
    fn test_lift_nested_fills_null() {
        let mut r = row(json!({"member": {"id": 7}}));
        lift_nested(&mut r, &["member", "id"], "member_id");
        lift_nested(&mut r, &["event", "id"], "event_id");
        assert_eq!(r["member_id"], json!(7));
        assert_eq!(r["event_id"], Value::Null);
    }

    #[test]
    fn test_cast_to_datetime_converts_epoch_millis() {
        let mut r = row(json!({"created": 0}));
        cast_to_datetime(&mut r, "created", Some("created_at"));
        assert_eq!(r["created_at"], json!("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_cast_to_datetime_in_place() {
        let mut r = row(json!({"joined_at": 60000}));
        cast_to_datetime(&mut r, "joined_at", None);
        assert_eq!(r["joined_at"], json!("1970-01-01T00:01:00+00:00"));
    }

    #[test]
    fn test_cast_to_datetime_degrades_to_null() {
        let mut r = row(json!({"updated": "not a number"}));
        cast_to_datetime(&mut r, "updated", Some("updated_at"));
        assert_eq!(r["updated_at"], Value::Null);

        cast_to_datetime(&mut r, "missing", Some("missing_at"));
        assert_eq!(r["missing_at"], Value::Null);
    }

    #[test]
    fn test_compose_location() {
        let mut r = row(json!({
            "country": "US", "city": "NYC", "lon": -74.0, "lat": 40.7
        }));
        compose_location(&mut r, "country", "city", "lon", "lat", "location");
        assert_eq!(
            r["location"],
            json!({"country": "US", "city": "NYC", "geo": {"lon": -74.0, "lat": 40.7}})
        );
    }

    #[test]
    fn test_compose_location_partial_inputs() {
        let mut r = row(json!({"country": "US", "lon": -74.0, "lat": 40.7}));
        compose_location(&mut r, "country", "city", "lon", "lat", "location");
        assert_eq!(
            r["location"],
            json!({"country": "US", "city": null, "geo": {"lon": -74.0, "lat": 40.7}})
        );
    }

    #[test]
    fn test_add_column_literal_and_computed() {
        let mut page: Page = vec![row(json!({"duration": 60000})), row(json!({}))];

        add_column(&mut page, "source", ColumnValue::Literal(json!("api")));
        add_column(
            &mut page,
            "duration",
            ColumnValue::Computed(&|r| {
                r.get("duration")
                    .and_then(Value::as_i64)
                    .map(|ms| json!(ms / 1000))
                    .unwrap_or(Value::Null)
            }),
        );

        assert_eq!(page[0]["source"], json!("api"));
        assert_eq!(page[0]["duration"], json!(60));
        assert_eq!(page[1]["source"], json!("api"));
        assert_eq!(page[1]["duration"], Value::Null);
    }

    #[test]
    fn test_normalize_missing_fills_listed_columns() {
        let mut r = row(json!({"id": 1}));
        normalize_missing(&mut r, &["id", "role", "location"]);
        assert_eq!(r["id"], json!(1));
        assert_eq!(r["role"], Value::Null);
        assert_eq!(r["location"], Value::Null);
    }

    #[test]
    fn test_project_columns_exact_and_ordered() {
        let r = row(json!({"extra": true, "id": 1, "name": "x"}));
        let projected = project_columns(r, &["id", "name", "role"]);

        let cols: Vec<&str> = projected.keys().map(String::as_str).collect();
        assert_eq!(cols, vec!["id", "name", "role"]);
        assert_eq!(projected["role"], Value::Null);
        assert!(!projected.contains_key("extra"));
    }
}
