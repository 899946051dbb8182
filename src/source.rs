//! Paginated fetch collaborator.
//!
//! The pipeline only sees the [`PageSource`] trait: a scan request in, a lazy
//! stream of pages out. [`HttpPageSource`] is the production implementation,
//! a blocking offset-paginated client with bearer auth supplied per request
//! by an injected [`TokenProvider`]. No retry or backoff happens here; a
//! failed fetch surfaces as an error on the stream and aborts the run.

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::types::Page;

/// Field-selection filter for RSVP scans, matching the sink schema inputs.
const RSVP_FIELDS: &str = "created,updated,response,guests,event.id,member.id,group.id";

/// Field-selection filter for attendance scans.
const ATTENDANCE_FIELDS: &str = "member.id,attendance_id,status,updated,guests";

/// One paginated scan over a resource path.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Resource path relative to the API base, e.g. `some-group/events`.
    pub path: String,

    /// Optional status filter (events support `past,upcoming`).
    pub status: Option<String>,

    /// Optional comma-separated field selection.
    pub only: Option<String>,
}

impl ScanRequest {
    pub fn new(path: impl Into<String>) -> Self {
        ScanRequest {
            path: path.into(),
            status: None,
            only: None,
        }
    }

    /// Member listing for a group.
    pub fn members(group_id: &str) -> Self {
        Self::new(format!("{group_id}/members"))
    }

    /// Event listing for a group, covering both past and upcoming events.
    pub fn events(group_id: &str) -> Self {
        let mut request = Self::new(format!("{group_id}/events"));
        request.status = Some(String::from("past,upcoming"));
        request
    }

    /// RSVP listing for one event.
    pub fn rsvps(group_id: &str, event_id: &str) -> Self {
        let mut request = Self::new(format!("{group_id}/events/{event_id}/rsvps"));
        request.only = Some(String::from(RSVP_FIELDS));
        request
    }

    /// Attendance listing for one event.
    pub fn attendances(group_id: &str, event_id: &str) -> Self {
        let mut request = Self::new(format!("{group_id}/events/{event_id}/attendance"));
        request.only = Some(String::from(ATTENDANCE_FIELDS));
        request
    }
}

/// Lazy stream of pages; each item is one fetch call's worth of records.
pub type PageStream<'a> = Box<dyn Iterator<Item = Result<Page>> + 'a>;

/// Producer of paginated record streams.
pub trait PageSource {
    fn scan(&self, request: &ScanRequest) -> Result<PageStream<'_>>;
}

/// Failures surfaced by the HTTP source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("token acquisition failed: {0}")]
    Token(String),

    #[error("request to {path} failed")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("api returned status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("unexpected page payload for {path}: {detail}")]
    Payload { path: String, detail: String },
}

/// Capability that yields a live access token for each fetch.
///
/// Token refresh may fail; that failure is surfaced to the caller rather
/// than proceeding with a stale token.
pub trait TokenProvider {
    fn access_token(&self) -> Result<String, FetchError>;
}

/// A fixed, pre-issued token.
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Result<String, FetchError> {
        Ok(self.0.clone())
    }
}

/// Blocking HTTP implementation of [`PageSource`].
///
/// Pagination is offset-based: pages are requested with `page=<size>` and
/// `offset=<n>`, and the scan ends on the first short or empty page.
pub struct HttpPageSource<T: TokenProvider> {
    client: reqwest::blocking::Client,
    base_url: String,
    page_size: usize,
    tokens: T,
}

impl<T: TokenProvider> HttpPageSource<T> {
    pub fn new(base_url: impl Into<String>, tokens: T) -> Self {
        let base_url = base_url.into();
        HttpPageSource {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: 200,
            tokens,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Fetch one page for a scan.
    fn fetch_page(&self, request: &ScanRequest, offset: usize) -> Result<Page, FetchError> {
        let token = self.tokens.access_token()?;
        let url = format!("{}/{}", self.base_url, request.path);

        let mut query: Vec<(&str, String)> = vec![
            ("page", self.page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(status) = &request.status {
            query.push(("status", status.clone()));
        }
        if let Some(only) = &request.only {
            query.push(("only", only.clone()));
        }

        debug!(path = %request.path, offset, "fetching page");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&query)
            .send()
            .map_err(|source| FetchError::Http {
                path: request.path.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                path: request.path.clone(),
            });
        }

        let body: Value = response.json().map_err(|source| FetchError::Http {
            path: request.path.clone(),
            source,
        })?;

        records_from_payload(body, &request.path)
    }
}

impl<T: TokenProvider> PageSource for HttpPageSource<T> {
    fn scan(&self, request: &ScanRequest) -> Result<PageStream<'_>> {
        Ok(Box::new(ScanPages {
            source: self,
            request: request.clone(),
            offset: 0,
            done: false,
        }))
    }
}

/// A page payload is a JSON array of record objects.
fn records_from_payload(body: Value, path: &str) -> Result<Page, FetchError> {
    let items = match body {
        Value::Array(items) => items,
        other => {
            return Err(FetchError::Payload {
                path: path.to_string(),
                detail: format!("expected an array, got {}", json_kind(&other)),
            })
        }
    };

    let mut page = Page::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(record) => page.push(record),
            other => {
                return Err(FetchError::Payload {
                    path: path.to_string(),
                    detail: format!("expected record objects, got {}", json_kind(&other)),
                })
            }
        }
    }
    Ok(page)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Iterator state for one offset-paginated scan.
struct ScanPages<'a, T: TokenProvider> {
    source: &'a HttpPageSource<T>,
    request: ScanRequest,
    offset: usize,
    done: bool,
}

impl<T: TokenProvider> Iterator for ScanPages<'_, T> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.source.fetch_page(&self.request, self.offset) {
            Ok(page) => {
                if page.len() < self.source.page_size {
                    self.done = true;
                }
                self.offset += 1;
                if page.is_empty() {
                    None
                } else {
                    Some(Ok(page))
                }
            }
            Err(err) => {
                self.done = true;
                Some(Err(err.into()))
            }
        }
    }
}
