//! Synthetic telemetry events and their JSON envelope.
//!
//! Every decoy emission is a JSON object shaped like a real analytics
//! pipeline event: `{timestamp, metric, value, region, source}`. Values
//! carry a space-filled `padding` member so serialized sizes vary the way
//! real payloads do instead of clustering around a few fixed lengths.

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};

/// Region tags attached to emissions, chosen uniformly.
pub const REGIONS: [&str; 2] = ["us-east-1", "eu-west-1"];

/// Number of synthetic `backend-worker-N` source tags.
pub const SOURCE_COUNT: u32 = 5;

/// Paths a simulated user "visits".
pub const PAGE_PATHS: [&str; 5] = [
    "/dashboard",
    "/settings/profile",
    "/data/visuals",
    "/docs/api",
    "/billing",
];

/// Target serialized size ranges per event kind, in bytes.
const PAGE_VIEW_SIZE: std::ops::Range<usize> = 100..250;
const API_LATENCY_SIZE: std::ops::Range<usize> = 40..90;
const DB_QUERY_SIZE: std::ops::Range<usize> = 30..70;

/// The kinds of events a simulated session can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A user "logged in" — starts an active session.
    UserLogin,
    /// A page navigation.
    PageView,
    /// An API round-trip latency sample.
    ApiLatency,
    /// A database query timing sample.
    DbQuery,
    /// The active session ended.
    SessionEnd,
}

impl EventKind {
    /// The metric name carried in the envelope.
    pub fn metric(self) -> &'static str {
        match self {
            EventKind::UserLogin => "user.login.success",
            EventKind::PageView => "page.view",
            EventKind::ApiLatency => "api.request.latency",
            EventKind::DbQuery => "database.query.time",
            EventKind::SessionEnd => "user.session.end",
        }
    }
}

/// One decoy emission, ready to serialize.
#[derive(Debug, Serialize)]
pub struct Envelope {
    /// ISO-8601 emission time.
    pub timestamp: String,
    /// Metric name, one of the [`EventKind`] names.
    pub metric: &'static str,
    /// Event-specific value.
    pub value: Value,
    /// One of the two fixed region tags.
    pub region: &'static str,
    /// One of the five fixed synthetic source tags.
    pub source: String,
}

impl Envelope {
    /// Wrap a value with a fresh timestamp and random region/source tags.
    pub fn new<R: Rng>(kind: EventKind, value: Value, rng: &mut R) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            metric: kind.metric(),
            value,
            region: REGIONS[rng.gen_range(0..REGIONS.len())],
            source: format!("backend-worker-{}", rng.gen_range(0..SOURCE_COUNT)),
        }
    }

    /// Serialize to the wire form.
    pub fn to_json(&self) -> String {
        // Serialization of this shape cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The one-off message sent when a feed connection is established.
pub fn greeting() -> String {
    json!({
        "status": "connected",
        "message": "Live data feed established. Waiting for data points...",
    })
    .to_string()
}

/// Build the value for an event kind, padded to a size sampled from the
/// kind's target range.
pub fn build_value<R: Rng>(kind: EventKind, user_id: &str, rng: &mut R) -> Value {
    match kind {
        EventKind::UserLogin => json!({ "success": true, "userId": user_id }),
        EventKind::SessionEnd => json!({ "userId": user_id }),
        EventKind::PageView => {
            let path = PAGE_PATHS[rng.gen_range(0..PAGE_PATHS.len())];
            let value = json!({ "path": path, "referrer": "internal" });
            pad_to_target(value, rng.gen_range(PAGE_VIEW_SIZE))
        }
        EventKind::ApiLatency => {
            let value = json!({ "ms": rng.gen_range(50..300) });
            pad_to_target(value, rng.gen_range(API_LATENCY_SIZE))
        }
        EventKind::DbQuery => {
            let ms = format!("{:.4}", rng.gen_range(0.0..15.0));
            let value = json!({ "ms": ms });
            pad_to_target(value, rng.gen_range(DB_QUERY_SIZE))
        }
    }
}

/// Add space filler so the serialized value reaches `target` bytes.
/// The pad amount is never negative; already-large values pass through.
fn pad_to_target(mut value: Value, target: usize) -> Value {
    let current = value.to_string().len();
    let fill = target.saturating_sub(current);
    if fill > 0 {
        if let Some(map) = value.as_object_mut() {
            map.insert("padding".into(), Value::String(" ".repeat(fill)));
        }
    }
    value
}
