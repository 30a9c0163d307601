//! Metric names and registration for observability
//!
//! Only the `metrics` facade is used here; the embedding application
//! decides whether and where to export.

use ::metrics::{counter, describe_counter};

pub const EVENTS_APPLIED: &str = "chat.events.applied";
pub const EVENTS_IGNORED: &str = "chat.events.ignored";
pub const FRAMES_DROPPED: &str = "chat.frames.dropped";
pub const ACTIONS_EMITTED: &str = "chat.actions.emitted";
pub const ACTIONS_REJECTED: &str = "chat.actions.rejected";
pub const SNAPSHOT_LOADS: &str = "chat.snapshot.loads";
pub const SNAPSHOT_FAILURES: &str = "chat.snapshot.failures";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(EVENTS_APPLIED, "Remote events that changed the store");
    describe_counter!(EVENTS_IGNORED, "Remote events ignored as duplicates, stale or after teardown");
    describe_counter!(FRAMES_DROPPED, "Inbound frames that could not be decoded");
    describe_counter!(ACTIONS_EMITTED, "User actions transmitted to the server");
    describe_counter!(ACTIONS_REJECTED, "User actions rejected by validation or policy");
    describe_counter!(SNAPSHOT_LOADS, "Successful snapshot loads");
    describe_counter!(SNAPSHOT_FAILURES, "Failed snapshot loads");
}

/// Increment a counter by one
pub fn record(name: &'static str) {
    counter!(name).increment(1);
}
