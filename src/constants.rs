//! Shared constants: reserved metadata keys, envelope keys, route prefix.

/// Reserved key under which a progress snapshot stores its percentage.
/// Every other key in the snapshot is caller metadata and is passed
/// through verbatim by the status projection.
pub const PROGRESS_KEY: &str = "progress";

/// Envelope keys recognized when unwrapping a submission body.
/// `payload` is preferred over `input` when both are present.
pub const ENVELOPE_KEYS: [&str; 2] = ["payload", "input"];

/// Default mount prefix for generated submission endpoints.
pub const DEFAULT_ROUTE_PREFIX: &str = "/run";
