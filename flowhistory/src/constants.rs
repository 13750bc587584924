/// Header carrying the version the operator last fetched. Sent with every mutating backend write.
pub const LAST_VERSION_HEADER: &str = "Last-Workflow-History-Id";

/// Timestamp fields rewritten on every save; never part of a structural comparison.
pub const VOLATILE_FIELDS: [&str; 2] = ["createdAtData", "updatedAtData"];

pub const DEFAULT_ENV: &str = "development";
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_QUEUE_IDLE_MINUTES: i64 = 30;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 600;
