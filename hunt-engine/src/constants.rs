//! Centralized defaults for the hunt engine.
//!
//! These values describe the stock six-signal hunt. Deployments override
//! them through [`crate::HuntConfig`], but the fallbacks live here so they
//! can only change through reviewed code.

// Hunt shape ---------------------------------------------------------------
pub const DEFAULT_TOTAL_LEVELS: u32 = 6;
/// Upper bound on configured levels; keeps flag vectors inline-sized.
pub const MAX_TOTAL_LEVELS: u32 = 64;

// Collections --------------------------------------------------------------
pub const DEFAULT_USERS_COLLECTION: &str = "users";
pub const DEFAULT_HINTS_COLLECTION: &str = "hint";

// Scan payloads ------------------------------------------------------------
pub const DEFAULT_CODE_PREFIXES: [&str; 3] = ["qr", "level", "signal"];

// Store behaviour ----------------------------------------------------------
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_COMMIT_RETRIES: u32 = 3;

// Wire document keys -------------------------------------------------------
pub(crate) const DOC_NAME: &str = "name";
pub(crate) const DOC_FLAG_PREFIX: &str = "qr";
pub(crate) const DOC_START_TIME: &str = "startTime";
pub(crate) const DOC_STOP_TIME: &str = "stopTime";
pub(crate) const DOC_TIME_TAKEN: &str = "timeTaken";

// Presentation fallbacks ---------------------------------------------------
pub const HINT_PLACEHOLDER: &str = "Encrypted Signal...";
pub const ELAPSED_PLACEHOLDER: &str = "--:--";

// Logging targets ----------------------------------------------------------
pub(crate) const LOG_TARGET_SECURITY: &str = "hunt::security";
