//! Tracing and logging setup shared by every binary and test harness.

/// Subscriber initialisation (filters, formatters).
pub mod tracing;

pub use crate::tracing::{LogFormat, LogSettings, ParseLogFormatError};

/// Initialize process-wide tracing with the default settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init(&LogSettings::default());
}

/// Initialize process-wide tracing with explicit settings.
pub fn init_with(settings: &LogSettings) {
    crate::tracing::init(settings);
}
