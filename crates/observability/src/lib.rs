//! Tracing/logging setup shared by every binary in the workspace.

/// Initialize process-wide tracing. Safe to call multiple times;
/// subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

pub mod tracing;
