//! Tracing and logging setup shared by the binaries and black-box tests.

/// Initialize process-wide observability: JSON logs and the panic hook.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
    tracing::install_panic_hook();
}

/// Subscriber configuration (filters, layers) and panic logging.
pub mod tracing;
