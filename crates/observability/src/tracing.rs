//! Subscriber setup and panic logging.

use std::backtrace::Backtrace;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Initialize the process subscriber.
///
/// JSON lines by default; `PROPDESK_LOG_FORMAT=text` switches to the
/// human-readable formatter for local runs. Filtering follows `RUST_LOG`
/// (default `info`). Safe to call multiple times.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let text = std::env::var("PROPDESK_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("text"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = if text {
        builder.try_init()
    } else {
        builder.json().with_current_span(true).with_span_list(false).try_init()
    };
}

/// Route panics through `tracing` at `error`, with a captured backtrace,
/// before the previously installed hook runs.
pub fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            ::tracing::error!(panic = %info, %backtrace, "panic");
            previous(info);
        }));
    });
}
