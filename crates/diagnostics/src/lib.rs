//! Logging facade for the oxbow tools
//!
//! Wraps emit with a console sink (always) and an optional file sink, so
//! the archive pipelines report progress to operators on the terminal while
//! keeping a durable run log when asked to.
//!
//! Configuration is environment-driven:
//! - `OXBOW_LOG` = off | error | warn | info | debug (default: info)
//! - `OXBOW_LOG_FILE` = path prefix for the file sink (default: console only)

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

static INIT: Once = Once::new();

/// Initialize diagnostics from `OXBOW_LOG` / `OXBOW_LOG_FILE`.
///
/// Call once at process startup. Safe to call multiple times; subsequent
/// calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let level = match std::env::var("OXBOW_LOG").as_deref() {
            Ok("off") => return,
            Ok("error") => emit::Level::Error,
            Ok("warn") => emit::Level::Warn,
            Ok("debug") => emit::Level::Debug,
            Ok("info") | Err(_) => emit::Level::Info,
            Ok(other) => {
                eprintln!("unknown OXBOW_LOG value '{}', using 'info'", other);
                emit::Level::Info
            }
        };

        let setup = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level));

        // The runtime must outlive all emitters; the process tears it down.
        match std::env::var("OXBOW_LOG_FILE") {
            Ok(path) => {
                let rt = setup.and_emit_to(emit_file::set(path).spawn()).init();
                std::mem::forget(rt);
            }
            Err(_) => {
                let rt = setup.init();
                std::mem::forget(rt);
            }
        }
    });
}

/// Log basic operations (batches archived, files uploaded, rows loaded).
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log detailed diagnostics (SQL issued, record counts, staging paths).
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recoverable oddities (skipped malformed records, fallbacks).
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures that abort the run.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Re-export the init function for convenience
pub use init_diagnostics as init;
