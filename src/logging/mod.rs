//! Logging infrastructure - structured tracing for allocation and lookup
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels through `KX_LOG_*` or `RUST_LOG`
//! - Zero-cost when disabled (hot-path events are TRACE)
//! - Optional JSON and file output
//! - Scoped duration tracking for slow-path operations

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::allocator::AllocError;

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Whether `perf::track` measures anything
static PERF_ENABLED: AtomicBool = AtomicBool::new(false);

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
    /// Enable performance tracking
    pub track_performance: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
            track_performance: cfg!(debug_assertions),
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // KX_LOG_LEVEL: trace, debug, info, warn, error
        if let Some(level) = var("KX_LOG_LEVEL") {
            config.level = parse_level(&level);
        }

        // KX_LOG_FILE: path to log file
        if let Some(path) = var("KX_LOG_FILE") {
            config.file_output = true;
            config.log_path = Some(path);
        }

        config.json_format = var("KX_LOG_JSON").is_some();
        config.show_spans = var("KX_LOG_SPANS").is_some();

        // KX_LOG_PERF: 1/true enables duration tracking
        if let Some(val) = var("KX_LOG_PERF") {
            config.track_performance = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Minimal logging
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
            track_performance: false,
        }
    }

    /// Verbose logging to `kx.log`
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            file_output: true,
            log_path: Some("kx.log".to_string()),
            json_format: false,
            show_spans: true,
            track_performance: true,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Non-rotating appender for `path`, creating its directory if needed
pub fn file_appender(path: &Path) -> Result<RollingFileAppender, InitError> {
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "kx.log".to_string());

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration. Only the first call has
/// an effect.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        PERF_ENABLED.store(config.track_performance, Ordering::Relaxed);

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("kx={}", config.level.as_str().to_lowercase()))
        });

        let span_events = || {
            if config.show_spans {
                FmtSpan::ENTER | FmtSpan::CLOSE
            } else {
                FmtSpan::NONE
            }
        };

        let console = (!config.json_format).then(|| {
            fmt::layer()
                .with_writer(io::stderr)
                .with_span_events(span_events())
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
        });

        let json = config.json_format.then(|| {
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(span_events())
        });

        let file = match (config.file_output, config.log_path.as_deref()) {
            (true, Some(path)) => match file_appender(Path::new(path)) {
                Ok(appender) => Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(appender)
                        .with_span_events(span_events()),
                ),
                Err(err) => {
                    eprintln!("kx: cannot open log file {}: {}", path, err);
                    None
                }
            },
            _ => None,
        };

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(json)
            .with(file)
            .try_init();

        if let Err(err) = installed {
            tracing::warn!(error = %err, "global subscriber already installed");
        }
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Allocation and lookup events
// ============================================================================

/// Log a system allocation
#[inline]
pub fn log_allocation(size: usize, ptr: *const u8) {
    tracing::trace!(
        event = "allocation",
        size_bytes = size,
        address = ?ptr,
        "Memory allocated"
    );
}

/// Log a system deallocation
#[inline]
pub fn log_deallocation(ptr: *const u8) {
    tracing::trace!(
        event = "deallocation",
        address = ?ptr,
        "Memory deallocated"
    );
}

/// Log an arena acquiring a chunk
pub fn log_chunk_acquired(usable_bytes: usize, align: usize, arena_bytes: usize) {
    tracing::debug!(
        event = "chunk_acquired",
        usable_bytes,
        align,
        arena_bytes,
        "Arena chunk acquired"
    );
}

/// Log an arena reset
pub fn log_arena_reset(released_chunks: usize, retained_bytes: usize) {
    tracing::debug!(
        event = "arena_reset",
        released_chunks,
        retained_bytes,
        "Arena reset"
    );
}

/// Log an arena releasing all of its chunks
pub fn log_arena_destroyed(released_chunks: usize) {
    tracing::debug!(
        event = "arena_destroyed",
        released_chunks,
        "Arena destroyed"
    );
}

/// Log hash table growth
pub fn log_table_resized(old_capacity: usize, new_capacity: usize, live: usize) {
    tracing::debug!(
        event = "table_resized",
        old_capacity,
        new_capacity,
        live,
        "Hash table resized"
    );
}

/// Log a probe that visited every slot without finding an empty one
pub fn log_probe_exhausted(capacity: usize, live: usize, tombstone: Option<usize>) {
    tracing::debug!(
        event = "probe_exhausted",
        capacity,
        live,
        first_tombstone = ?tombstone,
        "Hash table probe exhausted"
    );
}

/// Log a failed allocation on an aborting path
pub fn log_alloc_failure(operation: &str, size: usize, align: usize, error: &AllocError) {
    tracing::error!(
        event = "alloc_failure",
        operation,
        size_bytes = size,
        align,
        error = %error,
        "Allocation failed"
    );
}

/// Log a newly interned string
#[inline]
pub fn log_interned(len: usize, distinct: usize) {
    tracing::trace!(
        event = "interned",
        len,
        distinct,
        "String interned"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop). Does
    /// nothing unless performance tracking was enabled at init.
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        let start = super::PERF_ENABLED
            .load(Ordering::Relaxed)
            .then(Instant::now);
        PerformanceGuard { operation, start }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Option<Instant>,
    }

    impl PerformanceGuard {
        /// Whether this guard is timing its operation
        pub fn is_active(&self) -> bool {
            self.start.is_some()
        }
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            if let Some(start) = self.start {
                debug!(
                    operation = self.operation,
                    duration_us = start.elapsed().as_micros() as u64,
                    "operation completed"
                );
            }
        }
    }
}
