//! Diagnostic logging.
//!
//! Library code only emits `tracing` events. The binary routes them to a log
//! file, never to the terminal, so the full-screen UI stays intact.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Overrides the configured level, using `EnvFilter` directive syntax.
pub const LOG_ENV: &str = "ASTRID_LOG";

const QUIET_DIRECTIVES: &[&str] = &["hyper=warn", "reqwest=warn", "h2=warn", "rustls=warn"];

pub fn build_filter(env_value: Option<&str>, default_level: &str) -> EnvFilter {
    let base = env_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default_level);
    let mut filter = EnvFilter::try_new(base).unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in QUIET_DIRECTIVES {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global file subscriber.
pub fn init_file_logging(path: &Path, level: &str) -> io::Result<()> {
    let file = open_log_file(path)?;
    let filter = build_filter(std::env::var(LOG_ENV).ok().as_deref(), level);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|err| io::Error::other(err.to_string()))
}

/// Sets up logging, or leaves it off with a single warning on stderr. Must
/// run before the terminal switches to the alternate screen.
pub fn install(path: Option<&Path>, level: &str) {
    let Some(path) = path else {
        return;
    };
    if let Err(err) = init_file_logging(path, level) {
        eprintln!(
            "⚠️  Logging disabled: cannot write to {}: {err}",
            path.display()
        );
    }
}
