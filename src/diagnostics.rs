// Diagnostics sink
//
// Leveled messages with an optional source location, forwarded to the `log`
// facade. `init_logging` wires the facade to env_logger.

use crate::config::Config;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;

/// Message severity, ordered from chattiest to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Verbose,
    Informational,
    Log,
    Warning,
    Error,
    Fatal,
}

impl Level {
    /// Tag written in front of the message, if the level has one
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Level::Log => Some("Log"),
            Level::Warning => Some("Warning"),
            Level::Error => Some("Error"),
            Level::Fatal => Some("Fatal"),
            Level::Verbose | Level::Informational => None,
        }
    }

    pub fn to_log_level(self) -> log::Level {
        match self {
            Level::Verbose => log::Level::Trace,
            Level::Informational => log::Level::Debug,
            Level::Log => log::Level::Info,
            Level::Warning => log::Level::Warn,
            Level::Error | Level::Fatal => log::Level::Error,
        }
    }
}

/// One formatted diagnostic line
#[derive(Debug, Clone)]
pub struct Diagnostic<'a> {
    pub level: Level,
    pub file: Option<&'a str>,
    pub line: Option<u32>,
    pub message: fmt::Arguments<'a>,
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = self.file {
            let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
            write!(f, "[{}]", name)?;
        }
        // Line 0 means "unknown"
        if let Some(line) = self.line.filter(|&l| l > 0) {
            write!(f, "({})", line)?;
        }
        if self.file.is_some() || self.line.is_some_and(|l| l > 0) {
            f.write_str(" ")?;
        }
        if let Some(tag) = self.level.tag() {
            write!(f, "{}: ", tag)?;
        }
        self.message.fmt(f)
    }
}

pub fn emit(diagnostic: &Diagnostic<'_>) {
    let level = diagnostic.level.to_log_level();
    if log::log_enabled!(target: "diag", level) {
        log::log!(target: "diag", level, "{}", diagnostic);
    }
}

/// Emit a diagnostic tagged with the caller's file and line
#[macro_export]
macro_rules! diag {
    ($level:expr, $($arg:tt)+) => {
        $crate::diagnostics::emit(&$crate::diagnostics::Diagnostic {
            level: $level,
            file: Some(file!()),
            line: Some(line!()),
            message: format_args!($($arg)+),
        })
    };
}

/// Initialize logging with optional file output
pub fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};

    let mut builder = Builder::from_default_env();
    builder.filter_level(config.log_level());

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== {} log ===", config.window.title);
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", config.debug.log_file, e);
            }
        }
    }

    builder.init();
}
