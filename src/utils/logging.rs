//! Structured logging with redaction
//!
//! Every `log_*!` call builds a [`LogEntry`] whose fields are redacted by key
//! before the entry becomes a `tracing` event:
//! - key material and zkLogin inputs (JWT, salt, randomness) are replaced
//! - addresses and object ids keep a short prefix and suffix
//! - digests and transaction ids keep enough to grep for

use std::fmt;
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Install the fmt subscriber once. `RUST_LOG` wins over `default_filter`.
pub fn init(default_filter: &str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        // A host application may have installed its own subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

// =============================================================================
// Redaction
// =============================================================================

/// How a field value is shown, chosen from the field key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redaction {
    Clear,
    /// Only the length survives
    Secret,
    /// `0x1a2b3c…7f8e`
    Identifier,
    /// `3a1f0c9e2b…8b9c0d`
    Digest,
}

const SECRET_KEYS: &[&str] = &[
    "private_key", "secret", "seed", "mnemonic", "app_key", "jwt", "salt", "randomness", "token",
];
const IDENTIFIER_KEYS: &[&str] = &["address", "recipient", "sender", "wallet", "object", "owner", "package"];
const DIGEST_KEYS: &[&str] = &["digest", "tx_id", "hash"];

impl Redaction {
    pub fn for_key(key: &str) -> Self {
        let key = key.to_ascii_lowercase();
        let matches = |list: &[&str]| list.iter().any(|k| key.contains(k));

        // secrets first: `address_seed` also contains "address"
        if matches(SECRET_KEYS) {
            Redaction::Secret
        } else if matches(IDENTIFIER_KEYS) {
            Redaction::Identifier
        } else if matches(DIGEST_KEYS) {
            Redaction::Digest
        } else {
            Redaction::Clear
        }
    }

    pub fn apply(self, value: &str) -> String {
        let value = value.trim();
        if value.is_empty() {
            return "[EMPTY]".to_string();
        }
        match self {
            Redaction::Clear => value.to_string(),
            Redaction::Secret => hidden(value),
            Redaction::Identifier => {
                let (head, tail) = if value.starts_with("0x") { (8, 4) } else { (6, 4) };
                elide(value, head, tail).unwrap_or_else(|| hidden(value))
            }
            Redaction::Digest => {
                let (head, tail) = if value.starts_with("0x") { (12, 6) } else { (10, 6) };
                if value.len() <= 20 {
                    value.to_string()
                } else {
                    elide(value, head, tail).unwrap_or_else(|| value.to_string())
                }
            }
        }
    }
}

fn hidden(value: &str) -> String {
    if value.len() <= 4 {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED:{}chars]", value.len())
    }
}

/// `head…tail`, or `None` when that would reveal most of the value
fn elide(value: &str, head: usize, tail: usize) -> Option<String> {
    if !value.is_ascii() || value.len() <= head + tail + 3 {
        return None;
    }
    Some(format!("{}...{}", &value[..head], &value[value.len() - tail..]))
}

// =============================================================================
// Entries
// =============================================================================

#[derive(Debug)]
pub struct LogEntry {
    pub level: Level,
    pub module: &'static str,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogEntry {
    pub fn new(level: Level, module: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            module,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field, redacted according to its key
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        let shown = Redaction::for_key(key).apply(&value.to_string());
        self.fields.push((key, shown));
        self
    }

    fn rendered_fields(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    pub fn emit(self) {
        let fields = self.rendered_fields();
        let module = self.module;
        let message = self.message.as_str();

        match self.level {
            Level::TRACE => tracing::trace!(module, fields = %fields, "{}", message),
            Level::DEBUG => tracing::debug!(module, fields = %fields, "{}", message),
            Level::INFO => tracing::info!(module, fields = %fields, "{}", message),
            Level::WARN => tracing::warn!(module, fields = %fields, "{}", message),
            _ => tracing::error!(module, fields = %fields, "{}", message),
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_entry {
    ($level:expr, $module:expr, $msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::utils::logging::LogEntry::new($level, $module, $msg)
            $(.field(stringify!($key), &$value))*
            .emit()
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::__log_entry!(::tracing::Level::DEBUG, $($arg)+) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::__log_entry!(::tracing::Level::INFO, $($arg)+) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => { $crate::__log_entry!(::tracing::Level::WARN, $($arg)+) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::__log_entry!(::tracing::Level::ERROR, $($arg)+) };
}
