//! Rich diagnostic error types for the kibitz engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Watcher tasks convert everything that
//! crosses their boundary into a [`WatchError`], which the supervisor logs and
//! answers with a restart.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the kibitz engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum KibitzError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Convenience alias for functions returning kibitz results.
pub type KibitzResult<T> = std::result::Result<T, KibitzError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing environment variable: {name}")]
    #[diagnostic(
        code(kibitz::config::missing_env),
        help(
            "Set {name} in the environment before starting the bot. \
             Required: KIBITZ_CLIENT_ID, KIBITZ_CLIENT_SECRET, \
             KIBITZ_USERNAME, KIBITZ_PASSWORD."
        )
    )]
    MissingEnv { name: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(kibitz::config::invalid),
        help("Check the feed list, keyword list, and ledger path settings.")
    )]
    Invalid { message: String },

    #[error("cannot determine home directory")]
    #[diagnostic(
        code(kibitz::config::no_home),
        help("Set the HOME environment variable, or pass an explicit --ledger-path.")
    )]
    NoHome,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Ledger errors (durable dedup store)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(kibitz::ledger::io),
        help(
            "A filesystem operation failed. Check that the ledger directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(kibitz::ledger::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption; try a fresh ledger file. \
             Losing the ledger only risks re-replying to old items."
        )
    )]
    Redb { message: String },
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Platform errors (external collaborator boundary)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PlatformError {
    #[error("authentication failed: {message}")]
    #[diagnostic(
        code(kibitz::platform::auth),
        help(
            "The platform rejected the credentials. Verify client id/secret and \
             the account username/password, and that the app is a script app."
        )
    )]
    Auth { message: String },

    #[error("transport error: {message}")]
    #[diagnostic(
        code(kibitz::platform::transport),
        help(
            "A network request failed. This is usually transient; the supervisor \
             restarts the affected watcher automatically."
        )
    )]
    Transport { message: String },

    #[error("reply delivery failed for {item_id}: {message}")]
    #[diagnostic(
        code(kibitz::platform::delivery),
        help(
            "The reply-submit call failed. The item is already marked in the \
             ledger, so it will not be retried (at-most-once policy)."
        )
    )]
    Delivery { item_id: String, message: String },

    #[error("unexpected response shape: {message}")]
    #[diagnostic(
        code(kibitz::platform::parse),
        help("The platform returned JSON the connector does not understand.")
    )]
    Parse { message: String },
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

// ---------------------------------------------------------------------------
// Watcher errors (what a task body returns to the supervisor)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum WatchError {
    #[error("item stream for task \"{task}\" ended")]
    #[diagnostic(
        code(kibitz::watch::stream_ended),
        help(
            "Live streams are expected to be infinite; reaching the end is \
             treated as an abnormal termination and the watcher is restarted."
        )
    )]
    StreamEnded { task: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),
}

pub type WatchResult<T> = std::result::Result<T, WatchError>;

// ---------------------------------------------------------------------------
// Supervisor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SupervisorError {
    #[error("failed to spawn task thread \"{task}\": {source}")]
    #[diagnostic(
        code(kibitz::supervisor::spawn),
        help(
            "The OS refused to create a thread. This is a fatal startup error; \
             check process limits (ulimit -u) and available memory."
        )
    )]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_error_converts_to_kibitz_error() {
        let err = LedgerError::Redb {
            message: "commit failed".into(),
        };
        let top: KibitzError = err.into();
        assert!(matches!(top, KibitzError::Ledger(LedgerError::Redb { .. })));
    }

    #[test]
    fn watch_error_wraps_platform_error() {
        let err = PlatformError::Transport {
            message: "connection reset".into(),
        };
        let watch: WatchError = err.into();
        assert!(matches!(
            watch,
            WatchError::Platform(PlatformError::Transport { .. })
        ));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = PlatformError::Delivery {
            item_id: "t1_abc".into(),
            message: "403 Forbidden".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("t1_abc"));
        assert!(msg.contains("403"));
    }

    #[test]
    fn stream_ended_names_the_task() {
        let err = WatchError::StreamEnded {
            task: "chess/comments".into(),
        };
        assert!(format!("{err}").contains("chess/comments"));
    }
}
