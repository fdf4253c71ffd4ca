use thiserror::Error;

/// Core error types for fwconverge
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Existence check was handed an empty compiled rule
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// `iptables -S <chain>` could not be run or exited non-zero
    #[error("Listing of chain {chain} unavailable: {message}")]
    ListingUnavailable { chain: String, message: String },

    /// Insert/append invocation failed
    #[error("iptables error: {message}")]
    Mutation {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Privilege escalation failed
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),
}

impl Error {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known iptables stderr patterns and their translations
pub struct IptablesErrorPattern;

impl IptablesErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied") || lower.contains("you must be root") {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run as root or configure sudo/run0/pkexec")
                .with_suggestion("Set FWCONVERGE_ELEVATION_METHOD to force a method")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("iptables is not installed or not found in PATH")
                .with_suggestion("Install iptables: sudo apt install iptables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install iptables  (Fedora/RHEL)")
                .with_suggestion("Or point FWCONVERGE_IPTABLES_COMMAND at the binary");
        }

        if lower.contains("no chain/target/match by that name") {
            return ErrorTranslation::new("Chain, target or match extension not found")
                .with_suggestion("Check that the chain exists in the selected table")
                .with_suggestion("PREROUTING/POSTROUTING rules live in the nat table")
                .with_suggestion("Load the needed kernel module (e.g. xt_multiport, xt_comment)");
        }

        if lower.contains("another app is currently holding the xtables lock")
            || lower.contains("resource temporarily unavailable")
        {
            return ErrorTranslation::new("The xtables lock is held by another process")
                .with_suggestion("Another firewall manager may be running")
                .with_suggestion("Wait a moment and try again");
        }

        if lower.contains("bad argument")
            || lower.contains("unknown option")
            || lower.contains("invalid port")
            || lower.contains("host/network")
        {
            return ErrorTranslation::new("iptables rejected the rule arguments")
                .with_suggestion("Check ports, addresses and interface names in the rule")
                .with_suggestion("Raw rules are passed verbatim, verify their syntax");
        }

        if lower.contains("index of insertion too big") {
            return ErrorTranslation::new("Insert position is past the end of the chain")
                .with_suggestion("Use a position no larger than the chain length plus one");
        }

        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify iptables is working: sudo iptables -S")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
