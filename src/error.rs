// Error types for svcdeck

use thiserror::Error;

/// Result type alias using anyhow::Error
pub type Result<T> = anyhow::Result<T>;

/// Svcdeck-specific error types
#[derive(Error, Debug)]
pub enum SvcdeckError {
    #[error("Service manager unavailable on this platform: {0}")]
    ManagerUnavailable(String),

    #[error("Failed to fetch service information: {0}")]
    ServiceInfo(String),

    #[error("Failed to control service '{service}': {message}")]
    ServiceControl { service: String, message: String },

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Service not found: {0}")]
    NotFound(String),

    #[error("Rate limit: {0}")]
    RateLimited(String),

    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error taxonomy used by the retry and propagation policy.
///
/// Categories are assigned from message heuristics rather than error subtype
/// because the underlying subprocess tooling reports failures as free text
/// on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Permission,
    Validation,
    Timeout,
    NotFound,
    RateLimit,
    Unknown,
}

impl ErrorCategory {
    /// Classify an error into its taxonomy category.
    ///
    /// Typed svcdeck variants classify directly; everything else falls back
    /// to message substring matching.
    pub fn classify(error: &anyhow::Error) -> Self {
        if let Some(err) = error.downcast_ref::<SvcdeckError>() {
            match err {
                SvcdeckError::Permission(_) => return ErrorCategory::Permission,
                SvcdeckError::Validation(_) => return ErrorCategory::Validation,
                SvcdeckError::Timeout(_) => return ErrorCategory::Timeout,
                SvcdeckError::NotFound(_) => return ErrorCategory::NotFound,
                SvcdeckError::RateLimited(_) => return ErrorCategory::RateLimit,
                _ => {}
            }
        }

        let message = error.to_string().to_lowercase();

        if message.contains("timed out") || message.contains("timeout") {
            ErrorCategory::Timeout
        } else if message.contains("permission denied")
            || message.contains("access denied")
            || message.contains("access is denied")
            || message.contains("authentication")
            || message.contains("eacces")
        {
            ErrorCategory::Permission
        } else if message.contains("not found")
            || message.contains("no such file")
            || message.contains("could not be found")
        {
            ErrorCategory::NotFound
        } else if message.contains("rate limit") || message.contains("too many requests") {
            ErrorCategory::RateLimit
        } else if message.contains("invalid")
            || message.contains("validation")
            || message.contains("malformed")
        {
            ErrorCategory::Validation
        } else if message.contains("network")
            || message.contains("connection")
            || message.contains("broken pipe")
            || message.contains("unreachable")
        {
            ErrorCategory::Network
        } else {
            ErrorCategory::Unknown
        }
    }

    /// Short label used as a message prefix on surfaced errors
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::NotFound => "not-found",
            ErrorCategory::RateLimit => "rate-limit",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

/// Scrub home-directory paths and usernames from a message before it leaves
/// the core. Subprocess stderr frequently embeds absolute paths.
pub fn sanitize_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    if let Some(home) = dirs::home_dir() {
        if let Some(home_str) = home.to_str() {
            if !home_str.is_empty() && home_str != "/" {
                sanitized = sanitized.replace(home_str, "~");
            }
        }
    }

    // Generic per-user prefixes, in case the message mentions another account
    let user_prefix =
        regex::Regex::new(r"(/home/|/Users/)[A-Za-z0-9._-]+").expect("static pattern");
    sanitized = user_prefix.replace_all(&sanitized, "~").to_string();

    let win_prefix =
        regex::Regex::new(r"(?i)C:\\Users\\[A-Za-z0-9._ -]+").expect("static pattern");
    win_prefix.replace_all(&sanitized, "~").to_string()
}
