use colloquy_core::transport::error::strip_paths;
use regex::Regex;
use std::sync::OnceLock;

const MAX_ERROR_LEN: usize = 300;

/// Sanitize backend error text before it reaches logs or the chat history.
pub(crate) fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("traceback") || lower.contains("stack trace") {
        return "An internal error occurred in the assistant backend.".to_string();
    }

    let redacted = redact_secrets(&strip_paths(error));
    if redacted.chars().count() > MAX_ERROR_LEN {
        let cut: String = redacted.chars().take(MAX_ERROR_LEN).collect();
        format!("{cut}...(truncated)")
    } else {
        redacted
    }
}

/// Replace bearer tokens and key-like assignments with `[REDACTED]`.
pub(crate) fn redact_secrets(text: &str) -> String {
    static SECRET_RE: OnceLock<Regex> = OnceLock::new();
    let re = SECRET_RE.get_or_init(|| {
        Regex::new(r"(?i)(bearer\s+|api[_-]?key\s*[=:]\s*|token\s*[=:]\s*)[A-Za-z0-9._~+/-]+")
            .expect("secret pattern is valid")
    });
    re.replace_all(text, "${1}[REDACTED]").to_string()
}
