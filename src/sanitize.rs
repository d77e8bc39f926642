//! App identity sanitization
//!
//! Turns an arbitrary application name into an identifier that is safe to
//! use both as a DNS label and as a configuration file name.

/// Maximum length of a DNS label
pub const MAX_LABEL_LEN: usize = 63;

/// Sanitize an application identity into a DNS-safe, filesystem-safe name.
///
/// Lowercases ASCII, collapses every run of non-alphanumeric characters
/// into a single `-`, strips leading/trailing dashes and truncates to the
/// DNS label limit. Idempotent: sanitizing an already-sanitized name
/// returns it unchanged.
pub fn sanitize(identity: &str) -> String {
    let mut out = String::with_capacity(identity.len().min(MAX_LABEL_LEN));
    let mut pending_dash = false;

    for c in identity.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(c);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    out.truncate(MAX_LABEL_LEN);
    // Truncation can leave a trailing dash
    while out.ends_with('-') {
        out.pop();
    }

    out
}

/// Check whether a name is already in sanitized form
pub fn is_sanitized(name: &str) -> bool {
    !name.is_empty() && sanitize(name) == name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize("nginx-01"), "nginx-01");
        assert_eq!(sanitize("My App"), "my-app");
        assert_eq!(sanitize("Postgres_16.3"), "postgres-16-3");
        assert_eq!(sanitize("UPPER"), "upper");
    }

    #[test]
    fn test_sanitize_collapses_runs() {
        assert_eq!(sanitize("a -- b__c"), "a-b-c");
        assert_eq!(sanitize("a...b"), "a-b");
    }

    #[test]
    fn test_sanitize_trims_dashes() {
        assert_eq!(sanitize("--edge--"), "edge");
        assert_eq!(sanitize("...app..."), "app");
    }

    #[test]
    fn test_sanitize_empty_results() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("---"), "");
        assert_eq!(sanitize("!!!"), "");
    }

    #[test]
    fn test_sanitize_truncates_to_label_limit() {
        let long = "a".repeat(100);
        assert_eq!(sanitize(&long).len(), MAX_LABEL_LEN);

        // Truncation must not expose a trailing dash
        let mut tricky = "a".repeat(MAX_LABEL_LEN - 1);
        tricky.push_str("-bcd");
        let out = sanitize(&tricky);
        assert!(!out.ends_with('-'));
        assert!(out.len() <= MAX_LABEL_LEN);
    }

    #[test]
    fn test_sanitize_idempotent() {
        for input in ["nginx-01", "My App", "a -- b", "--x--", &"z".repeat(90)] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_is_sanitized() {
        assert!(is_sanitized("nginx-01"));
        assert!(!is_sanitized(""));
        assert!(!is_sanitized("My App"));
        assert!(!is_sanitized("trailing-"));
    }
}
