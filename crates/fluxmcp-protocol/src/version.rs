//! Protocol version negotiation.

/// Protocol versions understood by this client, newest first. `PREFERRED` is
/// offered first during `initialize`.
pub const SUPPORTED_VERSIONS: &[&str] = &[
    "2025-06-18",
    "2025-03-26",
    "2024-11-05",
    "2024-10-07",
];

/// Default protocol version advertised during initialization.
pub const PREFERRED_VERSION: &str = "2025-06-18";

/// True if `version` is one this client can speak.
#[must_use]
pub fn is_supported(version: &str) -> bool {
    SUPPORTED_VERSIONS.contains(&version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_is_supported() {
        assert!(is_supported(PREFERRED_VERSION));
    }

    #[test]
    fn unknown_version_rejected() {
        assert!(!is_supported("1999-01-01"));
    }
}
