// Version information for the embedding service

/// Semantic version number
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("{} v{}", NAME, VERSION)
}
