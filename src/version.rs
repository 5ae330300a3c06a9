/// Crate version, as published in `/version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit hash injected at build time through `GIT_COMMIT`, if any.
pub const COMMIT: Option<&str> = option_env!("GIT_COMMIT");

pub fn build_info() -> String {
    format!(
        "Calendar API {} (commit: {}, target: {}-{})",
        VERSION,
        COMMIT.unwrap_or("unknown"),
        std::env::consts::ARCH,
        std::env::consts::OS,
    )
}
