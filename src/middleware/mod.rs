pub mod auth;

pub use auth::{provision_bootstrap_admin, require_api_key, BootstrapOutcome};
