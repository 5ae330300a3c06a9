pub mod events;
pub mod system;
pub mod validation;

pub use events::{create_event, delete_event, get_event, list_events, update_event};
pub use system::{health_check, version_info};
