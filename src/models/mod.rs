pub mod event;
pub mod user;

pub use event::{Event, EventRequest, ListEventsResponse, NewEvent};
pub use user::{Identity, NewUser, User};
