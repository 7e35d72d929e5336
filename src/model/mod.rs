//! Core data model.
//!
//! A user account as stored, the raw input a request carries, and the
//! change event mirrored to the broker for every mutation.

pub mod event;
pub mod user;

pub use event::{EventMethod, UserEvent, UserSnapshot};
pub use user::{User, UserInput};
