//! Shared primitives for the realtime layer.
//!
//! Identifiers and validated names used by every other crate. No IO, no
//! transport concerns.

pub mod error;
pub mod id;
pub mod name;

pub use error::{CoreError, CoreResult};
pub use id::RegistrationId;
pub use name::EventName;
