//! Typed measurement events and the bus that fans them out.
//!
//! All event types derive `serde::Serialize` + `serde::Deserialize` so storage
//! and export collaborators can persist them verbatim.

pub mod bus;
pub mod events;
