//! Core data model types: message summaries, flags, addresses, and parsed messages.

pub mod address;
pub mod flags;
pub mod mail;
pub mod message;
