//! Shared utility modules used across lexis components.

pub mod retry;
pub mod varint;
