//! Data model shared by the nextext client crates: the backend's REST
//! bodies, the chat channel frames, and the per-conversation events that the
//! gateway hands to views.

pub mod api;
pub mod events;
pub mod models;
