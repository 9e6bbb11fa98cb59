//! REST endpoints for forums and their messages.

pub mod crud;
pub mod messages;
