//! Data models for UniHub entities.
//!
//! - `UserProfile`: the signed-in user's profile record
//! - `ProfileUpdate`: partial body for profile edits

pub mod user;

pub use user::{ProfileUpdate, UserProfile};
