//! Core library for the UniHub client.
//!
//! This crate owns the client side of the UniHub session lifecycle:
//! - `auth`: expiring credential storage, JWT expiry inspection, and the
//!   session manager (sign-in, sign-out, startup restore, single-flight
//!   token refresh, and the authorized request pipeline)
//! - `api`: the REST client for the UniHub backend and its error taxonomy
//! - `cache`: the signed-in user's profile, mirrored to disk and kept in
//!   lockstep with the session state
//! - `models`: profile records shared across the above
//! - `config`: file locations and the API base URL
//!
//! Frontends (the `unihub` CLI, or anything else) wire the pieces together:
//! open a [`CredentialStore`], build an [`ApiClient`], hand both to a
//! [`SessionManager`], attach a [`ProfileCache`], then call
//! [`SessionManager::initialize`] and let the state channel drive the rest.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, SessionManager, SessionState};
pub use cache::ProfileCache;
pub use config::Config;
pub use models::{ProfileUpdate, UserProfile};
