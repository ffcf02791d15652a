//! REST API client module for the UniHub backend.
//!
//! This module provides the `ApiClient` for talking to the UniHub API
//! (login, signup, OTP verification, token refresh, profile) and the
//! `AuthApi` trait that lets the session layers run against a test double.
//!
//! The API uses JWT bearer token authentication; access tokens come from
//! the login and token-refresh endpoints.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ApiClient, AuthApi};
pub use error::ApiError;
