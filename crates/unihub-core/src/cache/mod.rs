//! Profile caching: the signed-in user's record, mirrored to disk and kept
//! in lockstep with the session state.

pub mod profile;

pub use profile::ProfileCache;
