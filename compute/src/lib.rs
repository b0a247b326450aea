//! SecureNet engine: snapshot loading, audit logging and reporting around
//! `securenet-core`, shared by the `securenet` binary and its tests.

pub mod config;
pub mod render;
pub mod snapshot;
