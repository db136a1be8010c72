//! Shared helpers for mirror-server integration tests.

mod server;

pub use server::TestServer;
