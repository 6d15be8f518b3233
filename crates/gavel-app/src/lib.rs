// Library root: re-exports all modules so integration tests and the binary
// share the same code.

pub mod app;
pub mod observer;
pub mod protocol;
pub mod replicator;
pub mod ws_server;
