// Library root: the auction domain shared by the server binary and the
// integration tests.

pub mod audit;
pub mod config;
pub mod dataset;
pub mod db;
pub mod engine;
pub mod gate;
pub mod model;
pub mod store;
pub mod summary;
