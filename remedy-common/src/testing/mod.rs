//! Test helpers shared by the Remedy crates.

pub mod log;

pub use log::init_test_logging;
