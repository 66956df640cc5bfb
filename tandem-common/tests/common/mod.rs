#![allow(dead_code)]

pub mod fixtures;
pub mod logging;

pub use fixtures::RemoteSandbox;
pub use logging::init_test_logging;
