//! Integration tests for the execution backends
//!
//! These exercise the full path — invocation in, settled outcome out —
//! on both isolation strategies.

pub mod test_script_integration;
pub mod worker_integration;
