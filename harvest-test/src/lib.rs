//! Helpers for testing the harvest crates.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test that logs, call [`setup`]. This will set up the logger so that all console
//!    output is captured by the test runner. All logs emitted with [`harvest_log`] will show up
//!    for test failures or when run with `--nocapture`.
//!
//! # Example
//!
//! ```no_run
//! #[test]
//! fn my_test() {
//!     harvest_test::setup();
//!
//!     harvest_log::debug!("hello, world!");
//! }
//! ```

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the harvest crates and mutes all other logs.
pub fn setup() {
    harvest_log::init_test!();
}
