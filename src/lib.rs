// Library exports for integration tests and embedding applications

pub mod config;
pub mod history;
pub mod models;
pub mod playback;

// Test support (unit tests, or integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
