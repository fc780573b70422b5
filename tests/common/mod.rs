//! Common utilities for integration tests
//!
//! Shared test infrastructure: unique key generation and test data
//! generators used across the backend test suites.

#![allow(dead_code)]

use serde_json::json;

/// Install a tracing subscriber for test output; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Create a test key with a unique suffix to avoid conflicts between tests.
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Generate test data of various types
pub mod test_data {
    use super::json;

    /// Generate JSON test data
    pub fn json_user(id: u64) -> serde_json::Value {
        json!({
            "id": id,
            "name": format!("User {}", id),
            "email": format!("user{}@example.com", id),
            "active": true
        })
    }

    /// A nested value exercising every JSON shape
    pub fn json_kitchen_sink() -> serde_json::Value {
        json!({
            "string": "hello",
            "int": 42,
            "negative": -7,
            "float": 3.25,
            "bool": false,
            "null": null,
            "list": [1, "two", [3.0], {"four": 4}],
            "map": {"nested": {"deep": [true, null]}}
        })
    }
}
