//! Host-side half of the host/sandbox data boundary.
//!
//! Page data crosses into the sandbox as a JSON transport string and is
//! parsed back into an engine-native value inside the context. Before
//! serialization the value is checked for prototype-pollution keys
//! (`__proto__`, `constructor`, `prototype`) and runaway nesting, since the
//! parsed object flows straight into user render functions.

use crate::error::{Error, Result};
use serde_json::Value;

/// Maximum recursion depth for nested objects/arrays
const MAX_DEPTH: usize = 32;

/// Keys that could be used for prototype pollution
const DANGEROUS_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Serialize page data to the transport string injected into the sandbox.
pub fn to_transport(data: &Value) -> Result<String> {
    check_value(data, 0)?;
    serde_json::to_string(data).map_err(|e| Error::Marshal {
        stage: "serialize",
        message: e.to_string(),
    })
}

fn check_value(value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::Marshal {
            stage: "serialize",
            message: format!("data nesting exceeds {} levels", MAX_DEPTH),
        });
    }

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                if DANGEROUS_KEYS.contains(&key.as_str()) {
                    return Err(Error::Marshal {
                        stage: "serialize",
                        message: format!("forbidden key '{}' in page data", key),
                    });
                }
                check_value(val, depth + 1)?;
            }
            Ok(())
        }
        Value::Array(arr) => {
            for val in arr {
                check_value(val, depth + 1)?;
            }
            Ok(())
        }
        // Primitives are safe
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_data_passes() {
        let data = json!({
            "counter": 0,
            "user": { "name": "Alice", "tags": ["a", "b"] },
            "items": [1, 2, { "nested": true }]
        });

        let transport = to_transport(&data).unwrap();
        let back: Value = serde_json::from_str(&transport).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_blocks_proto() {
        let data = json!({ "__proto__": { "polluted": true } });
        let err = to_transport(&data).unwrap_err();
        assert!(err.to_string().contains("__proto__"));
    }

    #[test]
    fn test_blocks_nested_constructor() {
        let data = json!({ "safe": { "constructor": { "prototype": {} } } });
        assert!(to_transport(&data).is_err());
    }

    #[test]
    fn test_blocks_proto_in_array() {
        let data = json!({ "items": [{ "ok": 1 }, { "__proto__": {} }] });
        assert!(to_transport(&data).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!({ "leaf": true });
        for _ in 0..35 {
            value = json!({ "nested": value });
        }

        let err = to_transport(&value).unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }
}
