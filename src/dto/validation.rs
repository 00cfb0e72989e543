//! Validation helpers for DTOs.

use validator::ValidationError;

/// Upper bound on the serialized size of a submitted connection path.
const MAX_CONNECTIONS_BYTES: usize = 16 * 1024;

/// Validates that a connection path is a non-empty JSON array of bounded size.
///
/// The path itself is opaque to the server; only its shape is checked.
pub fn validate_connections(connections: &serde_json::Value) -> Result<(), ValidationError> {
    let Some(steps) = connections.as_array() else {
        let mut err = ValidationError::new("connections_type");
        err.message = Some("Connections must be a JSON array".into());
        return Err(err);
    };

    if steps.is_empty() {
        let mut err = ValidationError::new("connections_empty");
        err.message = Some("Connections must contain at least one step".into());
        return Err(err);
    }

    let size = connections.to_string().len();
    if size > MAX_CONNECTIONS_BYTES {
        let mut err = ValidationError::new("connections_size");
        err.message = Some(
            format!("Connections must not exceed {MAX_CONNECTIONS_BYTES} bytes (got {size})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_validate_connections_valid() {
        assert!(validate_connections(&json!([{ "movieId": 13, "actorId": 31 }])).is_ok());
    }

    #[test]
    fn test_validate_connections_invalid_shape() {
        assert!(validate_connections(&json!({ "movieId": 13 })).is_err());
        assert!(validate_connections(&json!([])).is_err());
        assert!(validate_connections(&json!(null)).is_err());
    }

    #[test]
    fn test_validate_connections_too_large() {
        let huge = json!(["x".repeat(MAX_CONNECTIONS_BYTES)]);
        assert!(validate_connections(&huge).is_err());
    }
}
