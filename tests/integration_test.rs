use promentity::error::{EngineError, ReconcileError, Result};

#[test]
fn test_error_types() {
    let err = EngineError::Query {
        endpoint: "http://prometheus:9090".to_string(),
        message: "connection refused".to_string(),
    };

    assert!(err.to_string().contains("http://prometheus:9090"));
    assert!(err.to_string().contains("connection refused"));

    let err = ReconcileError::MissingIdentifier {
        entity_type: "application".to_string(),
    };
    assert!(err.to_string().contains("application"));
}

#[test]
fn test_result_alias() {
    fn fails() -> Result<()> {
        Err(EngineError::UnsupportedEntityType("mainframe".to_string()))
    }
    assert!(fails().is_err());
}

#[test]
fn test_version_const() {
    assert!(!promentity::VERSION.is_empty());
}
