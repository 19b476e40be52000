//! Tests for error types

use std::path::PathBuf;

use runledger::Error;

#[test]
fn test_reserved_name_error() {
    let error = Error::ReservedName("items".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("'items'"));
    assert!(error_str.contains("reserved"));
}

#[test]
fn test_unknown_parameter_error() {
    let error = Error::UnknownParameter("lr".to_string());
    assert!(format!("{error}").contains("'lr'"));
}

#[test]
fn test_unsupported_directive_error() {
    let error = Error::UnsupportedDirective("!foo(1,2)".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("!foo(1,2)"));
    assert!(error_str.contains("!uni(a,b)"));
}

#[test]
fn test_malformed_directive_error() {
    let error = Error::MalformedDirective {
        directive: "!uni(1)".to_string(),
        reason: "expected two comma-separated arguments".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("!uni(1)"));
    assert!(error_str.contains("two comma-separated"));
}

#[test]
fn test_eval_disabled_error() {
    let error = Error::EvalDisabled("!eval(1)".to_string());
    assert!(format!("{error}").contains("allow_eval(true)"));
}

#[test]
fn test_non_integer_prefix_error() {
    let error = Error::NonIntegerPrefix {
        file: "notes.txt".to_string(),
        dir: PathBuf::from("/data/results"),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("notes.txt"));
    assert!(error_str.contains("/data/results"));
    assert!(error_str.contains("ignore list"));
}

#[test]
fn test_lock_timeout_error() {
    let error = Error::LockTimeout(PathBuf::from("/data/results/.runledger.lock"));
    assert!(format!("{error}").contains("lock timeout"));
}

#[test]
fn test_id_exhausted_error() {
    let error = Error::IdExhausted(PathBuf::from("/data/results"));
    let error_str = format!("{error}");
    assert!(error_str.contains("/data/results"));
    assert!(error_str.contains("u64::MAX"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    assert!(format!("{error}").contains("IO error"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    assert_eq!(format!("{error}"), "custom error message");
}

#[test]
fn test_error_debug() {
    let error = Error::UnknownParameter("x".to_string());
    assert!(format!("{error:?}").contains("UnknownParameter"));
}

#[test]
fn test_result_type_alias_error() {
    fn returns_error() -> runledger::Result<i32> {
        Err(Error::Other("test error".to_string()))
    }

    assert!(returns_error().is_err());
}
