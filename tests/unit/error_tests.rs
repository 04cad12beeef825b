//! Unit tests for `AppError` display format and conversions.

use pilot_orchestrator::errors::LimitKind;
use pilot_orchestrator::AppError;

#[test]
fn display_prefixes_identify_the_variant() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Conflict("busy".into()), "conflict: busy"),
        (AppError::NotFound("task".into()), "not found: task"),
        (AppError::Classifier("timeout".into()), "classifier: timeout"),
        (AppError::Executor("crashed".into()), "executor: crashed"),
        (AppError::Transport("closed".into()), "transport: closed"),
        (AppError::Store("full".into()), "store: full"),
        (AppError::Unauthorized("who".into()), "unauthorized: who"),
        (AppError::Io("eof".into()), "io: eof"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn rate_limited_names_the_bucket() {
    assert_eq!(
        AppError::RateLimited(LimitKind::Message).to_string(),
        "rate limited: message limit exceeded"
    );
    assert_eq!(
        AppError::RateLimited(LimitKind::Task).to_string(),
        "rate limited: task limit exceeded"
    );
}

#[test]
fn error_messages_have_no_trailing_period() {
    let err = AppError::Executor("timed out after 30s".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(_)));
    assert!(err.to_string().contains("missing file"));
}

#[test]
fn toml_errors_convert_to_config() {
    let parse = toml::from_str::<toml::Value>("key = [").expect_err("invalid toml");
    let err: AppError = parse.into();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: invalid config"));
}
