//! Display format of `AppError` variants.

use mosaic_sessions::AppError;

#[test]
fn no_active_session_display() {
    assert_eq!(AppError::NoActiveSession.to_string(), "no active session");
}

#[test]
fn operation_in_progress_names_the_operation() {
    let err = AppError::OperationInProgress("load_surface".into());
    assert_eq!(err.to_string(), "operation in progress: load_surface");
}

#[test]
fn resource_exhausted_display() {
    let err = AppError::ResourceExhausted("3 sessions still draining".into());
    assert_eq!(
        err.to_string(),
        "resource exhausted: 3 sessions still draining"
    );
}

#[test]
fn messages_have_no_trailing_period() {
    let errors = [
        AppError::NoActiveSession,
        AppError::OperationInProgress("x".into()),
        AppError::ResourceExhausted("x".into()),
        AppError::Config("x".into()),
        AppError::Protocol("x".into()),
        AppError::Io("x".into()),
    ];
    for err in errors {
        let s = err.to_string();
        assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
    }
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io.into();
    assert_eq!(err.to_string(), "io: pipe closed");
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::NoActiveSession);
}
