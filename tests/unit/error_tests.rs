//! Display format of `AppError` and `AuthError`.

use pantry_session::auth::AuthError;
use pantry_session::AppError;

#[test]
fn variants_have_distinct_prefixes() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Spawn("x".into()), "spawn: x"),
        (AppError::SentinelIo("x".into()), "sentinel io: x"),
        (AppError::Process("x".into()), "process: x"),
        (AppError::JobLaunch("x".into()), "job launch: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn auth_errors_read_as_user_messages() {
    assert_eq!(AuthError::UnknownUser.to_string(), "Username does not exist.");
    assert_eq!(AuthError::WrongPassword.to_string(), "Incorrect password.");
    assert_eq!(
        AuthError::MissingFields("Both fields are required!".into()).to_string(),
        "Both fields are required!"
    );
    assert_eq!(
        AuthError::Rejected("Username already taken.".into()).to_string(),
        "Username already taken."
    );
    assert!(AuthError::Unavailable("timeout".into())
        .to_string()
        .contains("timeout"));
}

#[test]
fn auth_error_converts_into_app_error() {
    let err: AppError = AuthError::WrongPassword.into();
    assert!(matches!(err, AppError::Auth(AuthError::WrongPassword)));
    assert_eq!(err.to_string(), "auth: Incorrect password.");
}

#[test]
fn app_error_implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Io("x".into()));
    assert_error(&AuthError::UnknownUser);
}
