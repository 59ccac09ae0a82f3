use std::time::Duration;

use pantry_session::login::surface::{
    parse_command, Command, LineFuture, LineSource, LoginRequest, LoginSurface, Notice,
    TerminalSurface,
};
use tokio::sync::mpsc;

fn output_of<L>(surface: TerminalSurface<L, Vec<u8>>) -> String
where
    L: LineSource,
{
    String::from_utf8(surface.into_output()).expect("utf8 output")
}

#[test]
fn parses_login_and_signup() {
    assert_eq!(
        parse_command("login alice secret"),
        Command::Request(LoginRequest::SignIn {
            username: "alice".into(),
            password: "secret".into(),
        })
    );
    assert_eq!(
        parse_command("  signup bob pw bob@example.com "),
        Command::Request(LoginRequest::SignUp {
            username: "bob".into(),
            password: "pw".into(),
            email: "bob@example.com".into(),
        })
    );
}

#[test]
fn missing_fields_are_left_empty() {
    assert_eq!(
        parse_command("login alice"),
        Command::Request(LoginRequest::SignIn {
            username: "alice".into(),
            password: String::new(),
        })
    );
}

#[test]
fn parses_control_lines() {
    assert_eq!(parse_command("quit"), Command::Quit);
    assert_eq!(parse_command("exit"), Command::Quit);
    assert_eq!(parse_command("   "), Command::Empty);
    assert_eq!(parse_command("help me"), Command::Unknown("help".into()));
}

#[tokio::test]
async fn terminal_surface_skips_noise_until_a_request() {
    let input: &[u8] = b"\nhello\nlogin alice secret\nquit\nlogin never read\n";
    let mut surface = TerminalSurface::new(input, Vec::new());

    let first = surface.next_request().await.expect("read");
    assert_eq!(
        first,
        Some(LoginRequest::SignIn {
            username: "alice".into(),
            password: "secret".into(),
        })
    );
    assert_eq!(surface.next_request().await.expect("read"), None);

    let out = output_of(surface);
    assert!(out.starts_with("Smart Refrigerator\n"));
    assert!(out.contains("unknown command `hello`"));
    assert_eq!(out.matches("Smart Refrigerator").count(), 1);
}

#[tokio::test]
async fn end_of_input_closes_the_surface() {
    let input: &[u8] = b"";
    let mut surface = TerminalSurface::new(input, Vec::new());
    assert_eq!(surface.next_request().await.expect("read"), None);
}

#[test]
fn notices_are_rendered_with_titles() {
    let input: &[u8] = b"";
    let mut surface = TerminalSurface::new(input, Vec::new());

    surface.notify(&Notice::error("Login Failed", "Incorrect password."));
    surface.notify(&Notice::info("Signup", "Account created successfully!"));

    let out = output_of(surface);
    assert!(out.contains("[Login Failed] error: Incorrect password.\n"));
    assert!(out.contains("[Signup] Account created successfully!\n"));
}

#[test]
fn hide_marks_surface_hidden() {
    let input: &[u8] = b"";
    let mut surface = TerminalSurface::new(input, Vec::new());
    assert!(!surface.is_hidden());

    surface.hide();

    assert!(surface.is_hidden());
    assert!(output_of(surface).contains("main application running"));
}

/// Lines fed by the test over a channel, like the stdin reader thread.
struct ChannelLines(mpsc::Receiver<std::io::Result<String>>);

impl LineSource for ChannelLines {
    fn next_line(&mut self) -> LineFuture<'_> {
        Box::pin(async move { self.0.recv().await.transpose() })
    }
}

#[tokio::test]
async fn abandoned_read_loses_no_input() {
    let (tx, rx) = mpsc::channel(4);
    let mut surface = TerminalSurface::from_lines(ChannelLines(rx), Vec::new());

    let idle = tokio::time::timeout(Duration::from_millis(50), surface.next_request()).await;
    assert!(idle.is_err(), "no input yet");

    tx.send(Ok("login alice secret".into())).await.expect("send");
    let request = surface.next_request().await.expect("read");
    assert_eq!(
        request,
        Some(LoginRequest::SignIn {
            username: "alice".into(),
            password: "secret".into(),
        })
    );

    drop(tx);
    assert_eq!(surface.next_request().await.expect("read"), None);
    assert_eq!(output_of(surface).matches("Smart Refrigerator").count(), 1);
}

#[tokio::test]
async fn input_error_is_reported() {
    let (tx, rx) = mpsc::channel(1);
    tx.send(Err(std::io::Error::other("tty gone")))
        .await
        .expect("send");
    let mut surface = TerminalSurface::from_lines(ChannelLines(rx), Vec::new());

    let result = surface.next_request().await;
    assert!(matches!(result, Err(pantry_session::AppError::Io(_))));
}
