//! Shared fixtures for supervisor and login stage integration tests.
//!
//! Stage executables are stood in for by `sh -c` scripts that talk to the
//! runtime directory through `$PANTRY_RUNTIME_DIR`, exactly as the real
//! programs do.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pantry_session::auth::{AuthError, AuthFuture, Authenticator};
use pantry_session::config::{CommandSpec, GlobalConfig};
use pantry_session::login::surface::{LoginRequest, LoginSurface, Notice};
use pantry_session::Result;

/// `sh -c <script>`.
pub fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", &["-c", script])
}

/// Config rooted at `runtime_dir` with fast poll cadences, a one-second
/// grace period, and a keyboard command that never matches anything.
pub fn test_config(runtime_dir: &Path) -> GlobalConfig {
    let toml = format!(
        r#"
runtime_dir = '{dir}'

[login_stage]
command = "sh"
args = ["-c", "exec sleep 30"]

[main_stage]
command = "sh"
args = ["-c", "exec sleep 30"]

[classification_job]
command = "true"

[keyboard]
command = "false"
settle_ms = 0

[timing]
supervisor_poll_ms = 20
close_poll_ms = 20
logout_poll_ms = 10
grace_seconds = 1
"#,
        dir = runtime_dir.display(),
    );
    GlobalConfig::from_toml_str(&toml).expect("valid test config")
}

/// Poll `check` every 10ms until it returns true or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// In-memory identity provider.
#[derive(Debug, Default)]
pub struct FakeAuthenticator {
    accounts: Mutex<HashMap<String, String>>,
}

impl FakeAuthenticator {
    pub fn with_account(username: &str, password: &str) -> Self {
        let auth = Self::default();
        auth.accounts
            .lock()
            .unwrap()
            .insert(username.to_owned(), password.to_owned());
        auth
    }
}

impl Authenticator for FakeAuthenticator {
    fn sign_up<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        _email: &'a str,
    ) -> AuthFuture<'a, ()> {
        Box::pin(async move {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(username) {
                return Err(AuthError::Rejected("Username already taken.".into()));
            }
            accounts.insert(username.to_owned(), password.to_owned());
            Ok(())
        })
    }

    fn sign_in<'a>(&'a self, username: &'a str, password: &'a str) -> AuthFuture<'a, ()> {
        Box::pin(async move {
            match self.accounts.lock().unwrap().get(username) {
                None => Err(AuthError::UnknownUser),
                Some(stored) if stored == password => Ok(()),
                Some(_) => Err(AuthError::WrongPassword),
            }
        })
    }

    fn username_exists<'a>(&'a self, username: &'a str) -> AuthFuture<'a, bool> {
        Box::pin(async move { Ok(self.accounts.lock().unwrap().contains_key(username)) })
    }
}

/// What a [`ScriptedSurface`] recorded.
#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub notices: Vec<Notice>,
    pub hidden: bool,
}

/// Login surface that replays a fixed list of requests.
///
/// Once the script runs out it either reports the surface closed or, when
/// `hold_open` is set, blocks forever like an idle form.
pub struct ScriptedSurface {
    requests: VecDeque<LoginRequest>,
    hold_open: bool,
    log: Arc<Mutex<SurfaceLog>>,
}

impl ScriptedSurface {
    pub fn new(requests: Vec<LoginRequest>, hold_open: bool) -> (Self, Arc<Mutex<SurfaceLog>>) {
        let log = Arc::new(Mutex::new(SurfaceLog::default()));
        let surface = Self {
            requests: requests.into(),
            hold_open,
            log: Arc::clone(&log),
        };
        (surface, log)
    }
}

impl LoginSurface for ScriptedSurface {
    fn next_request(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<LoginRequest>>> + Send + '_>> {
        let next = self.requests.pop_front();
        let hold_open = self.hold_open;
        Box::pin(async move {
            match next {
                Some(request) => Ok(Some(request)),
                None if hold_open => std::future::pending().await,
                None => Ok(None),
            }
        })
    }

    fn notify(&mut self, notice: &Notice) {
        self.log.lock().unwrap().notices.push(notice.clone());
    }

    fn hide(&mut self) {
        self.log.lock().unwrap().hidden = true;
    }
}

pub fn sign_in(username: &str, password: &str) -> LoginRequest {
    LoginRequest::SignIn {
        username: username.into(),
        password: password.into(),
    }
}

pub fn sign_up(username: &str, password: &str, email: &str) -> LoginRequest {
    LoginRequest::SignUp {
        username: username.into(),
        password: password.into(),
        email: email.into(),
    }
}
