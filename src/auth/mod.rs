//! Identity-provider abstraction used by the login stage.
//!
//! The [`Authenticator`] trait decouples the login flow from the concrete
//! identity provider. Password rules, secret hashing, and retries belong to
//! the provider; this crate only maps its answers onto [`AuthError`]
//! values that can be shown to the user as-is.

pub mod command;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Authenticator`] methods.
pub type AuthFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, AuthError>> + Send + 'a>>;

/// User-facing authentication failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No account exists for the username.
    UnknownUser,
    /// The account exists but the password is wrong.
    WrongPassword,
    /// Required form fields were left empty.
    MissingFields(String),
    /// The provider rejected the request; the message comes from the provider.
    Rejected(String),
    /// The provider could not be reached.
    Unavailable(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownUser => f.write_str("Username does not exist."),
            Self::WrongPassword => f.write_str("Incorrect password."),
            Self::MissingFields(msg) | Self::Rejected(msg) => f.write_str(msg),
            Self::Unavailable(msg) => write!(f, "Identity provider unavailable: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Sign-up / sign-in operations offered by the identity provider.
pub trait Authenticator: Send + Sync {
    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] when the provider refuses the account
    /// (duplicate name, password policy) and [`AuthError::Unavailable`] when
    /// it cannot be reached.
    fn sign_up<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        email: &'a str,
    ) -> AuthFuture<'a, ()>;

    /// Verify a username/password pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownUser`], [`AuthError::WrongPassword`], or a
    /// provider-specific rejection.
    fn sign_in<'a>(&'a self, username: &'a str, password: &'a str) -> AuthFuture<'a, ()>;

    /// Whether an account exists for `username`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unavailable`] or [`AuthError::Rejected`] when the
    /// lookup itself fails.
    fn username_exists<'a>(&'a self, username: &'a str) -> AuthFuture<'a, bool>;
}
