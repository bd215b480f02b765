//! Access gates run before a handler.
//!
//! Gates never touch the store. The only side effect is the "please login"
//! flash written when an anonymous visitor is sent to the login form.

use super::session::{Session, FLASH_ERROR};

pub const LOGIN_REQUIRED: &str = "Please login to continue.";

/// Why a gate stopped the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Anonymous visitor; send them to the login form.
    Login { location: String },
    /// Signed in but not an administrator; answer 403.
    Forbidden,
    /// Signed in on a guest-only page.
    SignedIn { location: String },
}

/// Pass with the signed-in user id, or set the login flash and deny.
///
/// # Errors
/// Returns [`Denial::Login`] carrying `/login?return_to=<path>`.
pub fn require_authenticated(session: &mut Session, path: &str) -> Result<i64, Denial> {
    match session.user_id() {
        Some(user_id) => Ok(user_id),
        None => {
            session.set_flash(FLASH_ERROR, LOGIN_REQUIRED);
            Err(Denial::Login {
                location: login_location(path),
            })
        }
    }
}

/// # Errors
/// Anonymous visitors get [`Denial::Login`]; other users get
/// [`Denial::Forbidden`] without any flash.
pub fn require_admin(session: &mut Session, path: &str) -> Result<i64, Denial> {
    let user_id = require_authenticated(session, path)?;
    if session.is_admin() {
        Ok(user_id)
    } else {
        Err(Denial::Forbidden)
    }
}

/// # Errors
/// Returns [`Denial::SignedIn`] pointing at the catalog when a user is signed in.
pub fn require_guest(session: &Session) -> Result<(), Denial> {
    if session.user_id().is_some() {
        Err(Denial::SignedIn {
            location: "/movies".to_string(),
        })
    } else {
        Ok(())
    }
}

/// `/login`, carrying `return_to` when there is somewhere to go back to.
#[must_use]
pub fn login_location(return_to: &str) -> String {
    if return_to.is_empty() {
        return "/login".to_string();
    }
    let encoded: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
    format!("/login?return_to={encoded}")
}

/// Only local absolute paths are followed after login.
///
/// Browsers drop tabs and newlines inside a `Location` before resolving it,
/// so `/\t/host` would become `//host`; any byte outside visible ASCII is
/// refused.
#[must_use]
pub fn safe_return_to(candidate: &str) -> Option<&str> {
    let candidate = candidate.trim();
    is_local_path(candidate).then_some(candidate)
}

/// Absolute path on this site made only of visible ASCII.
#[must_use]
pub fn is_local_path(candidate: &str) -> bool {
    candidate.starts_with('/')
        && !candidate.starts_with("//")
        && candidate
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b'\\')
}
