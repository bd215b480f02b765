//! Per-browser session state and the flash/old-input channel, carried by the
//! `marquee_session` cookie. Persistence lives in [`super::storage::sessions`].

use anyhow::{Context, Result};
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

pub const SESSION_COOKIE_NAME: &str = "marquee_session";

pub const FLASH_SUCCESS: &str = "success";
pub const FLASH_ERROR: &str = "error";

// 32 random bytes, base64url without padding.
const SESSION_ID_LEN: usize = 43;

/// Who is making the request, derived from the session on every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User { user_id: i64, is_admin: bool },
}

impl Identity {
    #[must_use]
    pub fn user_id(self) -> Option<i64> {
        match self {
            Self::Anonymous => None,
            Self::User { user_id, .. } => Some(user_id),
        }
    }

    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::User { is_admin: true, .. })
    }
}

/// The last rejected submission of a form, read back when the form renders again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormState {
    pub old_input: BTreeMap<String, String>,
    pub errors: BTreeMap<String, String>,
}

impl FormState {
    #[must_use]
    pub fn old(&self, field: &str) -> &str {
        self.old_input.get(field).map_or("", String::as_str)
    }

    #[must_use]
    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    user_id: Option<i64>,
    is_admin: bool,
    csrf_token: Option<String>,
    flash: BTreeMap<String, String>,
    old_input: BTreeMap<String, String>,
    errors: BTreeMap<String, String>,
    #[serde(skip)]
    regenerate: bool,
}

impl Session {
    #[must_use]
    pub fn identity(&self) -> Identity {
        match self.user_id {
            Some(user_id) => Identity::User {
                user_id,
                is_admin: self.is_admin,
            },
            None => Identity::Anonymous,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Record a successful login or registration.
    ///
    /// The session id is rotated when the session is written back, so nothing
    /// written during this request is stored under the pre-login id.
    pub fn establish(&mut self, user_id: i64, is_admin: bool) {
        self.user_id = Some(user_id);
        self.is_admin = is_admin;
        self.regenerate = true;
    }

    /// Clear every field, including the CSRF token. The id is rotated as well.
    pub fn teardown(&mut self) {
        *self = Self {
            regenerate: true,
            ..Self::default()
        };
    }

    pub(crate) fn take_regenerate(&mut self) -> bool {
        std::mem::take(&mut self.regenerate)
    }

    #[must_use]
    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub(crate) fn set_csrf_token(&mut self, token: String) {
        self.csrf_token = Some(token);
    }

    /// Overwrite the message for `category`; other categories are untouched.
    pub fn set_flash(&mut self, category: &str, message: impl Into<String>) {
        self.flash.insert(category.to_string(), message.into());
    }

    #[must_use]
    pub fn flash(&self, category: &str) -> Option<&str> {
        self.flash.get(category).map(String::as_str)
    }

    /// Return every pending flash message and clear them.
    pub fn consume_flash(&mut self) -> BTreeMap<String, String> {
        std::mem::take(&mut self.flash)
    }

    /// Remember a rejected submission together with its field errors.
    pub fn set_old_input(
        &mut self,
        input: BTreeMap<String, String>,
        errors: BTreeMap<String, String>,
    ) {
        self.old_input = input;
        self.errors = errors;
    }

    /// Forget the last rejected submission and its errors.
    pub fn clear_old_input(&mut self) {
        self.old_input.clear();
        self.errors.clear();
    }

    #[must_use]
    pub fn old_input(&self, field: &str) -> Option<&str> {
        self.old_input.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// Copy of the last rejected submission for a form being rendered. It
    /// stays in the session until a successful submission clears it.
    #[must_use]
    pub fn form_state(&self) -> FormState {
        FormState {
            old_input: self.old_input.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Nothing worth a cookie: no identity, token, flash or form state.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.user_id.is_none()
            && self.csrf_token.is_none()
            && self.flash.is_empty()
            && self.old_input.is_empty()
            && self.errors.is_empty()
    }
}

/// Generate a new opaque session id.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn generate_session_id() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session id")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Build the `HttpOnly` cookie carrying the session id.
pub(crate) fn session_cookie(
    id: &str,
    ttl: Duration,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Read the session id from the `Cookie` header, ignoring malformed values.
pub(crate) fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME && well_formed(val.trim()) {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

fn well_formed(id: &str) -> bool {
    id.len() == SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn identity_follows_user_fields() {
        let mut session = Session::default();
        assert_eq!(session.identity(), Identity::Anonymous);

        session.establish(7, false);
        assert_eq!(
            session.identity(),
            Identity::User {
                user_id: 7,
                is_admin: false
            }
        );
        assert_eq!(session.identity().user_id(), Some(7));
        assert!(!session.identity().is_admin());
        assert!(session.take_regenerate());
        assert!(!session.take_regenerate());
    }

    #[test]
    fn flash_categories_are_independent() {
        let mut session = Session::default();
        session.set_flash(FLASH_ERROR, "first");
        session.set_flash(FLASH_SUCCESS, "saved");
        session.set_flash(FLASH_ERROR, "second");

        assert_eq!(session.flash(FLASH_ERROR), Some("second"));
        assert_eq!(session.flash(FLASH_SUCCESS), Some("saved"));

        let flash = session.consume_flash();
        assert_eq!(flash.len(), 2);
        assert!(session.consume_flash().is_empty());
    }

    #[test]
    fn old_input_and_errors_move_together() {
        let mut session = Session::default();
        session.set_old_input(
            fields(&[("name", "")]),
            fields(&[("name", "Name is required.")]),
        );
        assert_eq!(session.old_input("name"), Some(""));
        assert_eq!(session.errors().len(), 1);

        session.clear_old_input();
        assert_eq!(session.old_input("name"), None);
        assert!(session.errors().is_empty());

        session.set_old_input(fields(&[("title", "Heat")]), fields(&[("genre", "x")]));
        let state = session.form_state();
        assert_eq!(state.old("title"), "Heat");
        assert_eq!(state.old("missing"), "");
        assert_eq!(state.error("genre"), Some("x"));

        // rendering does not expire the snapshot
        assert_eq!(session.form_state(), state);
        assert_eq!(session.old_input("title"), Some("Heat"));
        assert_eq!(session.errors().len(), 1);
    }

    #[test]
    fn blank_until_something_is_stored() {
        let mut session = Session::default();
        assert!(session.is_blank());
        session.set_flash(FLASH_SUCCESS, "hi");
        assert!(!session.is_blank());
        session.consume_flash();
        assert!(session.is_blank());
        session.establish(3, false);
        assert!(!session.is_blank());
    }

    #[test]
    fn serialized_session_keeps_fields_but_not_rotation() {
        let mut session = Session::default();
        session.establish(5, true);
        session.set_csrf_token("token".to_string());
        session.set_old_input(fields(&[("email", "a@b.c")]), fields(&[("email", "bad")]));

        let json = serde_json::to_string(&session).unwrap();
        let mut restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.identity(), session.identity());
        assert_eq!(restored.csrf_token(), Some("token"));
        assert_eq!(restored.old_input("email"), Some("a@b.c"));
        assert!(!restored.take_regenerate());

        let empty: Session = serde_json::from_str("{}").unwrap();
        assert!(empty.is_blank());
    }

    #[test]
    fn teardown_clears_everything() {
        let mut session = Session::default();
        session.establish(1, true);
        session.set_csrf_token("token".to_string());
        session.set_flash(FLASH_SUCCESS, "hi");
        session.teardown();

        assert_eq!(session.identity(), Identity::Anonymous);
        assert_eq!(session.csrf_token(), None);
        assert_eq!(session.flash(FLASH_SUCCESS), None);
        assert!(session.take_regenerate());
    }

    #[test]
    fn session_ids_are_well_formed_and_distinct() {
        let a = generate_session_id().unwrap();
        let b = generate_session_id().unwrap();
        assert_eq!(a.len(), SESSION_ID_LEN);
        assert!(well_formed(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn extract_session_id_reads_cookie() {
        let id = generate_session_id().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE_NAME}={id}")).unwrap(),
        );
        assert_eq!(extract_session_id(&headers), Some(id));
    }

    #[test]
    fn extract_session_id_rejects_malformed_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("marquee_session=short"),
        );
        assert_eq!(extract_session_id(&headers), None);
        assert_eq!(extract_session_id(&HeaderMap::new()), None);
    }

    #[test]
    fn session_cookie_sets_attributes() {
        let cookie = session_cookie("abc", Duration::from_secs(60), false).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("marquee_session=abc;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Max-Age=60"));
        assert!(!value.contains("Secure"));

        let secure = session_cookie("abc", Duration::from_secs(60), true).unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
    }
}
