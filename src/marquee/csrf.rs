//! CSRF tokens bound to the session.
//!
//! A token is minted the first time a form is rendered and stays the same until
//! the session is torn down. Every state-changing request must echo it back in
//! the `csrf_token` form field.

use super::session::Session;
use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

pub const CSRF_FIELD: &str = "csrf_token";

/// Return the session's token, minting one on first use.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn issue_token(session: &mut Session) -> Result<String> {
    if let Some(token) = session.csrf_token() {
        return Ok(token.to_string());
    }

    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate csrf token")?;
    let token = Base64UrlUnpadded::encode_string(&bytes);
    session.set_csrf_token(token.clone());

    Ok(token)
}

/// Compare the submitted token with the session's in constant time.
///
/// A session without a token never verifies, whatever was submitted.
#[must_use]
pub fn verify(session: &Session, submitted: &str) -> bool {
    session
        .csrf_token()
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(submitted.as_bytes())))
}

/// Verify the `csrf_token` field of a submitted form.
#[must_use]
pub fn verify_form(session: &Session, form: &BTreeMap<String, String>) -> bool {
    verify(session, form.get(CSRF_FIELD).map_or("", String::as_str))
}
