pub mod admin;
pub mod auth;
pub mod favorites;
pub mod health;
pub mod movies;
pub mod profile;

pub use self::health::health;

use super::{
    csrf,
    guard::is_local_path,
    outcome::{AppError, Outcome},
    render::View,
    session::{FormState, Session, FLASH_ERROR},
    AppState,
};
use anyhow::anyhow;
use axum::http::{header::REFERER, HeaderMap};
use std::{collections::BTreeMap, sync::Arc};
use url::Url;

pub(crate) const INVALID_TOKEN: &str = "Invalid security token.";

/// Fields never written back into the session with a rejected submission.
const NOT_REMEMBERED: &[&str] = &[csrf::CSRF_FIELD, "password", "password_confirmation"];

/// Everything a handler may read or change for one request.
#[derive(Debug)]
pub struct Ctx {
    pub app: Arc<AppState>,
    pub session: Session,
    pub path: String,
    pub id: Option<i64>,
    pub query: BTreeMap<String, String>,
    pub form: BTreeMap<String, String>,
    pub headers: HeaderMap,
}

impl Ctx {
    /// # Errors
    /// Returns an error if a CSRF token cannot be minted.
    pub fn view(&mut self) -> Result<View, AppError> {
        Ok(View::prepare(&mut self.session, &self.path)?)
    }

    #[must_use]
    pub fn form_state(&self) -> FormState {
        self.session.form_state()
    }

    #[must_use]
    pub fn csrf_ok(&self) -> bool {
        csrf::verify_form(&self.session, &self.form)
    }

    /// Flash an error and redirect without touching anything else.
    pub fn fail(&mut self, message: &str, location: impl Into<String>) -> Outcome {
        self.session.set_flash(FLASH_ERROR, message);
        Outcome::redirect(location)
    }

    /// Remember the submission and its errors, then send the browser back to the form.
    pub fn reject_input(
        &mut self,
        errors: BTreeMap<String, String>,
        location: impl Into<String>,
    ) -> Outcome {
        let input = self
            .form
            .iter()
            .filter(|(field, _)| !NOT_REMEMBERED.contains(&field.as_str()))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        self.session.set_old_input(input, errors);
        Outcome::redirect(location)
    }

    /// The `{id}` segment of the matched route.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when the route has no id.
    pub fn id(&self) -> Result<i64, AppError> {
        self.id.ok_or(AppError::NotFound)
    }

    /// Signed-in user id on routes behind the authenticated gate.
    ///
    /// # Errors
    /// Returns an internal error if the gate was bypassed.
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.session
            .user_id()
            .ok_or_else(|| AppError::Internal(anyhow!("no signed-in user on {}", self.path)))
    }

    #[must_use]
    pub fn field(&self, name: &str) -> &str {
        self.form.get(name).map_or("", String::as_str)
    }

    /// Local path of the `Referer` header, or `fallback`.
    #[must_use]
    pub fn referer_path(&self, fallback: &str) -> String {
        self.headers
            .get(REFERER)
            .and_then(|value| value.to_str().ok())
            .and_then(local_path)
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Reduce a referer to path and query so redirects never leave the site.
fn local_path(referer: &str) -> Option<String> {
    let path = if referer.starts_with('/') {
        referer.to_string()
    } else {
        let url = Url::parse(referer).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        }
    };
    is_local_path(&path).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_keeps_path_and_query() {
        assert_eq!(
            local_path("http://localhost:8080/movies?page=2").as_deref(),
            Some("/movies?page=2")
        );
        assert_eq!(local_path("/movies/4").as_deref(), Some("/movies/4"));
        assert_eq!(
            local_path("https://evil.example/").as_deref(),
            Some("/")
        );
    }

    #[test]
    fn local_path_rejects_foreign_targets() {
        assert_eq!(local_path("//evil.example/x"), None);
        assert_eq!(local_path(r"/\evil.example"), None);
        assert_eq!(local_path("javascript:alert(1)"), None);
        assert_eq!(local_path("not a url"), None);
    }

    #[test]
    fn local_path_rejects_control_characters() {
        assert_eq!(local_path("/\t/evil.example"), None);
        assert_eq!(local_path("/movies\nx"), None);
        assert_eq!(local_path("/movies x"), None);
        // parsed referers come back percent-encoded
        assert_eq!(
            local_path("http://localhost/movies?q=a b").as_deref(),
            Some("/movies?q=a%20b")
        );
    }
}
