//! Fallback handler driving every page request:
//! session load, route, authorize, run the handler, session save.

use super::{
    guard::{self, Denial},
    handlers::{admin, auth, favorites, movies, profile, Ctx},
    outcome::{AppError, Outcome},
    render::{self, View},
    routes::{normalize, Access, Endpoint},
    session::{self, generate_session_id, Session},
    AppState,
};
use axum::{
    body::Bytes,
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{debug, error};

pub async fn dispatch(
    Extension(app): Extension<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // an id the store does not know is never reused
    let (session_id, session) = match session::extract_session_id(&headers) {
        Some(id) => match app.sessions.load(&id).await {
            Ok(Some(session)) => (Some(id), session),
            Ok(None) => (None, Session::default()),
            Err(err) => {
                error!("{err:#}");
                return server_error();
            }
        },
        None => (None, Session::default()),
    };

    let path = normalize(uri.path()).to_string();
    let mut ctx = Ctx {
        app: app.clone(),
        session,
        path,
        id: None,
        query: parse_pairs(uri.query().unwrap_or_default().as_bytes()),
        form: if method == Method::POST {
            parse_pairs(&body)
        } else {
            BTreeMap::new()
        },
        headers,
    };

    let outcome = match route(&mut ctx, &method).await {
        Ok(outcome) => outcome,
        Err(AppError::NotFound) => not_found(&mut ctx),
        Err(err) => {
            error!("{} {} failed: {err}", method, ctx.path);
            return server_error();
        }
    };

    persist(&app, session_id, ctx.session, outcome).await
}

async fn route(ctx: &mut Ctx, method: &Method) -> Result<Outcome, AppError> {
    let Some(matched) = ctx.app.routes.resolve(method, &ctx.path) else {
        debug!("no route for {} {}", method, ctx.path);
        return Err(AppError::NotFound);
    };
    ctx.id = matched.id;

    if let Err(denial) = authorize(&mut ctx.session, matched.access, &ctx.path) {
        return match denial {
            Denial::Login { location } | Denial::SignedIn { location } => {
                Ok(Outcome::redirect(location))
            }
            Denial::Forbidden => {
                let view = ctx.view()?;
                Ok(Outcome::with_status(
                    StatusCode::FORBIDDEN,
                    render::forbidden(&view),
                ))
            }
        };
    }

    match matched.endpoint {
        Endpoint::Home => movies::home(ctx).await,
        Endpoint::RegisterForm => auth::register_form(ctx).await,
        Endpoint::Register => auth::register(ctx).await,
        Endpoint::LoginForm => auth::login_form(ctx).await,
        Endpoint::Login => auth::login(ctx).await,
        Endpoint::Logout => auth::logout(ctx).await,
        Endpoint::Profile => profile::show(ctx).await,
        Endpoint::ProfileEditForm => profile::edit_form(ctx).await,
        Endpoint::ProfileUpdate => profile::update(ctx).await,
        Endpoint::MovieIndex => movies::index(ctx).await,
        Endpoint::MovieShow => movies::show(ctx).await,
        Endpoint::FavoriteAdd => favorites::add(ctx).await,
        Endpoint::FavoriteRemove => favorites::remove(ctx).await,
        Endpoint::AdminHome => admin::home(ctx).await,
        Endpoint::AdminMovieIndex => admin::index(ctx).await,
        Endpoint::AdminMovieCreateForm => admin::create_form(ctx).await,
        Endpoint::AdminMovieCreate => admin::create(ctx).await,
        Endpoint::AdminMovieEditForm => admin::edit_form(ctx).await,
        Endpoint::AdminMovieUpdate => admin::update(ctx).await,
        Endpoint::AdminMovieDelete => admin::delete(ctx).await,
    }
}

fn authorize(session: &mut Session, access: Access, path: &str) -> Result<(), Denial> {
    match access {
        Access::Public => Ok(()),
        Access::Guest => guard::require_guest(session),
        Access::Authenticated => guard::require_authenticated(session, path).map(|_| ()),
        Access::Admin => guard::require_admin(session, path).map(|_| ()),
    }
}

fn not_found(ctx: &mut Ctx) -> Outcome {
    match View::prepare(&mut ctx.session, &ctx.path) {
        Ok(view) => Outcome::with_status(StatusCode::NOT_FOUND, render::not_found(&view)),
        Err(err) => {
            error!("failed to prepare view: {err}");
            Outcome::with_status(StatusCode::INTERNAL_SERVER_ERROR, render::server_error())
        }
    }
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(render::server_error()),
    )
        .into_response()
}

/// Write the session back and attach its cookie, rotating the id after a
/// login, registration or logout. A new visitor whose session holds nothing
/// gets no cookie and no stored row.
async fn persist(
    app: &AppState,
    session_id: Option<String>,
    mut session: Session,
    outcome: Outcome,
) -> Response {
    let rotate = session.take_regenerate();

    if session_id.is_none() && session.is_blank() {
        return outcome.into_response();
    }

    let id = match session_id {
        Some(id) if !rotate => id,
        previous => {
            if let Some(previous) = previous {
                if let Err(err) = app.sessions.destroy(&previous).await {
                    error!("{err:#}");
                    return server_error();
                }
                debug!("session id rotated");
            }
            match generate_session_id() {
                Ok(id) => id,
                Err(err) => {
                    error!("failed to create session: {err}");
                    return server_error();
                }
            }
        }
    };

    if let Err(err) = app.sessions.save(&id, &session).await {
        error!("{err:#}");
        return server_error();
    }

    let ttl = Duration::from_secs(app.globals.session_ttl_seconds);
    let mut response = outcome.into_response();
    match session::session_cookie(&id, ttl, app.globals.secure_cookies) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("failed to build session cookie: {err}"),
    }
    response
}

fn parse_pairs(input: &[u8]) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(input).into_owned().collect()
}
