use super::{Ctx, INVALID_TOKEN};
use crate::marquee::{
    guard::{login_location, safe_return_to},
    outcome::{AppError, Outcome},
    password, render,
    session::FLASH_SUCCESS,
    storage::{
        is_unique_violation,
        users::{self, NewUser},
    },
    validator::Validator,
};
use std::collections::BTreeMap;
use tracing::{info, instrument};

const EMAIL_TAKEN: &str = "This email is already registered.";
const BAD_CREDENTIALS: &str = "Invalid email or password.";
const TRY_AGAIN: &str = "Invalid security token. Please try again.";

pub async fn register_form(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let form = ctx.form_state();
    let view = ctx.view()?;
    Ok(Outcome::page(render::register(&view, &form)))
}

#[instrument(skip(ctx))]
pub async fn register(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    if !ctx.csrf_ok() {
        return Ok(ctx.fail(TRY_AGAIN, "/register"));
    }

    let result = Validator::new(&ctx.form)
        .required("name", Some("Name is required."))
        .max("name", 255, Some("Name must not exceed 255 characters."))
        .required("email", Some("Email is required."))
        .email("email", Some("Please enter a valid email address."))
        .unique("email", "users", "email", Some(EMAIL_TAKEN), &ctx.app.pool)
        .await?
        .required("password", Some("Password is required."))
        .min("password", 8, Some("Password must be at least 8 characters."))
        .confirmed("password", Some("Password confirmation does not match."));

    if result.fails() {
        let errors = result.into_errors();
        return Ok(ctx.reject_input(errors, "/register"));
    }

    let password_hash = password::hash_password(ctx.field("password"))?;
    let new_user = NewUser {
        name: ctx.field("name").trim(),
        email: ctx.field("email").trim(),
        password_hash: &password_hash,
    };

    let created = match users::create(&ctx.app.pool, &new_user, ctx.app.globals.bootstrap_admin).await {
        Ok(created) => created,
        // lost the race against a concurrent registration
        Err(err) if is_unique_violation(&err) => {
            let errors = BTreeMap::from([("email".to_string(), EMAIL_TAKEN.to_string())]);
            return Ok(ctx.reject_input(errors, "/register"));
        }
        Err(err) => return Err(err.into()),
    };

    info!(user_id = created.id, is_admin = created.is_admin, "user registered");

    ctx.session.establish(created.id, created.is_admin);
    ctx.session.clear_old_input();
    ctx.session
        .set_flash(FLASH_SUCCESS, "Welcome! Your account has been created.");

    Ok(Outcome::redirect("/movies"))
}

pub async fn login_form(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let return_to = ctx
        .query
        .get("return_to")
        .and_then(|value| safe_return_to(value))
        .unwrap_or_default()
        .to_string();
    let form = ctx.form_state();
    let view = ctx.view()?;
    Ok(Outcome::page(render::login(&view, &form, &return_to)))
}

#[instrument(skip(ctx))]
pub async fn login(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let return_to = safe_return_to(ctx.field("return_to"))
        .unwrap_or_default()
        .to_string();
    let back = login_location(&return_to);

    if !ctx.csrf_ok() {
        return Ok(ctx.fail(TRY_AGAIN, back));
    }

    let result = Validator::new(&ctx.form)
        .required("email", Some("Email is required."))
        .email("email", Some("Please enter a valid email address."))
        .required("password", Some("Password is required."));

    if result.fails() {
        let errors = result.into_errors();
        return Ok(ctx.reject_input(errors, back));
    }

    let credentials = users::find_credentials(&ctx.app.pool, ctx.field("email").trim()).await?;
    let verified = match &credentials {
        Some(credentials) => {
            password::verify_password(ctx.field("password"), &credentials.password_hash)?
        }
        None => false,
    };

    let Some(credentials) = credentials.filter(|_| verified) else {
        info!("login rejected");
        let errors = BTreeMap::from([("email".to_string(), BAD_CREDENTIALS.to_string())]);
        return Ok(ctx.reject_input(errors, back));
    };

    info!(user_id = credentials.id, "user logged in");

    ctx.session.establish(credentials.id, credentials.is_admin);
    ctx.session.clear_old_input();
    ctx.session.set_flash(FLASH_SUCCESS, "Welcome back!");

    if return_to.is_empty() {
        Ok(Outcome::redirect("/movies"))
    } else {
        Ok(Outcome::redirect(return_to))
    }
}

pub async fn logout(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    if !ctx.csrf_ok() {
        return Ok(ctx.fail(INVALID_TOKEN, "/movies"));
    }

    if let Some(user_id) = ctx.session.user_id() {
        info!(user_id, "user logged out");
    }

    ctx.session.teardown();
    ctx.session
        .set_flash(FLASH_SUCCESS, "You have been logged out.");

    Ok(Outcome::redirect("/movies"))
}
