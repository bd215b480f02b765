use super::{Ctx, INVALID_TOKEN};
use crate::marquee::{
    outcome::{AppError, Outcome},
    render,
    session::FLASH_SUCCESS,
    storage::movies::{self, release_year_given, MovieInput},
    validator::Validator,
};
use std::collections::BTreeMap;
use tracing::info;

/// Rules shared by the create and update forms. Optional fields are only
/// checked when filled in; a release year of `0` counts as not given.
fn validate_movie(form: &BTreeMap<String, String>) -> Validator<'_> {
    let mut result = Validator::new(form)
        .required("title", Some("Title is required."))
        .max("title", 255, Some("Title must not exceed 255 characters."))
        .required("genre", Some("Genre is required."))
        .max("genre", 100, Some("Genre must not exceed 100 characters."));

    if release_year_given(form) {
        result = result
            .numeric("release_year", Some("Release year must be a number."))
            .between(
                "release_year",
                1888.0,
                2030.0,
                Some("Release year must be between 1888 and 2030."),
            );
    }

    result
        .numeric("rating", Some("Rating must be a number."))
        .between("rating", 0.0, 10.0, Some("Rating must be between 0 and 10."))
        .url("poster_url", Some("Poster URL must be a valid URL."))
}

pub async fn home(_ctx: &mut Ctx) -> Result<Outcome, AppError> {
    Ok(Outcome::redirect("/admin/movies"))
}

pub async fn index(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let movies = movies::all(&ctx.app.pool).await?;
    let view = ctx.view()?;
    Ok(Outcome::page(render::admin_movies(&view, &movies)))
}

pub async fn create_form(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let form = ctx.form_state();
    let view = ctx.view()?;
    Ok(Outcome::page(render::admin_movie_form(&view, None, &form)))
}

pub async fn create(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    if !ctx.csrf_ok() {
        return Ok(ctx.fail(INVALID_TOKEN, "/admin/movies/create"));
    }

    let result = validate_movie(&ctx.form);
    if result.fails() {
        let errors = result.into_errors();
        return Ok(ctx.reject_input(errors, "/admin/movies/create"));
    }

    let movie_id = movies::create(&ctx.app.pool, &MovieInput::from_form(&ctx.form)).await?;
    info!(movie_id, "movie created");

    ctx.session.clear_old_input();
    ctx.session
        .set_flash(FLASH_SUCCESS, "Movie created successfully.");
    Ok(Outcome::redirect("/admin/movies"))
}

pub async fn edit_form(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let movie = movies::find(&ctx.app.pool, ctx.id()?)
        .await?
        .ok_or(AppError::NotFound)?;

    let form = ctx.form_state();
    let view = ctx.view()?;
    Ok(Outcome::page(render::admin_movie_form(
        &view,
        Some(&movie),
        &form,
    )))
}

pub async fn update(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let movie_id = ctx.id()?;
    if movies::find(&ctx.app.pool, movie_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let back = format!("/admin/movies/{movie_id}/edit");
    if !ctx.csrf_ok() {
        return Ok(ctx.fail(INVALID_TOKEN, back));
    }

    let result = validate_movie(&ctx.form);
    if result.fails() {
        let errors = result.into_errors();
        return Ok(ctx.reject_input(errors, back));
    }

    if !movies::update(&ctx.app.pool, movie_id, &MovieInput::from_form(&ctx.form)).await? {
        return Err(AppError::NotFound);
    }
    info!(movie_id, "movie updated");

    ctx.session.clear_old_input();
    ctx.session
        .set_flash(FLASH_SUCCESS, "Movie updated successfully.");
    Ok(Outcome::redirect("/admin/movies"))
}

pub async fn delete(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let movie_id = ctx.id()?;

    if !ctx.csrf_ok() {
        return Ok(ctx.fail(INVALID_TOKEN, "/admin/movies"));
    }

    if !movies::delete(&ctx.app.pool, movie_id).await? {
        return Ok(ctx.fail("Movie not found.", "/admin/movies"));
    }
    info!(movie_id, "movie deleted");

    ctx.session
        .set_flash(FLASH_SUCCESS, "Movie deleted successfully.");
    Ok(Outcome::redirect("/admin/movies"))
}
