use super::{Ctx, INVALID_TOKEN};
use crate::marquee::{
    outcome::{AppError, Outcome},
    session::FLASH_SUCCESS,
    storage::{favorites, movies},
};
use tracing::debug;

pub async fn add(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let user_id = ctx.user_id()?;
    let movie_id = ctx.id()?;
    let back = ctx.referer_path("/movies");

    if !ctx.csrf_ok() {
        return Ok(ctx.fail(INVALID_TOKEN, back));
    }

    if movies::find(&ctx.app.pool, movie_id).await?.is_none() {
        return Ok(ctx.fail("Movie not found.", "/movies"));
    }

    favorites::add(&ctx.app.pool, user_id, movie_id).await?;
    debug!(user_id, movie_id, "favorite added");

    ctx.session.set_flash(FLASH_SUCCESS, "Added to favorites!");
    Ok(Outcome::redirect(back))
}

pub async fn remove(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let user_id = ctx.user_id()?;
    let movie_id = ctx.id()?;
    let back = ctx.referer_path("/movies");

    if !ctx.csrf_ok() {
        return Ok(ctx.fail(INVALID_TOKEN, back));
    }

    favorites::remove(&ctx.app.pool, user_id, movie_id).await?;
    debug!(user_id, movie_id, "favorite removed");

    ctx.session
        .set_flash(FLASH_SUCCESS, "Removed from favorites.");
    Ok(Outcome::redirect(back))
}
