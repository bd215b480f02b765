use super::{Ctx, INVALID_TOKEN};
use crate::marquee::{
    outcome::{AppError, Outcome},
    render,
    session::FLASH_SUCCESS,
    storage::{favorites, users},
    validator::Validator,
};

pub async fn show(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let user_id = ctx.user_id()?;
    let pool = &ctx.app.pool;

    let user = users::find_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let favorite_count = favorites::count_by_user(pool, user_id).await?;
    let favorites = favorites::by_user(pool, user_id).await?;

    let view = ctx.view()?;
    Ok(Outcome::page(render::profile(
        &view,
        &user,
        &favorites,
        favorite_count,
    )))
}

pub async fn edit_form(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let user_id = ctx.user_id()?;
    let user = users::find_by_id(&ctx.app.pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let form = ctx.form_state();
    let view = ctx.view()?;
    Ok(Outcome::page(render::profile_edit(&view, &user, &form)))
}

pub async fn update(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let user_id = ctx.user_id()?;

    if !ctx.csrf_ok() {
        return Ok(ctx.fail(INVALID_TOKEN, "/profile/edit"));
    }

    let result = Validator::new(&ctx.form)
        .required("name", Some("Name is required."))
        .max("name", 255, Some("Name must not exceed 255 characters."));

    if result.fails() {
        let errors = result.into_errors();
        return Ok(ctx.reject_input(errors, "/profile/edit"));
    }

    if !users::update_name(&ctx.app.pool, user_id, ctx.field("name").trim()).await? {
        return Err(AppError::NotFound);
    }

    ctx.session.clear_old_input();
    ctx.session
        .set_flash(FLASH_SUCCESS, "Profile updated successfully.");

    Ok(Outcome::redirect("/profile"))
}
