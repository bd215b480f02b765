use super::Ctx;
use crate::marquee::{
    outcome::{AppError, Outcome},
    render::{self, MoviePage},
    storage::{
        favorites,
        movies::{self, MovieFilter},
    },
};

pub async fn home(_ctx: &mut Ctx) -> Result<Outcome, AppError> {
    Ok(Outcome::redirect("/movies"))
}

pub async fn index(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let filter = MovieFilter::from_query(&ctx.query);
    let viewer = ctx.session.user_id();
    let pool = &ctx.app.pool;

    let listings = movies::list(pool, &filter, viewer).await?;
    let total = movies::count(pool, &filter).await?;
    let genres = movies::genres(pool).await?;

    let view = ctx.view()?;
    Ok(Outcome::page(render::movie_index(
        &view,
        &MoviePage {
            listings: &listings,
            genres: &genres,
            filter: &filter,
            total,
        },
    )))
}

pub async fn show(ctx: &mut Ctx) -> Result<Outcome, AppError> {
    let movie_id = ctx.id()?;
    let movie = movies::find(&ctx.app.pool, movie_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let is_favorited = match ctx.session.user_id() {
        Some(user_id) => favorites::exists(&ctx.app.pool, user_id, movie_id).await?,
        None => false,
    };

    let view = ctx.view()?;
    Ok(Outcome::page(render::movie_show(&view, &movie, is_favorited)))
}
