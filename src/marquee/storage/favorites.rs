use super::movies::Movie;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Favorite {
    #[sqlx(flatten)]
    pub movie: Movie,
    pub favorited_on: String,
}

/// Favoriting twice is a no-op, not an error.
///
/// # Errors
/// Returns the database error.
pub async fn add(pool: &PgPool, user_id: i64, movie_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO favorites (user_id, movie_id) VALUES ($1, $2) ON CONFLICT (user_id, movie_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(movie_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Removing a favorite that does not exist is not an error either.
///
/// # Errors
/// Returns the database error.
pub async fn remove(pool: &PgPool, user_id: i64, movie_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND movie_id = $2")
        .bind(user_id)
        .bind(movie_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// # Errors
/// Returns the database error.
pub async fn exists(pool: &PgPool, user_id: i64, movie_id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM favorites WHERE user_id = $1 AND movie_id = $2)",
    )
    .bind(user_id)
    .bind(movie_id)
    .fetch_one(pool)
    .await
}

/// # Errors
/// Returns the database error.
pub async fn count_by_user(pool: &PgPool, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM favorites WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Newest favorites first.
///
/// # Errors
/// Returns the database error.
pub async fn by_user(pool: &PgPool, user_id: i64) -> Result<Vec<Favorite>, sqlx::Error> {
    sqlx::query_as::<_, Favorite>(
        "SELECT m.id, m.title, m.description, m.release_year, m.rating, m.genre, m.poster_url,
                to_char(f.created_at, 'YYYY-MM-DD') AS favorited_on
         FROM favorites f
         INNER JOIN movies m ON m.id = f.movie_id
         WHERE f.user_id = $1
         ORDER BY f.created_at DESC, m.id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
