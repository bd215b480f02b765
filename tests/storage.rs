//! Storage tests against a real PostgreSQL.
//!
//! Set `MARQUEE_TEST_DSN` to a disposable database to run them; without it
//! every test returns early.

use anyhow::{Context, Result};
use marquee::marquee::{
    session::{generate_session_id, Session, FLASH_SUCCESS},
    storage::{
        self, favorites,
        movies::{self, MovieFilter, MovieInput},
        sessions::{hash_session_id, SessionStore},
        users::{self, NewUser},
    },
    validator::{UniqueLookup, Validator},
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{collections::BTreeMap, time::Duration};
use ulid::Ulid;

async fn pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = std::env::var("MARQUEE_TEST_DSN") else {
        eprintln!("MARQUEE_TEST_DSN not set, skipping");
        return Ok(None);
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&dsn).await?;
    storage::migrate(&pool).await?;
    Ok(Some(pool))
}

fn unique_email() -> String {
    format!("{}@example.test", Ulid::new().to_string().to_lowercase())
}

async fn new_user(pool: &PgPool, email: &str) -> Result<i64> {
    let created = users::create(
        pool,
        &NewUser {
            name: "Test User",
            email,
            password_hash: "$argon2id$placeholder",
        },
        false,
    )
    .await?;
    Ok(created.id)
}

async fn new_movie(pool: &PgPool, title: &str) -> Result<i64> {
    let input = MovieInput {
        title: title.to_string(),
        description: String::new(),
        genre: "Test".to_string(),
        release_year: Some(2001),
        rating: Some(7.5),
        poster_url: String::new(),
    };
    Ok(movies::create(pool, &input).await?)
}

#[tokio::test]
async fn adding_a_favorite_twice_keeps_one_row() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let user_id = new_user(&pool, &unique_email()).await?;
    let movie_id = new_movie(&pool, "Twice").await?;

    favorites::add(&pool, user_id, movie_id).await?;
    favorites::add(&pool, user_id, movie_id).await?;
    assert_eq!(favorites::count_by_user(&pool, user_id).await?, 1);
    assert!(favorites::exists(&pool, user_id, movie_id).await?);

    favorites::remove(&pool, user_id, movie_id).await?;
    favorites::remove(&pool, user_id, movie_id).await?;
    assert_eq!(favorites::count_by_user(&pool, user_id).await?, 0);

    movies::delete(&pool, movie_id).await?;
    Ok(())
}

#[tokio::test]
async fn favorites_are_listed_newest_first() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let user_id = new_user(&pool, &unique_email()).await?;
    let first = new_movie(&pool, "First").await?;
    let second = new_movie(&pool, "Second").await?;

    favorites::add(&pool, user_id, first).await?;
    favorites::add(&pool, user_id, second).await?;

    let listed: Vec<i64> = favorites::by_user(&pool, user_id)
        .await?
        .into_iter()
        .map(|favorite| favorite.movie.id)
        .collect();
    assert_eq!(listed, vec![second, first]);

    // deleting a movie removes it from every favorites list
    movies::delete(&pool, second).await?;
    assert_eq!(favorites::count_by_user(&pool, user_id).await?, 1);

    movies::delete(&pool, first).await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_a_unique_violation() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let email = unique_email();
    new_user(&pool, &email).await?;

    let err = users::create(
        &pool,
        &NewUser {
            name: "Again",
            email: &email,
            password_hash: "$argon2id$placeholder",
        },
        false,
    )
    .await
    .expect_err("second insert must fail");
    assert!(storage::is_unique_violation(&err));
    Ok(())
}

#[tokio::test]
async fn unique_rule_queries_the_users_table() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let email = unique_email();
    assert_eq!(pool.count_matching("users", "email", &email).await?, 0);
    new_user(&pool, &email).await?;
    assert_eq!(pool.count_matching("users", "email", &email).await?, 1);

    let form = BTreeMap::from([("email".to_string(), email)]);
    let result = Validator::new(&form)
        .unique("email", "users", "email", Some("This email is already registered."), &pool)
        .await?;
    assert_eq!(
        result.errors().get("email").map(String::as_str),
        Some("This email is already registered.")
    );
    Ok(())
}

#[tokio::test]
async fn listing_filters_by_title_and_flags_favorites() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let marker = Ulid::new().to_string();
    let user_id = new_user(&pool, &unique_email()).await?;
    let hit = new_movie(&pool, &format!("{marker} 100% Match")).await?;
    let other = new_movie(&pool, &format!("{marker} Other")).await?;
    favorites::add(&pool, user_id, hit).await?;

    let query = BTreeMap::from([("q".to_string(), format!("{} 100%", marker.to_lowercase()))]);
    let filter = MovieFilter::from_query(&query);

    assert_eq!(movies::count(&pool, &filter).await?, 1);
    let listings = movies::list(&pool, &filter, Some(user_id)).await?;
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].movie.id, hit);
    assert!(listings[0].is_favorited);

    let anonymous = movies::list(&pool, &filter, None).await?;
    assert!(!anonymous[0].is_favorited);

    assert!(movies::genres(&pool).await?.contains(&"Test".to_string()));

    movies::delete(&pool, hit).await?;
    movies::delete(&pool, other).await?;
    Ok(())
}

#[tokio::test]
async fn update_name_and_movie() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let user_id = new_user(&pool, &unique_email()).await?;
    assert!(users::update_name(&pool, user_id, "Renamed").await?);
    let user = users::find_by_id(&pool, user_id).await?;
    assert_eq!(user.map(|user| user.name).as_deref(), Some("Renamed"));

    let movie_id = new_movie(&pool, "Before").await?;
    let mut input = MovieInput::from_form(&BTreeMap::from([
        ("title".to_string(), "After".to_string()),
        ("genre".to_string(), "Drama".to_string()),
    ]));
    assert!(movies::update(&pool, movie_id, &input).await?);
    let movie = movies::find(&pool, movie_id).await?;
    assert_eq!(movie.map(|movie| movie.title).as_deref(), Some("After"));

    movies::delete(&pool, movie_id).await?;
    input.title = "Gone".to_string();
    assert!(!movies::update(&pool, movie_id, &input).await?);
    assert!(!movies::delete(&pool, movie_id).await?);
    Ok(())
}

#[tokio::test]
async fn sessions_survive_in_postgres_until_destroyed() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = SessionStore::postgres(pool.clone(), Duration::from_secs(60));
    let id = generate_session_id()?;

    let mut session = Session::default();
    session.establish(42, false);
    session.set_flash(FLASH_SUCCESS, "saved");
    session.set_old_input(
        BTreeMap::from([("email".to_string(), "a@b.c".to_string())]),
        BTreeMap::from([("email".to_string(), "bad".to_string())]),
    );
    store.save(&id, &session).await?;

    // a second store over the same database sees it, as after a restart
    let reopened = SessionStore::postgres(pool.clone(), Duration::from_secs(60));
    let loaded = reopened.load(&id).await?.context("session missing")?;
    assert_eq!(loaded.user_id(), Some(42));
    assert_eq!(loaded.flash(FLASH_SUCCESS), Some("saved"));
    assert_eq!(loaded.old_input("email"), Some("a@b.c"));

    // only the hash is stored
    let raw: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE session_hash = $1")
        .bind(id.as_bytes())
        .fetch_one(&pool)
        .await?;
    assert_eq!(raw, 0);
    let hashed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE session_hash = $1")
        .bind(hash_session_id(&id))
        .fetch_one(&pool)
        .await?;
    assert_eq!(hashed, 1);

    store.destroy(&id).await?;
    assert!(store.load(&id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn expired_sessions_are_not_loaded() -> Result<()> {
    let Some(pool) = pool().await? else {
        return Ok(());
    };
    let store = SessionStore::postgres(pool, Duration::ZERO);
    let id = generate_session_id()?;
    store.save(&id, &Session::default()).await?;
    assert!(store.load(&id).await?.is_none());
    assert!(store.purge_expired().await? >= 1);
    Ok(())
}
