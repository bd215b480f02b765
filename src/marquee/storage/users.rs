use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub joined_on: String,
}

/// What login needs to check a password.
#[derive(Debug, Clone, FromRow)]
pub struct Credentials {
    pub id: i64,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedUser {
    pub id: i64,
    pub is_admin: bool,
}

/// Bootstrap policy: with the option enabled, the account created while the
/// table is empty becomes the administrator.
#[must_use]
pub const fn grants_admin(existing_users: i64, bootstrap_admin: bool) -> bool {
    bootstrap_admin && existing_users == 0
}

/// Insert a user, deciding the admin flag against a count taken under a table
/// lock so two concurrent first registrations cannot both become admin.
///
/// # Errors
/// Returns the database error, including a unique violation on `email`.
pub async fn create(
    pool: &PgPool,
    user: &NewUser<'_>,
    bootstrap_admin: bool,
) -> Result<CreatedUser, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    let is_admin = grants_admin(existing, bootstrap_admin);

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (name, email, password_hash, is_admin) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(user.name)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(is_admin)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(CreatedUser { id, is_admin })
}

/// # Errors
/// Returns the database error.
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, name, email, is_admin, to_char(created_at, 'YYYY-MM-DD') AS joined_on FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// # Errors
/// Returns the database error.
pub async fn find_credentials(
    pool: &PgPool,
    email: &str,
) -> Result<Option<Credentials>, sqlx::Error> {
    sqlx::query_as::<_, Credentials>(
        "SELECT id, password_hash, is_admin FROM users WHERE email = $1 LIMIT 1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

/// # Errors
/// Returns the database error.
pub async fn update_name(pool: &PgPool, id: i64, name: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET name = $1, updated_at = NOW() WHERE id = $2")
        .bind(name)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_first_user_is_granted_admin() {
        assert!(grants_admin(0, true));
        assert!(!grants_admin(1, true));
        assert!(!grants_admin(0, false));
        assert!(!grants_admin(5, false));
    }
}
