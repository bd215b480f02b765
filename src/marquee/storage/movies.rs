use std::collections::BTreeMap;

use sqlx::{FromRow, PgPool};

pub const PER_PAGE: i64 = 6;

const MOVIE_COLUMNS: &str =
    "m.id, m.title, m.description, m.release_year, m.rating, m.genre, m.poster_url";

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub release_year: Option<i32>,
    pub rating: Option<f64>,
    pub genre: String,
    pub poster_url: String,
}

/// A catalog row as seen by one viewer.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Listing {
    #[sqlx(flatten)]
    pub movie: Movie,
    pub is_favorited: bool,
}

/// Columns written by the admin create and update forms.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieInput {
    pub title: String,
    pub description: String,
    pub genre: String,
    pub release_year: Option<i32>,
    pub rating: Option<f64>,
    pub poster_url: String,
}

impl MovieInput {
    /// Build from an already validated form. Blank optional numbers become `NULL`.
    #[must_use]
    pub fn from_form(form: &BTreeMap<String, String>) -> Self {
        let text = |field: &str| form.get(field).map_or("", |v| v.trim()).to_string();
        let number = |field: &str| {
            form.get(field)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .and_then(|v| v.parse::<f64>().ok())
        };

        #[allow(clippy::cast_possible_truncation)]
        let release_year = if release_year_given(form) {
            number("release_year").map(|year| year.trunc() as i32)
        } else {
            None
        };

        Self {
            title: text("title"),
            description: text("description"),
            genre: text("genre"),
            release_year,
            rating: number("rating"),
            poster_url: text("poster_url"),
        }
    }
}

/// A blank or `0` release year means "unknown".
#[must_use]
pub fn release_year_given(form: &BTreeMap<String, String>) -> bool {
    !matches!(form.get("release_year").map(|v| v.trim()), None | Some("" | "0"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sort {
    #[default]
    RatingDesc,
    YearDesc,
    TitleAsc,
}

impl Sort {
    /// Unknown values fall back to the default ordering.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "year_desc" => Self::YearDesc,
            "title_asc" => Self::TitleAsc,
            _ => Self::RatingDesc,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RatingDesc => "rating_desc",
            Self::YearDesc => "year_desc",
            Self::TitleAsc => "title_asc",
        }
    }

    const fn order_by(self) -> &'static str {
        match self {
            Self::RatingDesc => "m.rating DESC NULLS LAST, m.id ASC",
            Self::YearDesc => "m.release_year DESC NULLS LAST, m.id ASC",
            Self::TitleAsc => "m.title ASC, m.id ASC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFilter {
    pub q: String,
    pub genre: String,
    pub sort: Sort,
    pub page: i64,
    pub per_page: i64,
}

impl Default for MovieFilter {
    fn default() -> Self {
        Self {
            q: String::new(),
            genre: String::new(),
            sort: Sort::default(),
            page: 1,
            per_page: PER_PAGE,
        }
    }
}

impl MovieFilter {
    #[must_use]
    pub fn from_query(query: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| query.get(key).map_or("", |v| v.trim());
        Self {
            q: get("q").to_string(),
            genre: get("genre").to_string(),
            sort: Sort::parse(get("sort")),
            page: get("page").parse::<i64>().unwrap_or(1).max(1),
            per_page: PER_PAGE,
        }
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    fn title_pattern(&self) -> Option<String> {
        (!self.q.is_empty()).then(|| like_pattern(&self.q))
    }

    fn genre_filter(&self) -> Option<&str> {
        (!self.genre.is_empty()).then_some(self.genre.as_str())
    }

    #[must_use]
    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.per_page - 1) / self.per_page
        }
    }
}

/// Case-insensitive substring pattern with `LIKE` wildcards escaped.
fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', r"\\")
        .replace('%', r"\%")
        .replace('_', r"\_");
    format!("%{escaped}%")
}

const FILTER_CLAUSE: &str = r"WHERE ($1::TEXT IS NULL OR m.title ILIKE $1 ESCAPE '\')
      AND ($2::TEXT IS NULL OR m.genre = $2)";

/// One page of the catalog, flagged with the viewer's favorites.
///
/// # Errors
/// Returns the database error.
pub async fn list(
    pool: &PgPool,
    filter: &MovieFilter,
    viewer: Option<i64>,
) -> Result<Vec<Listing>, sqlx::Error> {
    let sql = format!(
        "SELECT {MOVIE_COLUMNS},
            EXISTS (SELECT 1 FROM favorites f WHERE f.movie_id = m.id AND f.user_id = $3::BIGINT) AS is_favorited
         FROM movies m
         {FILTER_CLAUSE}
         ORDER BY {}
         LIMIT $4 OFFSET $5",
        filter.sort.order_by()
    );

    sqlx::query_as::<_, Listing>(&sql)
        .bind(filter.title_pattern())
        .bind(filter.genre_filter())
        .bind(viewer)
        .bind(filter.per_page)
        .bind(filter.offset())
        .fetch_all(pool)
        .await
}

/// # Errors
/// Returns the database error.
pub async fn count(pool: &PgPool, filter: &MovieFilter) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM movies m {FILTER_CLAUSE}");
    sqlx::query_scalar::<_, i64>(&sql)
        .bind(filter.title_pattern())
        .bind(filter.genre_filter())
        .fetch_one(pool)
        .await
}

/// # Errors
/// Returns the database error.
pub async fn genres(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT genre FROM movies WHERE genre <> '' ORDER BY genre ASC",
    )
    .fetch_all(pool)
    .await
}

/// # Errors
/// Returns the database error.
pub async fn find(pool: &PgPool, id: i64) -> Result<Option<Movie>, sqlx::Error> {
    let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies m WHERE m.id = $1");
    sqlx::query_as::<_, Movie>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Whole catalog for the admin table.
///
/// # Errors
/// Returns the database error.
pub async fn all(pool: &PgPool) -> Result<Vec<Movie>, sqlx::Error> {
    let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies m ORDER BY m.title ASC, m.id ASC");
    sqlx::query_as::<_, Movie>(&sql).fetch_all(pool).await
}

/// # Errors
/// Returns the database error.
pub async fn create(pool: &PgPool, input: &MovieInput) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO movies (title, description, release_year, rating, genre, poster_url)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.release_year)
    .bind(input.rating)
    .bind(&input.genre)
    .bind(&input.poster_url)
    .fetch_one(pool)
    .await
}

/// # Errors
/// Returns the database error.
pub async fn update(pool: &PgPool, id: i64, input: &MovieInput) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE movies
         SET title = $1, description = $2, release_year = $3, rating = $4, genre = $5,
             poster_url = $6, updated_at = NOW()
         WHERE id = $7",
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.release_year)
    .bind(input.rating)
    .bind(&input.genre)
    .bind(&input.poster_url)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// # Errors
/// Returns the database error.
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM movies WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn filter_defaults() {
        let filter = MovieFilter::from_query(&BTreeMap::new());
        assert_eq!(filter, MovieFilter::default());
        assert_eq!(filter.offset(), 0);
        assert_eq!(filter.title_pattern(), None);
        assert_eq!(filter.genre_filter(), None);
    }

    #[test]
    fn filter_parses_query() {
        let filter = MovieFilter::from_query(&map(&[
            ("q", "  alien "),
            ("genre", "Sci-Fi"),
            ("sort", "title_asc"),
            ("page", "3"),
        ]));
        assert_eq!(filter.q, "alien");
        assert_eq!(filter.genre_filter(), Some("Sci-Fi"));
        assert_eq!(filter.sort, Sort::TitleAsc);
        assert_eq!(filter.page, 3);
        assert_eq!(filter.offset(), 12);
        assert_eq!(filter.title_pattern().as_deref(), Some("%alien%"));
    }

    #[test]
    fn filter_clamps_page() {
        for page in ["0", "-4", "abc", ""] {
            let filter = MovieFilter::from_query(&map(&[("page", page)]));
            assert_eq!(filter.page, 1, "{page}");
        }
    }

    #[test]
    fn sort_round_trips_known_values() {
        for sort in [Sort::RatingDesc, Sort::YearDesc, Sort::TitleAsc] {
            assert_eq!(Sort::parse(sort.as_str()), sort);
        }
        assert_eq!(Sort::parse("random; DROP TABLE movies"), Sort::RatingDesc);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), r"%100\%%");
        assert_eq!(like_pattern("a_b"), r"%a\_b%");
        assert_eq!(like_pattern(r"c:\"), r"%c:\\%");
    }

    #[test]
    fn total_pages_rounds_up() {
        let filter = MovieFilter::default();
        assert_eq!(filter.total_pages(0), 0);
        assert_eq!(filter.total_pages(6), 1);
        assert_eq!(filter.total_pages(7), 2);
        assert_eq!(filter.total_pages(13), 3);
    }

    #[test]
    fn movie_input_from_form() {
        let input = MovieInput::from_form(&map(&[
            ("title", " Heat "),
            ("genre", "Crime"),
            ("release_year", "1995"),
            ("rating", "8.3"),
            ("description", ""),
        ]));
        assert_eq!(input.title, "Heat");
        assert_eq!(input.genre, "Crime");
        assert_eq!(input.release_year, Some(1995));
        assert_eq!(input.rating, Some(8.3));
        assert_eq!(input.description, "");
        assert_eq!(input.poster_url, "");

        let blank = MovieInput::from_form(&map(&[("release_year", ""), ("rating", " ")]));
        assert_eq!(blank.release_year, None);
        assert_eq!(blank.rating, None);
    }
}
