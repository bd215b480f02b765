//! HTML documents. Every interpolated value goes through [`escape`].

use super::{
    csrf::{self, CSRF_FIELD},
    session::{FormState, Identity, Session, FLASH_ERROR, FLASH_SUCCESS},
    storage::{
        favorites::Favorite,
        movies::{Listing, Movie, MovieFilter},
        users::User,
    },
};
use anyhow::Result;
use std::collections::BTreeMap;
use url::form_urlencoded;

const SITE_NAME: &str = "Marquee";

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:0;display:flex;flex-direction:column;min-height:100vh}\
nav{background:#212529;padding:.75rem 1.5rem;display:flex;gap:1rem;align-items:center}\
nav a,nav button{color:#dee2e6;text-decoration:none;background:none;border:0;font:inherit;cursor:pointer}\
nav a.active{color:#fff;font-weight:600}nav .spacer{flex:1}\
main{flex:1;max-width:70rem;width:100%;margin:1.5rem auto;padding:0 1rem;box-sizing:border-box}\
.flash{max-width:70rem;margin:1rem auto 0;padding:.75rem 1rem;border-radius:.25rem}\
.flash-success{background:#d1e7dd}.flash-error{background:#f8d7da}\
.grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(16rem,1fr));gap:1rem}\
.card{border:1px solid #dee2e6;border-radius:.5rem;padding:1rem}\
.card img{width:100%;height:18rem;object-fit:cover}\
.field{margin-bottom:1rem}.field label{display:block;margin-bottom:.25rem}\
.invalid{color:#dc3545;font-size:.875rem}\
table{border-collapse:collapse;width:100%}td,th{border-bottom:1px solid #dee2e6;padding:.5rem;text-align:left}\
footer{background:#212529;color:#adb5bd;text-align:center;padding:1rem}";

/// Escape text for element content and double- or single-quoted attributes.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Ambient values every document needs: who is looking, pending flash
/// messages, and the CSRF token for the forms on the page.
#[derive(Debug, Clone)]
pub struct View {
    identity: Identity,
    flash: BTreeMap<String, String>,
    csrf_token: String,
    path: String,
}

impl View {
    /// Consumes the session's flash messages; call once per rendered document.
    ///
    /// # Errors
    /// Returns an error if a CSRF token has to be minted and the OS random
    /// source fails.
    pub fn prepare(session: &mut Session, path: &str) -> Result<Self> {
        let csrf_token = csrf::issue_token(session)?;
        Ok(Self {
            identity: session.identity(),
            flash: session.consume_flash(),
            csrf_token,
            path: path.to_string(),
        })
    }

    #[must_use]
    pub fn csrf_field(&self) -> String {
        format!(
            r#"<input type="hidden" name="{CSRF_FIELD}" value="{}">"#,
            escape(&self.csrf_token)
        )
    }

    fn nav_link(&self, href: &str, label: &str, prefix: bool) -> String {
        let active = if prefix {
            self.path.starts_with(href)
        } else {
            self.path == href
        };
        format!(
            r#"<a href="{href}"{}>{label}</a>"#,
            if active { r#" class="active""# } else { "" }
        )
    }

    fn post_button(&self, action: &str, label: &str) -> String {
        format!(
            r#"<form action="{}" method="POST" style="display:inline">{}<button type="submit">{}</button></form>"#,
            escape(action),
            self.csrf_field(),
            escape(label)
        )
    }
}

/// Wrap page content in the site layout.
#[must_use]
pub fn layout(view: &View, title: &str, content: &str) -> String {
    let mut nav = vec![view.nav_link("/movies", "Movies", true)];
    if view.identity.is_admin() {
        nav.push(view.nav_link("/admin/movies", "Admin", true));
    }
    nav.push(r#"<span class="spacer"></span>"#.to_string());
    match view.identity {
        Identity::User { .. } => {
            nav.push(view.nav_link("/profile", "Profile", false));
            nav.push(view.post_button("/logout", "Logout"));
        }
        Identity::Anonymous => {
            nav.push(view.nav_link("/login", "Login", false));
            nav.push(view.nav_link("/register", "Register", false));
        }
    }

    let flash: String = [(FLASH_SUCCESS, "flash-success"), (FLASH_ERROR, "flash-error")]
        .iter()
        .filter_map(|(category, class)| {
            view.flash.get(*category).map(|message| {
                format!(
                    r#"<div class="flash {class}" role="alert">{}</div>"#,
                    escape(message)
                )
            })
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title} | {SITE_NAME}</title>
<style>{STYLE}</style>
</head>
<body>
<nav><a href="/movies"><strong>{SITE_NAME}</strong></a>{nav}</nav>
{flash}
<main>
{content}
</main>
<footer>{SITE_NAME} movie catalog</footer>
</body>
</html>
"#,
        title = escape(title),
        nav = nav.concat(),
    )
}

fn field_error(form: &FormState, field: &str) -> String {
    form.error(field).map_or_else(String::new, |message| {
        format!(r#"<div class="invalid">{}</div>"#, escape(message))
    })
}

fn input(form: &FormState, field: &str, label: &str, kind: &str, value: &str) -> String {
    format!(
        r#"<div class="field"><label for="{field}">{label}</label><input id="{field}" name="{field}" type="{kind}" value="{value}">{error}</div>"#,
        value = escape(value),
        error = field_error(form, field),
    )
}

/// Old input wins over the stored value so a rejected edit is shown again.
fn value_or<'a>(form: &'a FormState, field: &str, stored: &'a str) -> &'a str {
    form.old_input.get(field).map_or(stored, String::as_str)
}

fn rating_label(rating: Option<f64>) -> String {
    rating.map_or_else(|| "n/a".to_string(), |rating| format!("{rating:.1}"))
}

fn year_label(year: Option<i32>) -> String {
    year.map_or_else(String::new, |year| year.to_string())
}

fn poster(movie: &Movie) -> String {
    if movie.poster_url.is_empty() {
        String::new()
    } else {
        format!(
            r#"<img src="{}" alt="{}">"#,
            escape(&movie.poster_url),
            escape(&movie.title)
        )
    }
}

fn favorite_toggle(view: &View, movie_id: i64, is_favorited: bool) -> String {
    if view.identity.user_id().is_none() {
        return String::new();
    }
    if is_favorited {
        view.post_button(&format!("/movies/{movie_id}/unfavorite"), "Remove from favorites")
    } else {
        view.post_button(&format!("/movies/{movie_id}/favorite"), "Add to favorites")
    }
}

fn movie_card(view: &View, movie: &Movie, is_favorited: bool) -> String {
    format!(
        r#"<div class="card"><a href="/movies/{id}">{poster}</a><h3><a href="/movies/{id}">{title}</a></h3><p>{year} {genre} &#9733; {rating}</p>{toggle}</div>"#,
        id = movie.id,
        poster = poster(movie),
        title = escape(&movie.title),
        year = year_label(movie.release_year),
        genre = escape(&movie.genre),
        rating = rating_label(movie.rating),
        toggle = favorite_toggle(view, movie.id, is_favorited),
    )
}

/// One page of catalog results plus what the filter form needs.
#[derive(Debug)]
pub struct MoviePage<'a> {
    pub listings: &'a [Listing],
    pub genres: &'a [String],
    pub filter: &'a MovieFilter,
    pub total: i64,
}

fn page_href(filter: &MovieFilter, page: i64) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if !filter.q.is_empty() {
        query.append_pair("q", &filter.q);
    }
    if !filter.genre.is_empty() {
        query.append_pair("genre", &filter.genre);
    }
    query.append_pair("sort", filter.sort.as_str());
    query.append_pair("page", &page.to_string());
    format!("/movies?{}", query.finish())
}

fn pagination(filter: &MovieFilter, total: i64) -> String {
    let total_pages = filter.total_pages(total);
    if total_pages <= 1 {
        return String::new();
    }

    // up to five page links centered on the current page
    let start = (filter.page - 2).clamp(1, (total_pages - 4).max(1));
    let end = (start + 4).min(total_pages);

    let mut links = Vec::new();
    if filter.page > 1 {
        links.push(format!(
            r#"<a href="{}">Previous</a>"#,
            escape(&page_href(filter, filter.page - 1))
        ));
    }
    for page in start..=end {
        if page == filter.page {
            links.push(format!("<strong>{page}</strong>"));
        } else {
            links.push(format!(
                r#"<a href="{}">{page}</a>"#,
                escape(&page_href(filter, page))
            ));
        }
    }
    if filter.page < total_pages {
        links.push(format!(
            r#"<a href="{}">Next</a>"#,
            escape(&page_href(filter, filter.page + 1))
        ));
    }
    format!(r#"<nav class="pagination">{}</nav>"#, links.join(" "))
}

#[must_use]
pub fn movie_index(view: &View, page: &MoviePage<'_>) -> String {
    let genre_options: String = page
        .genres
        .iter()
        .map(|genre| {
            format!(
                r#"<option value="{value}"{selected}>{value}</option>"#,
                value = escape(genre),
                selected = if *genre == page.filter.genre { " selected" } else { "" },
            )
        })
        .collect();

    let sort_options: String = [
        ("rating_desc", "Top rated"),
        ("year_desc", "Newest"),
        ("title_asc", "Title A-Z"),
    ]
    .iter()
    .map(|(value, label)| {
        format!(
            r#"<option value="{value}"{selected}>{label}</option>"#,
            selected = if *value == page.filter.sort.as_str() { " selected" } else { "" },
        )
    })
    .collect();

    let cards: String = if page.listings.is_empty() {
        "<p>No movies found.</p>".to_string()
    } else {
        format!(
            r#"<div class="grid">{}</div>"#,
            page.listings
                .iter()
                .map(|listing| movie_card(view, &listing.movie, listing.is_favorited))
                .collect::<String>()
        )
    };

    let content = format!(
        r#"<h1>Movies</h1>
<form action="/movies" method="GET">
<input type="search" name="q" placeholder="Search titles" value="{q}">
<select name="genre"><option value="">All genres</option>{genre_options}</select>
<select name="sort">{sort_options}</select>
<button type="submit">Filter</button>
</form>
<p>{total} movie(s)</p>
{cards}
{pagination}"#,
        q = escape(&page.filter.q),
        total = page.total,
        pagination = pagination(page.filter, page.total),
    );
    layout(view, "Movies", &content)
}

#[must_use]
pub fn movie_show(view: &View, movie: &Movie, is_favorited: bool) -> String {
    let content = format!(
        r#"<p><a href="/movies">&larr; Back to movies</a></p>
<article>
{poster}
<h1>{title}</h1>
<p>{year} &middot; {genre} &middot; &#9733; {rating}</p>
<p>{description}</p>
{toggle}
</article>"#,
        poster = poster(movie),
        title = escape(&movie.title),
        year = year_label(movie.release_year),
        genre = escape(&movie.genre),
        rating = rating_label(movie.rating),
        description = escape(&movie.description),
        toggle = favorite_toggle(view, movie.id, is_favorited),
    );
    layout(view, &movie.title, &content)
}

#[must_use]
pub fn login(view: &View, form: &FormState, return_to: &str) -> String {
    let content = format!(
        r#"<h1>Login</h1>
<form action="/login" method="POST">
{csrf}
<input type="hidden" name="return_to" value="{return_to}">
{email}
{password}
<button type="submit">Login</button>
</form>
<p>No account yet? <a href="/register">Register</a></p>"#,
        csrf = view.csrf_field(),
        return_to = escape(return_to),
        email = input(form, "email", "Email", "email", form.old("email")),
        password = input(form, "password", "Password", "password", ""),
    );
    layout(view, "Login", &content)
}

#[must_use]
pub fn register(view: &View, form: &FormState) -> String {
    let content = format!(
        r#"<h1>Register</h1>
<form action="/register" method="POST">
{csrf}
{name}
{email}
{password}
{confirmation}
<button type="submit">Create account</button>
</form>
<p>Already registered? <a href="/login">Login</a></p>"#,
        csrf = view.csrf_field(),
        name = input(form, "name", "Name", "text", form.old("name")),
        email = input(form, "email", "Email", "email", form.old("email")),
        password = input(form, "password", "Password", "password", ""),
        confirmation = input(
            form,
            "password_confirmation",
            "Confirm password",
            "password",
            ""
        ),
    );
    layout(view, "Register", &content)
}

#[must_use]
pub fn profile(view: &View, user: &User, favorites: &[Favorite], favorite_count: i64) -> String {
    let list = if favorites.is_empty() {
        r#"<p>No favorites yet. <a href="/movies">Browse movies</a></p>"#.to_string()
    } else {
        format!(
            r#"<div class="grid">{}</div>"#,
            favorites
                .iter()
                .map(|favorite| movie_card(view, &favorite.movie, true))
                .collect::<String>()
        )
    };

    let content = format!(
        r#"<h1>{name}</h1>
<p>{email}{role}</p>
<p>Member since {joined}</p>
<p><a href="/profile/edit">Edit profile</a></p>
<h2>Favorites ({favorite_count})</h2>
{list}"#,
        name = escape(&user.name),
        email = escape(&user.email),
        role = if user.is_admin { " &middot; Administrator" } else { "" },
        joined = escape(&user.joined_on),
    );
    layout(view, "Profile", &content)
}

#[must_use]
pub fn profile_edit(view: &View, user: &User, form: &FormState) -> String {
    let content = format!(
        r#"<h1>Edit profile</h1>
<form action="/profile/edit" method="POST">
{csrf}
{name}
<p>Email: {email}</p>
<button type="submit">Save</button>
<a href="/profile">Cancel</a>
</form>"#,
        csrf = view.csrf_field(),
        name = input(form, "name", "Name", "text", value_or(form, "name", &user.name)),
        email = escape(&user.email),
    );
    layout(view, "Edit profile", &content)
}

#[must_use]
pub fn admin_movies(view: &View, movies: &[Movie]) -> String {
    let rows: String = movies
        .iter()
        .map(|movie| {
            format!(
                r#"<tr><td><a href="/movies/{id}">{title}</a></td><td>{year}</td><td>{genre}</td><td>{rating}</td><td><a href="/admin/movies/{id}/edit">Edit</a> {delete}</td></tr>"#,
                id = movie.id,
                title = escape(&movie.title),
                year = year_label(movie.release_year),
                genre = escape(&movie.genre),
                rating = rating_label(movie.rating),
                delete = view.post_button(&format!("/admin/movies/{}/delete", movie.id), "Delete"),
            )
        })
        .collect();

    let content = format!(
        r#"<h1>Manage movies</h1>
<p><a href="/admin/movies/create">Add movie</a></p>
<table>
<thead><tr><th>Title</th><th>Year</th><th>Genre</th><th>Rating</th><th></th></tr></thead>
<tbody>{rows}</tbody>
</table>"#
    );
    layout(view, "Admin", &content)
}

/// Create form when `movie` is `None`, edit form otherwise.
#[must_use]
pub fn admin_movie_form(view: &View, movie: Option<&Movie>, form: &FormState) -> String {
    let (title, action, submit) = match movie {
        Some(movie) => ("Edit movie", format!("/admin/movies/{}", movie.id), "Update"),
        None => ("Add movie", "/admin/movies".to_string(), "Create"),
    };

    let year = movie
        .map(|movie| year_label(movie.release_year))
        .unwrap_or_default();
    let rating = movie
        .and_then(|movie| movie.rating)
        .map(|rating| rating.to_string())
        .unwrap_or_default();
    let stored_title = movie.map_or("", |movie| movie.title.as_str());
    let stored_description = movie.map_or("", |movie| movie.description.as_str());
    let stored_genre = movie.map_or("", |movie| movie.genre.as_str());
    let stored_poster = movie.map_or("", |movie| movie.poster_url.as_str());

    let content = format!(
        r#"<h1>{title}</h1>
<form action="{action}" method="POST">
{csrf}
{title_field}
<div class="field"><label for="description">Description</label><textarea id="description" name="description" rows="4">{description}</textarea>{description_error}</div>
{genre}
{release_year}
{rating}
{poster_url}
<button type="submit">{submit}</button>
<a href="/admin/movies">Cancel</a>
</form>"#,
        action = escape(&action),
        csrf = view.csrf_field(),
        title_field = input(
            form,
            "title",
            "Title",
            "text",
            value_or(form, "title", stored_title)
        ),
        description = escape(value_or(form, "description", stored_description)),
        description_error = field_error(form, "description"),
        genre = input(
            form,
            "genre",
            "Genre",
            "text",
            value_or(form, "genre", stored_genre)
        ),
        release_year = input(
            form,
            "release_year",
            "Release year",
            "text",
            value_or(form, "release_year", &year)
        ),
        rating = input(form, "rating", "Rating (0-10)", "text", value_or(form, "rating", &rating)),
        poster_url = input(
            form,
            "poster_url",
            "Poster URL",
            "url",
            value_or(form, "poster_url", stored_poster)
        ),
    );
    layout(view, title, &content)
}

#[must_use]
pub fn forbidden(view: &View) -> String {
    layout(
        view,
        "Access denied",
        r#"<h1>403</h1><p>You do not have permission to access this page.</p><p><a href="/movies">Back to movies</a></p>"#,
    )
}

#[must_use]
pub fn not_found(view: &View) -> String {
    layout(
        view,
        "Not found",
        r#"<h1>404</h1><p>The page you are looking for does not exist.</p><p><a href="/movies">Back to movies</a></p>"#,
    )
}

/// Rendered without session data; nothing about the failure is shown.
#[must_use]
pub fn server_error() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Server error | {SITE_NAME}</title><style>{STYLE}</style></head>
<body><main><h1>500</h1><p>Something went wrong. Please try again later.</p><p><a href="/movies">Back to movies</a></p></main></body>
</html>
"#
    )
}
