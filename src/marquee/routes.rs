//! Declarative route table, compiled once at startup.

use axum::http::Method;
use regex::Regex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Only for visitors who are not signed in.
    Guest,
    Authenticated,
    Admin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Home,
    RegisterForm,
    Register,
    LoginForm,
    Login,
    Logout,
    Profile,
    ProfileEditForm,
    ProfileUpdate,
    MovieIndex,
    MovieShow,
    FavoriteAdd,
    FavoriteRemove,
    AdminHome,
    AdminMovieIndex,
    AdminMovieCreateForm,
    AdminMovieCreate,
    AdminMovieEditForm,
    AdminMovieUpdate,
    AdminMovieDelete,
}

const ROUTES: &[(&str, &str, Endpoint, Access)] = &[
    ("GET", "/", Endpoint::Home, Access::Public),
    ("GET", "/register", Endpoint::RegisterForm, Access::Guest),
    ("POST", "/register", Endpoint::Register, Access::Guest),
    ("GET", "/login", Endpoint::LoginForm, Access::Guest),
    ("POST", "/login", Endpoint::Login, Access::Guest),
    ("POST", "/logout", Endpoint::Logout, Access::Public),
    ("GET", "/profile", Endpoint::Profile, Access::Authenticated),
    ("GET", "/profile/edit", Endpoint::ProfileEditForm, Access::Authenticated),
    ("POST", "/profile/edit", Endpoint::ProfileUpdate, Access::Authenticated),
    ("GET", "/movies", Endpoint::MovieIndex, Access::Public),
    ("GET", "/movies/{id}", Endpoint::MovieShow, Access::Public),
    ("POST", "/movies/{id}/favorite", Endpoint::FavoriteAdd, Access::Authenticated),
    ("POST", "/movies/{id}/unfavorite", Endpoint::FavoriteRemove, Access::Authenticated),
    ("GET", "/admin", Endpoint::AdminHome, Access::Admin),
    ("GET", "/admin/movies", Endpoint::AdminMovieIndex, Access::Admin),
    ("GET", "/admin/movies/create", Endpoint::AdminMovieCreateForm, Access::Admin),
    ("POST", "/admin/movies", Endpoint::AdminMovieCreate, Access::Admin),
    ("GET", "/admin/movies/{id}/edit", Endpoint::AdminMovieEditForm, Access::Admin),
    ("POST", "/admin/movies/{id}", Endpoint::AdminMovieUpdate, Access::Admin),
    ("POST", "/admin/movies/{id}/delete", Endpoint::AdminMovieDelete, Access::Admin),
];

#[derive(Debug)]
struct Route {
    method: Method,
    pattern: Regex,
    endpoint: Endpoint,
    access: Access,
}

/// A resolved request: where it goes, who may call it, and the `{id}` capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Matched {
    pub endpoint: Endpoint,
    pub access: Access,
    pub id: Option<i64>,
}

#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// # Errors
    /// Returns an error if a path pattern does not compile.
    pub fn new() -> Result<Self, regex::Error> {
        let routes = ROUTES
            .iter()
            .map(|&(method, path, endpoint, access)| {
                Ok(Route {
                    method: if method == "POST" {
                        Method::POST
                    } else {
                        Method::GET
                    },
                    pattern: compile(path)?,
                    endpoint,
                    access,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { routes })
    }

    /// First matching route wins. `None` means 404.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Matched> {
        let path = normalize(path);
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                let captures = route.pattern.captures(path)?;
                let id = match captures.name("id") {
                    // ids too large for i64 cannot exist
                    Some(raw) => Some(raw.as_str().parse::<i64>().ok()?),
                    None => None,
                };
                Some(Matched {
                    endpoint: route.endpoint,
                    access: route.access,
                    id,
                })
            })
    }
}

/// Strip one trailing slash, except from the root path.
#[must_use]
pub fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

fn compile(path: &str) -> Result<Regex, regex::Error> {
    let pattern = path
        .split("{id}")
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"(?P<id>\d+)");
    Regex::new(&format!("^{pattern}$"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new().unwrap()
    }

    #[test]
    fn every_route_compiles() {
        assert_eq!(table().routes.len(), ROUTES.len());
    }

    #[test]
    fn resolves_static_paths() {
        let table = table();
        let matched = table.resolve(&Method::GET, "/profile").unwrap();
        assert_eq!(matched.endpoint, Endpoint::Profile);
        assert_eq!(matched.access, Access::Authenticated);
        assert_eq!(matched.id, None);

        assert_eq!(
            table.resolve(&Method::POST, "/admin/movies").unwrap().endpoint,
            Endpoint::AdminMovieCreate
        );
        assert_eq!(
            table.resolve(&Method::GET, "/").unwrap().endpoint,
            Endpoint::Home
        );
    }

    #[test]
    fn captures_ids() {
        let table = table();
        let matched = table.resolve(&Method::POST, "/movies/42/favorite").unwrap();
        assert_eq!(matched.endpoint, Endpoint::FavoriteAdd);
        assert_eq!(matched.id, Some(42));

        let matched = table.resolve(&Method::POST, "/admin/movies/9").unwrap();
        assert_eq!(matched.endpoint, Endpoint::AdminMovieUpdate);
        assert_eq!(matched.id, Some(9));
    }

    #[test]
    fn create_form_is_not_an_id() {
        let matched = table().resolve(&Method::GET, "/admin/movies/create").unwrap();
        assert_eq!(matched.endpoint, Endpoint::AdminMovieCreateForm);
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let table = table();
        assert_eq!(
            table.resolve(&Method::GET, "/movies/").unwrap().endpoint,
            Endpoint::MovieIndex
        );
        assert_eq!(
            table.resolve(&Method::GET, "/movies/3/").unwrap().id,
            Some(3)
        );
    }

    #[test]
    fn unknown_paths_and_methods_do_not_match() {
        let table = table();
        assert_eq!(table.resolve(&Method::GET, "/nope"), None);
        assert_eq!(table.resolve(&Method::DELETE, "/movies"), None);
        assert_eq!(table.resolve(&Method::GET, "/movies/abc"), None);
        assert_eq!(table.resolve(&Method::GET, "/movies/1/favorite"), None);
        assert_eq!(table.resolve(&Method::GET, "/movies//"), None);
        assert_eq!(
            table.resolve(&Method::GET, "/movies/99999999999999999999"),
            None
        );
    }

    #[test]
    fn normalize_keeps_root() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/login/"), "/login");
        assert_eq!(normalize("/login"), "/login");
    }
}
