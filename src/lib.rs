//! # Marquee (server-rendered movie catalog)
//!
//! Visitors browse, search and filter the catalog; signed-in users keep a
//! list of favorites and edit their profile; administrators manage the
//! catalog itself.
//!
//! ## Request pipeline
//!
//! Every request goes through the same steps:
//!
//! 1. **Routing**: a declarative route table maps `METHOD path` to an endpoint.
//! 2. **Authorizing**: the route's access policy runs the session gate
//!    (guest only, signed in, or administrator).
//! 3. **Validating**: mutating routes verify the `csrf_token` field and run the
//!    fluent [`marquee::validator::Validator`] over the submitted form.
//! 4. **Executing**: exactly one domain mutation against PostgreSQL.
//! 5. **Responding**: a `303` redirect or a rendered HTML document.
//!
//! Validation failures, CSRF mismatches and missing authentication are
//! recoverable: they store a flash message (and the rejected input) in the
//! session and redirect. Only unexpected store failures surface as a generic
//! error page, with the detail logged for operators.

pub mod cli;
pub mod marquee;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
