//! Fluent form validation.
//!
//! A [`Validator`] borrows the submitted fields and accumulates at most one
//! error per field: the first failing rule wins, later rules on the same field
//! still run (a `unique` lookup still queries the store) but never replace the
//! recorded message. Every rule except `required` and `confirmed` ignores an
//! absent or empty value.
//!
//! ```ignore
//! let result = Validator::new(&form)
//!     .required("email", Some("Email is required."))
//!     .email("email", None)
//!     .unique("email", "users", "email", None, &pool)
//!     .await?
//!     .required("password", None)
//!     .min("password", 8, None)
//!     .confirmed("password", None);
//! ```

use regex::Regex;
use std::{collections::BTreeMap, future::Future};
use thiserror::Error;
use url::Url;

/// Read-only row counting used by the `unique` rule.
pub trait UniqueLookup {
    /// Count rows of `table` whose `column` equals `value`. Must not write.
    fn count_matching(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid SQL identifier: {0:?}")]
    Identifier(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct Validator<'a> {
    data: &'a BTreeMap<String, String>,
    errors: BTreeMap<String, String>,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub fn new(data: &'a BTreeMap<String, String>) -> Self {
        Self {
            data,
            errors: BTreeMap::new(),
        }
    }

    fn value(&self, field: &str) -> &'a str {
        self.data.get(field).map_or("", String::as_str)
    }

    fn add_error(&mut self, field: &str, message: Option<&str>, default: impl FnOnce() -> String) {
        if !self.errors.contains_key(field) {
            self.errors.insert(
                field.to_string(),
                message.map_or_else(default, ToString::to_string),
            );
        }
    }

    #[must_use]
    pub fn required(mut self, field: &str, message: Option<&str>) -> Self {
        if self.value(field).trim().is_empty() {
            self.add_error(field, message, || format!("The {field} field is required."));
        }
        self
    }

    #[must_use]
    pub fn email(mut self, field: &str, message: Option<&str>) -> Self {
        let value = self.value(field);
        if !value.is_empty() && !valid_email(value) {
            self.add_error(field, message, || {
                format!("The {field} must be a valid email address.")
            });
        }
        self
    }

    #[must_use]
    pub fn min(mut self, field: &str, length: usize, message: Option<&str>) -> Self {
        let value = self.value(field);
        if !value.is_empty() && value.len() < length {
            self.add_error(field, message, || {
                format!("The {field} must be at least {length} characters.")
            });
        }
        self
    }

    #[must_use]
    pub fn max(mut self, field: &str, length: usize, message: Option<&str>) -> Self {
        let value = self.value(field);
        if !value.is_empty() && value.len() > length {
            self.add_error(field, message, || {
                format!("The {field} must not exceed {length} characters.")
            });
        }
        self
    }

    /// Compare `field` with `{field}_confirmation`; absent counts as empty.
    #[must_use]
    pub fn confirmed(mut self, field: &str, message: Option<&str>) -> Self {
        let confirmation = self.value(&format!("{field}_confirmation"));
        if self.value(field) != confirmation {
            self.add_error(field, message, || {
                format!("The {field} confirmation does not match.")
            });
        }
        self
    }

    /// Fail when `table.column` already holds the submitted value.
    ///
    /// # Errors
    /// Returns an error if `table` or `column` is not a plain identifier or the
    /// store query fails.
    pub async fn unique<S>(
        mut self,
        field: &str,
        table: &str,
        column: &str,
        message: Option<&str>,
        store: &S,
    ) -> Result<Self, LookupError>
    where
        S: UniqueLookup + Sync,
    {
        for identifier in [table, column] {
            if !valid_identifier(identifier) {
                return Err(LookupError::Identifier(identifier.to_string()));
            }
        }

        let value = self.value(field);
        if !value.is_empty() && store.count_matching(table, column, value).await? > 0 {
            self.add_error(field, message, || {
                format!("The {field} has already been taken.")
            });
        }
        Ok(self)
    }

    #[must_use]
    pub fn numeric(mut self, field: &str, message: Option<&str>) -> Self {
        let value = self.value(field);
        if !value.is_empty() && !is_numeric(value) {
            self.add_error(field, message, || format!("The {field} must be a number."));
        }
        self
    }

    #[must_use]
    pub fn integer(mut self, field: &str, message: Option<&str>) -> Self {
        let value = self.value(field);
        if !value.is_empty() && !is_integer(value) && value != "0" {
            self.add_error(field, message, || format!("The {field} must be an integer."));
        }
        self
    }

    /// Require a number with at most `max_decimals` digits after the point.
    #[must_use]
    pub fn decimal(mut self, field: &str, max_decimals: Option<usize>, message: Option<&str>) -> Self {
        let value = self.value(field);
        if value.is_empty() {
            return self;
        }

        if !is_numeric(value) {
            self.add_error(field, message, || {
                format!("The {field} must be a decimal number.")
            });
            return self;
        }

        if let Some(max) = max_decimals {
            if decimal_places(value) > max {
                self.add_error(field, message, || {
                    format!("The {field} must have at most {max} decimal places.")
                });
            }
        }
        self
    }

    /// Inclusive numeric range; non-numeric values are left to `numeric`.
    #[must_use]
    pub fn between(mut self, field: &str, min: f64, max: f64, message: Option<&str>) -> Self {
        let value = self.value(field);
        if value.is_empty() || !is_numeric(value) {
            return self;
        }

        if let Ok(number) = value.trim().parse::<f64>() {
            if number < min || number > max {
                self.add_error(field, message, || {
                    format!("The {field} must be between {min} and {max}.")
                });
            }
        }
        self
    }

    #[must_use]
    pub fn url(mut self, field: &str, message: Option<&str>) -> Self {
        let value = self.value(field);
        if !value.is_empty() && !valid_url(value) {
            self.add_error(field, message, || format!("The {field} must be a valid URL."));
        }
        self
    }

    #[must_use]
    pub fn fails(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    #[must_use]
    pub fn into_errors(self) -> BTreeMap<String, String> {
        self.errors
    }

    /// Every submitted field: clean ones, plus failed ones with their raw value.
    #[must_use]
    pub fn validated(&self) -> BTreeMap<String, String> {
        let mut validated: BTreeMap<String, String> = self
            .errors
            .keys()
            .filter_map(|field| {
                self.data
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();

        for (field, value) in self.data {
            if !self.errors.contains_key(field) {
                validated.insert(field.clone(), value.clone());
            }
        }

        validated
    }
}

pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Integers, decimals and exponents with an optional sign; surrounding
/// whitespace is tolerated.
pub(crate) fn is_numeric(value: &str) -> bool {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$")
        .is_ok_and(|re| re.is_match(value.trim()))
}

fn is_integer(value: &str) -> bool {
    let trimmed = value.trim();
    Regex::new(r"^[+-]?(0|[1-9]\d*)$").is_ok_and(|re| re.is_match(trimmed))
        && trimmed.parse::<i64>().is_ok()
}

fn decimal_places(value: &str) -> usize {
    value
        .trim()
        .split_once('.')
        .map_or(0, |(_, fraction)| {
            fraction.chars().take_while(char::is_ascii_digit).count()
        })
}

fn valid_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| url.has_host())
}

fn valid_identifier(identifier: &str) -> bool {
    Regex::new(r"^[a-z_][a-z0-9_]*$").is_ok_and(|re| re.is_match(identifier))
}
