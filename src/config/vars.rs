//! Environment variable interpolation for config files.
//!
//! Syntax:
//! - `${VAR}`: value of VAR, error if unset
//! - `${VAR:-default}`: default when VAR is unset or empty
//! - `${VAR-default}`: default only when VAR is unset
//! - `$$`: a literal `$`
//!
//! A `$` not followed by `{` or `$` is left as is.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?:(?P<op>:?-)(?P<default>[^}]*))?\}")
        .expect("placeholder pattern is valid")
});

/// Interpolated text, or every problem found in it.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    interpolate_with(input, |name| std::env::var(name).ok())
}

/// Interpolate using `lookup` to resolve variable names.
pub fn interpolate_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = PLACEHOLDER.replace_all(input, |caps: &Captures| {
        let Some(name) = caps.name("name").map(|m| m.as_str()) else {
            return "$".to_string();
        };
        let op = caps.name("op").map(|m| m.as_str());
        let default = caps.name("default").map_or("", |m| m.as_str());

        match (lookup(name), op) {
            (Some(value), _) if value.contains(['\n', '\r']) => {
                errors.push(format!("{name} contains a line break"));
                String::new()
            }
            (Some(value), Some(":-")) if value.is_empty() => default.to_string(),
            (Some(value), _) => value,
            (None, Some(_)) => default.to_string(),
            (None, None) => {
                errors.push(format!("{name} is not set"));
                String::new()
            }
        }
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}
