//! Placeholder substitution for scheduled-message templates.
//!
//! Template bodies reference values with `[Entity.Field]` tokens, e.g.
//! `"Hi [Patient.FirstName], it's [Provider.ShortDisplayName]."`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{Error, Result};

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Za-z]+)\.([A-Za-z]+)\]").expect("valid token regex"));

/// Tokens a template may use.
pub const KNOWN_TOKENS: &[(&str, &str)] = &[
    ("Patient", "FirstName"),
    ("Provider", "ShortDisplayName"),
    ("Provider", "FirstName"),
];

/// Values substituted into a template. "Provider" is the sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    pub patient_first_name: String,
    pub provider_short_display_name: String,
    pub provider_first_name: String,
}

impl TemplateValues {
    fn lookup(&self, entity: &str, field: &str) -> Option<&str> {
        match (entity, field) {
            ("Patient", "FirstName") => Some(&self.patient_first_name),
            ("Provider", "ShortDisplayName") => Some(&self.provider_short_display_name),
            ("Provider", "FirstName") => Some(&self.provider_first_name),
            _ => None,
        }
    }
}

fn is_known(entity: &str, field: &str) -> bool {
    KNOWN_TOKENS.iter().any(|(e, f)| *e == entity && *f == field)
}

/// Reject templates that reference unknown tokens.
pub fn validate_template(body: &str) -> Result<()> {
    let unknown: Vec<String> = TOKEN_RE
        .captures_iter(body)
        .filter(|c| !is_known(&c[1], &c[2]))
        .map(|c| c[0].to_string())
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "unknown template tokens: {}",
            unknown.join(", ")
        )))
    }
}

/// Substitute every token in `body`.
pub fn fill_template(body: &str, values: &TemplateValues) -> Result<String> {
    validate_template(body)?;
    Ok(TOKEN_RE
        .replace_all(body, |c: &Captures| {
            values.lookup(&c[1], &c[2]).unwrap_or_default().to_string()
        })
        .into_owned())
}
