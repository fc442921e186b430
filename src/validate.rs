//! Typed validation rules for the submission surface.
//!
//! The rule set is a static table; checking returns the failures as a value
//! instead of accumulating them in shared state.

use std::collections::BTreeMap;

/// Maximum-length rule for one string field.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub field: &'static str,
    pub max_chars: usize,
}

/// Field name -> failure messages. Ordered map so rendered errors are stable.
pub type ValidationErrors = BTreeMap<&'static str, Vec<String>>;

/// Rules applied to a notification submission.
pub static SUBMIT_RULES: &[Rule] = &[
    Rule { field: "title", max_chars: 255 },
    Rule { field: "message", max_chars: 255 },
];

/// Check `values` (field name, value) against `rules`. An empty map means the
/// input passed. Lengths are counted in characters, not bytes.
pub fn check(rules: &[Rule], values: &[(&'static str, &str)]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for rule in rules {
        let Some((_, value)) = values.iter().find(|(field, _)| *field == rule.field) else {
            continue;
        };
        let chars = value.chars().count();
        if chars > rule.max_chars {
            errors.entry(rule.field).or_default().push(format!(
                "{} must be at most {} characters, got {}",
                rule.field, rule.max_chars, chars
            ));
        }
    }
    errors
}
