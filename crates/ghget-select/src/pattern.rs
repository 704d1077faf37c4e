use regex::{Regex, RegexBuilder};

/// An include/exclude rule, compiled once per selection.
#[derive(Debug, Clone)]
pub enum Pattern {
    Regex(Regex),
    /// Lower-cased literal used when the rule is not a valid expression.
    Literal(String),
    /// Blank rules never match.
    Never,
}

impl Pattern {
    pub fn compile(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Pattern::Never;
        }
        match RegexBuilder::new(raw).case_insensitive(true).build() {
            Ok(regex) => Pattern::Regex(regex),
            Err(err) => {
                tracing::debug!(pattern = raw, error = %err, "pattern is not a regex, matching literally");
                Pattern::Literal(raw.to_lowercase())
            }
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Pattern::Regex(regex) => regex.is_match(text),
            Pattern::Literal(literal) => text.to_lowercase().contains(literal.as_str()),
            Pattern::Never => false,
        }
    }
}

pub fn compile_all(raw: &[String]) -> Vec<Pattern> {
    raw.iter().map(|p| Pattern::compile(p)).collect()
}
