use std::fmt;

use crate::error::CompileError;

/// Names claimed by the rendering procedure itself. Templates cannot bind
/// or reference them, which keeps old template sources portable.
pub(crate) const RESERVED: [&str; 6] = [
    "result",
    "append_result",
    "extend_result",
    "to_str",
    "context",
    "do_dots",
];

/// A translated `{{ ... }}` expression: base variable, dotted path and
/// filter chain, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Expr {
    pub(crate) base: String,
    pub(crate) path: Vec<String>,
    pub(crate) filters: Vec<String>,
}

/// Parse `a.b.c|f|g` into an `Expr`. Pipe stages are not trimmed, so
/// whitespace around `|` or `.` fails validation like any other bad
/// character.
pub(crate) fn parse(text: &str) -> Result<Expr, CompileError> {
    let mut stages = text.split('|');
    let head = stages.next().unwrap_or_default();
    let mut dots = head.split('.');
    let base = dots.next().unwrap_or_default();
    validate_name(base)?;
    let path: Vec<String> = dots.map(str::to_string).collect();
    let mut filters = Vec::new();
    for stage in stages {
        validate_name(stage)?;
        filters.push(stage.to_string());
    }
    Ok(Expr {
        base: base.to_string(),
        path,
        filters,
    })
}

/// Reject anything that is not a plain identifier or that collides with a
/// reserved name.
pub(crate) fn validate_name(name: &str) -> Result<(), CompileError> {
    if !is_ident(name) {
        return Err(CompileError::syntax("Not a valid name", name));
    }
    if RESERVED.contains(&name) {
        return Err(CompileError::syntax("Reserved name", name));
    }
    Ok(())
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        for filter in &self.filters {
            write!(f, "|{}", filter)?;
        }
        Ok(())
    }
}
