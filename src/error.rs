use thiserror::Error;

/// Represents errors detected while compiling a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Malformed directive, invalid identifier or mismatched block tag.
    #[error("Syntax error: {msg}: {thing:?}")]
    Syntax { msg: String, thing: String },
    /// The program was finalized while blocks were still open. The directive
    /// stack reports unbalanced templates first, so this indicates a compiler bug.
    #[error("Program finalized with {open} unclosed block(s)")]
    Unbalanced { open: usize },
    /// A construction-time binding set was not a map.
    #[error("Default bindings must be a map, got {kind}")]
    BadDefaults { kind: &'static str },
}

impl CompileError {
    pub(crate) fn syntax(msg: &str, thing: impl Into<String>) -> Self {
        CompileError::Syntax {
            msg: msg.to_string(),
            thing: thing.into(),
        }
    }
}

/// Represents errors detected while rendering a compiled template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A non-loop variable used by the template is absent from the context.
    #[error("Variable {0:?} missing from render context")]
    MissingVariable(String),
    /// A loop variable was read before its `for` block bound it.
    #[error("Variable {0:?} referenced before assignment")]
    Unbound(String),
    /// The attribute resolver could not resolve one path segment.
    #[error("Cannot resolve {name:?} on {kind} value")]
    Lookup { name: String, kind: &'static str },
    #[error("Cannot iterate over {kind} value")]
    NotIterable { kind: &'static str },
    #[error("Filter {0:?} is not callable")]
    NotCallable(String),
    #[error("Filter {name:?} failed: {message}")]
    Filter { name: String, message: String },
    /// The render context did not serialize to a map.
    #[error("Invalid render context: {0}")]
    InvalidContext(String),
}

/// Umbrella error for entry points that both compile and render.
#[derive(Error, Debug)]
pub enum TplError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
