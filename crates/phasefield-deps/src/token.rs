//! Dependency-string tokenizer.
//!
//! A dependency string is a comma-separated list of tokens. Each token is
//! either a bare field name (shorthand for `value(name)`) or
//! `op(name)` with `op` one of `value`, `grad`, `hess`, `change`.
//! Whitespace around tokens, operators, and names is ignored.

use std::fmt;

use phasefield_core::{EvalFlags, FieldRef};

/// The operator of a dependency token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    /// `value(x)` or bare `x`.
    Value,
    /// `grad(x)`.
    Grad,
    /// `hess(x)`.
    Hess,
    /// `change(x)`: the Newton update of `x`, only on `x`'s own LHS.
    Change,
}

impl DependencyKind {
    /// Every operator, in vocabulary order.
    pub const ALL: [Self; 4] = [Self::Value, Self::Grad, Self::Hess, Self::Change];

    /// The keyword used in dependency strings.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Grad => "grad",
            Self::Hess => "hess",
            Self::Change => "change",
        }
    }

    /// The evaluation flag this operator requires.
    pub fn flag(self) -> EvalFlags {
        match self {
            Self::Value => EvalFlags::VALUE,
            Self::Grad => EvalFlags::GRADIENT,
            Self::Hess => EvalFlags::HESSIAN,
            Self::Change => EvalFlags::CHANGE,
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }

    /// Render the canonical token text for a field name.
    pub fn render(self, name: &str) -> String {
        match self {
            Self::Value => name.to_string(),
            other => format!("{}({name})", other.keyword()),
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A syntactically valid token, not yet resolved against the field table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    /// The operator.
    pub kind: DependencyKind,
    /// The referenced field name.
    pub name: &'a str,
    /// The trimmed token as written.
    pub text: &'a str,
}

/// A resolved dependency: an operator applied to a declared field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// The operator.
    pub kind: DependencyKind,
    /// The referenced field.
    pub field: FieldRef,
}

/// A token that does not match the dependency grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedToken {
    /// The trimmed token as written.
    pub text: String,
    /// What is wrong with it.
    pub reason: &'static str,
}

/// Split a dependency string into tokens.
///
/// Empty segments (`"a,,b"`, trailing commas, an empty string) are skipped.
pub fn tokenize(list: &str) -> impl Iterator<Item = Result<Token<'_>, MalformedToken>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_token)
}

/// Parse a single trimmed token.
pub fn parse_token(text: &str) -> Result<Token<'_>, MalformedToken> {
    let malformed = |reason| MalformedToken {
        text: text.to_string(),
        reason,
    };

    let Some(open) = text.find('(') else {
        if text.contains(')') {
            return Err(malformed("unbalanced ')'"));
        }
        if text.chars().any(char::is_whitespace) {
            return Err(malformed("field names cannot contain whitespace"));
        }
        return Ok(Token {
            kind: DependencyKind::Value,
            name: text,
            text,
        });
    };

    let Some(inner) = text.strip_suffix(')') else {
        return Err(malformed("expected ')' at end of token"));
    };
    let keyword = inner[..open].trim();
    let name = inner[open + 1..].trim();

    let kind =
        DependencyKind::from_keyword(keyword).ok_or_else(|| malformed("unknown operator"))?;
    if name.is_empty() {
        return Err(malformed("missing field name"));
    }
    if name.contains('(') || name.contains(')') {
        return Err(malformed("nested operators are not supported"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(malformed("field names cannot contain whitespace"));
    }
    Ok(Token { kind, name, text })
}
