//! Compiled filter fragments.
//!
//! A fragment is either an atom, which never needs grouping, or a chain of
//! several tokens, which is parenthesised whenever it is embedded in a larger
//! expression. Top level output and function arguments render bare.

use crate::escape::escape_path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Atom(String),
    Chain(String),
}

impl Term {
    pub fn atom(text: impl Into<String>) -> Self {
        Term::Atom(text.into())
    }

    pub fn into_bare(self) -> String {
        match self {
            Term::Atom(text) | Term::Chain(text) => text,
        }
    }

    pub fn into_grouped(self) -> String {
        match self {
            Term::Atom(text) => text,
            Term::Chain(text) => format!("({text})"),
        }
    }
}

/// Join terms with `separator`, grouping each chain.
///
/// A single term is returned untouched so that one-element lists never gain
/// extra parentheses.
pub fn bracket_join(mut terms: Vec<Term>, separator: &str) -> Term {
    if terms.len() == 1
        && let Some(term) = terms.pop()
    {
        return term;
    }
    let parts: Vec<String> = terms.into_iter().map(Term::into_grouped).collect();
    Term::Chain(parts.join(separator))
}

/// Bind `term` to the navigation path with `operator`: `path op term`.
pub fn bind(term: Term, path: Option<&[String]>, operator: &str) -> Term {
    match path {
        Some(path) => Term::Chain(format!(
            "{}{operator}{}",
            escape_path(path),
            term.into_grouped()
        )),
        None => term,
    }
}
