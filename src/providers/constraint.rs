use crate::Session;
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

/// A predicate over the session, used to pick between definitions of the
/// same token and to decide whether a hook applies.
#[derive(Clone)]
pub struct Constraint(Arc<dyn Fn(&Session) -> bool + Send + Sync>);

impl Constraint {
    /// Creates a constraint from a predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Session) -> bool + Send + Sync + 'static,
    {
        Constraint(Arc::new(predicate))
    }

    /// Checks the predicate.
    #[must_use]
    pub fn matches(&self, session: &Session) -> bool {
        (self.0)(session)
    }
}

impl Debug for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Constraint")
    }
}

/// Common constraints.
pub mod when {
    use super::Constraint;
    use crate::Token;
    use std::borrow::Cow;

    /// Accepts sessions annotated with the given name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Constraint {
        let name = name.into();
        Constraint::new(move |session| session.annotations().name.as_ref() == Some(&name))
    }

    /// Accepts sessions annotated with the given tag.
    pub fn tagged(tag: impl Into<Cow<'static, str>>) -> Constraint {
        let tag = tag.into();
        Constraint::new(move |session| session.annotations().tags.contains(&tag))
    }

    /// Accepts sessions whose direct parent resolves the given token.
    #[must_use]
    pub fn in_parent(token: Token) -> Constraint {
        Constraint::new(move |session| {
            session
                .parent()
                .map_or(false, |parent| parent.token() == token)
        })
    }

    /// Accepts sessions with the given token anywhere up the chain.
    #[must_use]
    pub fn injected_into(token: Token) -> Constraint {
        Constraint::new(move |session| {
            session.ancestors().any(|ancestor| ancestor.token() == token)
        })
    }

    /// Accepts sessions both constraints accept.
    #[must_use]
    pub fn and(left: Constraint, right: Constraint) -> Constraint {
        Constraint::new(move |session| left.matches(session) && right.matches(session))
    }

    /// Accepts sessions either constraint accepts.
    #[must_use]
    pub fn or(left: Constraint, right: Constraint) -> Constraint {
        Constraint::new(move |session| left.matches(session) || right.matches(session))
    }

    /// Inverts a constraint.
    #[must_use]
    pub fn not(inner: Constraint) -> Constraint {
        Constraint::new(move |session| !inner.matches(session))
    }

    /// Accepts every session.
    #[must_use]
    pub fn always() -> Constraint {
        Constraint::new(|_| true)
    }
}
