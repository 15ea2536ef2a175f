#![allow(clippy::used_underscore_binding)]

use crate::Token;
use derive_more::Display;
use std::{
    any::Any,
    error::Error,
    sync::Arc,
};

/// A reference-counted pointer holding a service.
pub type Svc<T> = Arc<T>;

/// A service pointer holding an instance of `dyn Any`. Every value that flows
/// through the resolver is stored behind one of these.
pub type DynSvc = Arc<dyn Any + Send + Sync>;

/// A result from attempting to resolve a token or construct an instance.
pub type InjectResult<T> = Result<T, InjectError>;

/// Implemented automatically on types that are capable of being a service.
pub trait Service: Any + Send + Sync {}
impl<T: ?Sized + Any + Send + Sync> Service for T {}

/// An error that has occurred during resolution of a token.
///
/// Errors are cloneable so that every caller waiting on the same asynchronous
/// construction receives the same error.
#[derive(Clone, Debug, Display)]
#[non_exhaustive]
pub enum InjectError {
    /// No provider was found for the token anywhere in the injector chain.
    #[display(fmt = "{} has no provider", token)]
    NoProvider {
        /// The token that was requested.
        token: Token,
    },

    /// A provider for a dependency of the requested token is missing.
    #[display(fmt = "{} has no provider (required by {})", dependency, token)]
    MissingDependency {
        /// The token whose provider declared the dependency.
        token: Token,
        /// The dependency that has no provider.
        dependency: Token,
    },

    /// A cycle was detected that cannot be closed with a placeholder, either
    /// because a provider in it is not class-based or because the dependent
    /// requested a strong pointer to a value still under construction.
    #[display(
        fmt = "a circular reference was detected during resolution of {} [{}]",
        token,
        "fmt_cycle(cycle)"
    )]
    CircularReference {
        /// The token that closed the cycle.
        token: Token,
        /// The tokens in the cycle, innermost first.
        cycle: Vec<Token>,
    },

    /// The registered provider produced a value of the wrong type.
    #[display(fmt = "the provider for {} returned the wrong type", token)]
    InvalidProvider {
        /// The token that was requested.
        token: Token,
    },

    /// A provider descriptor could not be registered.
    #[display(fmt = "invalid provider for {}: {}", token, reason)]
    InvalidDescriptor {
        /// The token the descriptor provides.
        token: Token,
        /// Why the descriptor was rejected.
        reason: String,
    },

    /// A module exported a token it neither provides nor imports.
    #[display(fmt = "module {} exports {} but has no provider for it", module, token)]
    InvalidExport {
        /// The name of the exporting module.
        module: String,
        /// The exported token.
        token: Token,
    },

    /// A synchronous request hit a provider, hook or lifecycle callback that
    /// suspended. Use the asynchronous variant of the request instead.
    #[display(fmt = "{} can only be resolved asynchronously", token)]
    AsyncResolution {
        /// The token that was requested.
        token: Token,
    },

    /// The instance is still under construction and cannot be destroyed or
    /// shared.
    #[display(fmt = "the instance for {} is still under construction", token)]
    InstancePending {
        /// The token of the pending instance.
        token: Token,
    },

    /// The injector was destroyed and can no longer resolve tokens.
    #[display(fmt = "injector {} has been destroyed", injector)]
    InjectorDestroyed {
        /// The name of the destroyed injector.
        injector: String,
    },

    /// A factory or lifecycle callback returned an error.
    #[display(fmt = "an error occurred during activation of {}: {}", token, inner)]
    ActivationFailed {
        /// The token being activated.
        token: Token,
        /// The error returned by user code.
        inner: Arc<dyn Error + Send + Sync>,
    },

    /// An unexpected error has occurred. This is usually caused by a bug in
    /// the library itself.
    #[display(fmt = "an unexpected error occurred (please report this): {}", _0)]
    Internal(String),
}

impl InjectError {
    /// Wraps an error returned by user code.
    pub fn activation_failed<E>(token: Token, error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        InjectError::ActivationFailed {
            token,
            inner: Arc::new(error),
        }
    }

    /// Gets the token the error is about, if there is one.
    #[must_use]
    pub fn token(&self) -> Option<&Token> {
        match self {
            InjectError::NoProvider { token }
            | InjectError::MissingDependency { token, .. }
            | InjectError::CircularReference { token, .. }
            | InjectError::InvalidProvider { token }
            | InjectError::InvalidDescriptor { token, .. }
            | InjectError::InvalidExport { token, .. }
            | InjectError::AsyncResolution { token }
            | InjectError::InstancePending { token }
            | InjectError::ActivationFailed { token, .. } => Some(token),
            InjectError::InjectorDestroyed { .. } | InjectError::Internal(_) => {
                None
            }
        }
    }
}

impl Error for InjectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InjectError::ActivationFailed { inner, .. } => Some(inner.as_ref()),
            _ => None,
        }
    }
}

fn fmt_cycle(cycle: &[Token]) -> String {
    let mut joined = String::new();
    for item in cycle.iter().rev() {
        if !joined.is_empty() {
            joined.push_str(" -> ");
        }
        joined.push_str(item.name());
    }
    joined
}
