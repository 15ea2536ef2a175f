use crate::{
    hooks, InjectError, InjectResult, Injected, InjectionArgument, Injector, Lazy,
    LazyValue, Ref, Service, Session, Svc, Token,
};

/// A request to an injector.
///
/// A request type describes what to resolve through
/// [`argument`](Request::argument) and how to turn the untyped result back
/// into a value through [`from_injected`](Request::from_injected). Every
/// parameter of a provider's constructor or factory must be a request.
///
/// Built-in requests:
///
/// - `Svc<T>`: the service for `T`. Fails if the service is part of a cycle
///   and still under construction.
/// - `Ref<T>`: the service for `T`, possibly still under construction.
/// - `Option<Svc<T>>`: the service for `T`, or `None` if it has no provider.
/// - `Vec<Svc<T>>`: every matching definition of `T`.
/// - `Lazy<R>`: defers resolving `R` until first use.
/// - `Injector`: the injector the requesting provider is registered in.
/// - `Session`: the session of the provider under construction.
pub trait Request: Sized + Send + 'static {
    /// Describes the injection this request performs.
    fn argument() -> InjectionArgument;

    /// Converts a resolved injection into the request type.
    fn from_injected(token: &Token, injected: Injected) -> InjectResult<Self>;
}

/// Requests a service pointer.
impl<T: Service> Request for Svc<T> {
    fn argument() -> InjectionArgument {
        InjectionArgument::new(Token::of::<T>())
    }

    fn from_injected(token: &Token, injected: Injected) -> InjectResult<Self> {
        match injected {
            Injected::Value(value) => value
                .downcast()
                .map_err(|_| InjectError::InvalidProvider {
                    token: token.clone(),
                }),
            Injected::Shell(shell) => Err(InjectError::CircularReference {
                token: token.clone(),
                cycle: vec![token.clone(), shell.token().clone()],
            }),
            Injected::Absent => Err(InjectError::NoProvider {
                token: token.clone(),
            }),
            Injected::Many(_) => Err(InjectError::InvalidProvider {
                token: token.clone(),
            }),
        }
    }
}

/// Requests a reference that might still be under construction.
impl<T: Service> Request for Ref<T> {
    fn argument() -> InjectionArgument {
        InjectionArgument::new(Token::of::<T>())
    }

    fn from_injected(token: &Token, injected: Injected) -> InjectResult<Self> {
        match injected {
            Injected::Value(value) => {
                if value.is::<T>() {
                    Ok(Ref::resolved(value))
                } else {
                    Err(InjectError::InvalidProvider {
                        token: token.clone(),
                    })
                }
            }
            Injected::Shell(shell) => Ok(Ref::from_shell(&shell)),
            Injected::Absent => Err(InjectError::NoProvider {
                token: token.clone(),
            }),
            Injected::Many(_) => Err(InjectError::InvalidProvider {
                token: token.clone(),
            }),
        }
    }
}

/// Requests a service pointer if a provider exists.
impl<T: Service> Request for Option<Svc<T>> {
    fn argument() -> InjectionArgument {
        Svc::<T>::argument().optional()
    }

    fn from_injected(token: &Token, injected: Injected) -> InjectResult<Self> {
        match injected {
            Injected::Absent => Ok(None),
            injected => Svc::<T>::from_injected(token, injected).map(Some),
        }
    }
}

/// Requests all the implementations of a service.
impl<T: Service> Request for Vec<Svc<T>> {
    fn argument() -> InjectionArgument {
        Svc::<T>::argument().with_hook(hooks::all())
    }

    fn from_injected(token: &Token, injected: Injected) -> InjectResult<Self> {
        match injected {
            Injected::Many(values) => values
                .into_iter()
                .map(|value| Svc::<T>::from_injected(token, value))
                .collect(),
            Injected::Absent => Ok(Vec::new()),
            single => Ok(vec![Svc::<T>::from_injected(token, single)?]),
        }
    }
}

/// Requests a value that is resolved on first use.
impl<R: Request> Request for Lazy<R> {
    fn argument() -> InjectionArgument {
        let argument = R::argument();
        let retry = hooks::LazyHook::retrying(argument.hooks().to_vec());
        argument.wrapped_by(retry)
    }

    fn from_injected(token: &Token, injected: Injected) -> InjectResult<Self> {
        let value = Svc::<LazyValue>::from_injected(token, injected)?;
        Ok(Lazy::new(token.clone(), value))
    }
}

/// Requests the injector the requesting provider is registered in.
impl Request for Injector {
    fn argument() -> InjectionArgument {
        InjectionArgument::new(Token::of::<Injector>()).with_hook(hooks::current_injector())
    }

    fn from_injected(token: &Token, injected: Injected) -> InjectResult<Self> {
        Svc::<Injector>::from_injected(token, injected).map(|injector| injector.as_ref().clone())
    }
}

/// Requests the session of the provider under construction.
impl Request for Session {
    fn argument() -> InjectionArgument {
        InjectionArgument::new(Token::of::<Session>()).with_hook(hooks::current_session())
    }

    fn from_injected(token: &Token, injected: Injected) -> InjectResult<Self> {
        Svc::<Session>::from_injected(token, injected).map(|session| session.as_ref().clone())
    }
}

/// Requests the untyped result of an injection. Its token must be set with
/// [`ProviderDescriptor::inject`](crate::ProviderDescriptor::inject) or
/// [`Injector::get_token`].
impl Request for Injected {
    fn argument() -> InjectionArgument {
        InjectionArgument::new(Token::of::<Injected>())
    }

    fn from_injected(_token: &Token, injected: Injected) -> InjectResult<Self> {
        Ok(injected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shells_are_rejected_by_strong_requests() {
        let token = Token::of::<u8>();
        let shell = crate::Shell::new(token.clone());
        let result = Svc::<u8>::from_injected(&token, Injected::Shell(shell.clone()));
        assert!(matches!(result, Err(InjectError::CircularReference { .. })));

        let reference = Ref::<u8>::from_injected(&token, Injected::Shell(shell)).unwrap();
        assert!(!reference.is_ready());
    }

    #[test]
    fn collections_accept_absent_and_single_values() {
        let token = Token::of::<u8>();
        assert!(Vec::<Svc<u8>>::from_injected(&token, Injected::Absent)
            .unwrap()
            .is_empty());
        let values = Vec::<Svc<u8>>::from_injected(
            &token,
            Injected::Many(vec![Injected::value(1_u8), Injected::value(2_u8)]),
        )
        .unwrap();
        assert_eq!(vec![1, 2], values.iter().map(|v| **v).collect::<Vec<_>>());
    }

    #[test]
    fn optional_requests_map_absent_to_none() {
        let token = Token::of::<u8>();
        assert!(Option::<Svc<u8>>::from_injected(&token, Injected::Absent)
            .unwrap()
            .is_none());
    }
}
