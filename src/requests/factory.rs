use crate::{InjectError, InjectResult, Injected, InjectionArgument, Request};

/// A factory for creating instances of a service. All functions of arity 12 or
/// less are automatically service factories if the arguments to that function
/// are valid requests.
///
/// The resolver resolves every argument first and then hands the untyped
/// results to [`invoke`](ServiceFactory::invoke), which converts each one
/// back into its request type.
///
/// ```
/// use graph_injector::{Injected, InjectionArgument, ServiceFactory, Svc, Token};
///
/// struct Foo;
/// struct Bar(Svc<Foo>);
///
/// fn factory(foo: Svc<Foo>) -> Bar {
///     Bar(foo)
/// }
///
/// let arguments = ServiceFactory::arguments(&factory);
/// assert_eq!(&Token::of::<Foo>(), arguments[0].token());
///
/// let bar = factory.invoke(&arguments, vec![Injected::value(Foo)]).unwrap();
/// # let _ = bar.0;
/// ```
///
/// # Type parameters
/// * `D` - Dependencies of this service as a tuple.
pub trait ServiceFactory<D>: Send + Sync + 'static {
    /// The value returned by the factory.
    type Output;

    /// The arguments the factory needs, one per parameter.
    fn arguments(&self) -> Vec<InjectionArgument>;

    /// Invokes this service factory with resolved arguments.
    fn invoke(
        &self,
        arguments: &[InjectionArgument],
        values: Vec<Injected>,
    ) -> InjectResult<Self::Output>;
}

macro_rules! impl_service_factory {
    () => {
        impl_service_factory!(@impl ());
    };
    ($first:ident $(, $rest:ident)*) => {
        impl_service_factory!(@impl ($first $(, $rest)*));
        impl_service_factory!($($rest),*);
    };
    (@impl ($($type_name:ident),*)) => {
        impl <F, R $(, $type_name)*> ServiceFactory<($($type_name,)*)> for F
        where
            F: Fn($($type_name),*) -> R + Send + Sync + 'static,
            $($type_name: Request,)*
        {
            type Output = R;

            fn arguments(&self) -> Vec<InjectionArgument> {
                vec![$($type_name::argument()),*]
            }

            #[allow(unused_variables, unused_mut, non_snake_case)]
            fn invoke(
                &self,
                arguments: &[InjectionArgument],
                values: Vec<Injected>,
            ) -> InjectResult<R> {
                if values.len() != arguments.len() {
                    return Err(InjectError::Internal(format!(
                        "expected {} arguments but received {}",
                        arguments.len(),
                        values.len(),
                    )));
                }

                let mut arguments = arguments.iter();
                let mut values = values.into_iter();
                $(
                    let $type_name = match (arguments.next(), values.next()) {
                        (Some(argument), Some(value)) => {
                            $type_name::from_injected(argument.token(), value)?
                        }
                        _ => {
                            return Err(InjectError::Internal(
                                "factory argument count mismatch".to_string(),
                            ))
                        }
                    };
                )*
                Ok(self($($type_name),*))
            }
        }
    };
}

impl_service_factory!(T0, T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
