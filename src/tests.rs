use crate::{
    alias, class, define_module, factory, factory_async, hooks, try_factory, value, Context,
    HookRecord, InjectError, InjectResult, Injected, InjectionArgument, Injector, Lazy,
    MaybeAsync, Module, ProvidedIn, Ref, Service, Svc, Token,
};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn record<T: Service>(
    log: &Log,
    name: &'static str,
) -> impl Fn(Svc<T>) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static {
    let log = log.clone();
    move |_| {
        log.lock().push(name);
        MaybeAsync::ready(Ok(()))
    }
}

fn count<T: Service>(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(Svc<T>) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static {
    let counter = counter.clone();
    move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        MaybeAsync::ready(Ok(()))
    }
}

struct Svc1(pub i32);

struct Svc2 {
    pub dep1: Svc<Svc1>,
}

#[test]
fn default_scope_returns_the_same_instance() {
    let mut builder = Injector::builder();
    builder.provide(class(|| Svc1(1)));
    builder.provide(class(|dep1: Svc<Svc1>| Svc2 { dep1 }));
    let injector = builder.build().unwrap();

    let first: Svc<Svc2> = injector.get().unwrap();
    let second: Svc<Svc2> = injector.get().unwrap();
    let direct: Svc<Svc1> = injector.get().unwrap();
    assert!(Svc::ptr_eq(&first, &second));
    assert!(Svc::ptr_eq(&first.dep1, &direct));
}

#[test]
fn transient_scope_returns_new_instances() {
    let mut builder = Injector::builder();
    builder.provide(class(|| Svc1(1)).transient());
    let injector = builder.build().unwrap();

    let first: Svc<Svc1> = injector.get().unwrap();
    let second: Svc<Svc1> = injector.get().unwrap();
    assert!(!Svc::ptr_eq(&first, &second));
}

#[test]
fn missing_dependency_names_the_dependent() {
    let mut builder = Injector::builder();
    builder.provide(class(|dep1: Svc<Svc1>| Svc2 { dep1 }));
    let injector = builder.build().unwrap();

    match injector.get::<Svc<Svc2>>() {
        Err(InjectError::MissingDependency { token, dependency }) => {
            assert_eq!(Token::of::<Svc2>(), token);
            assert_eq!(Token::of::<Svc1>(), dependency);
        }
        Err(error) => Err(error).unwrap(),
        Ok(_) => unreachable!("service should not have been created"),
    }
    assert!(matches!(
        injector.get::<Svc<Svc1>>(),
        Err(InjectError::NoProvider { .. })
    ));
}

mod circular {
    use super::*;
    use futures::{channel::oneshot, executor::block_on};

    struct A {
        b: Svc<B>,
    }

    struct B {
        a: Ref<A>,
    }

    #[test]
    fn pair_shares_identity_and_inits_dependency_first() {
        let log = Log::default();
        let mut builder = Injector::builder();
        builder.provide(class(|b: Svc<B>| A { b }).on_init::<A, _>(record(&log, "A")));
        builder.provide(class(|a: Ref<A>| B { a }).on_init::<B, _>(record(&log, "B")));
        let injector = builder.build().unwrap();

        let a: Svc<A> = injector.get().unwrap();
        let back = a.b.a.get().unwrap();
        assert!(Svc::ptr_eq(&a, &back));
        assert_eq!(vec!["B", "A"], *log.lock());

        // Both halves are cached now.
        let b: Svc<B> = injector.get().unwrap();
        assert!(Svc::ptr_eq(&a.b, &b));
        assert_eq!(2, log.lock().len());
    }

    struct W {
        x: Svc<X>,
    }

    struct X {
        y: Svc<Y>,
    }

    struct Y {
        z: Svc<Z>,
    }

    struct Z {
        w: Ref<W>,
    }

    #[test]
    fn deep_chain_inits_from_the_closing_node_outward() {
        let log = Log::default();
        let mut builder = Injector::builder();
        builder.provide(class(|x: Svc<X>| W { x }).on_init::<W, _>(record(&log, "A")));
        builder.provide(class(|y: Svc<Y>| X { y }).on_init::<X, _>(record(&log, "B")));
        builder.provide(class(|z: Svc<Z>| Y { z }).on_init::<Y, _>(record(&log, "C")));
        builder.provide(class(|w: Ref<W>| Z { w }).on_init::<Z, _>(record(&log, "D")));
        let injector = builder.build().unwrap();

        let w: Svc<W> = injector.get().unwrap();
        let back = w.x.y.z.w.get().unwrap();
        assert!(Svc::ptr_eq(&w, &back));
        assert_eq!(vec!["D", "C", "B", "A"], *log.lock());
    }

    #[test]
    fn failed_root_init_rebuilds_the_whole_cycle() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let mut builder = Injector::builder();
        builder.provide(class(|b: Svc<B>| A { b }).on_init::<A, _>(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                MaybeAsync::ready(Err(InjectError::Internal("init failed".to_string())))
            } else {
                MaybeAsync::ready(Ok(()))
            }
        }));
        builder.provide(class(|a: Ref<A>| B { a }));
        let injector = builder.build().unwrap();

        assert!(injector.get::<Svc<A>>().is_err());

        let a: Svc<A> = injector.get().unwrap();
        let back = a.b.a.get().unwrap();
        assert!(Svc::ptr_eq(&a, &back));
        let b: Svc<B> = injector.get().unwrap();
        assert!(Svc::ptr_eq(&a.b, &b));
        assert_eq!(2, attempts.load(Ordering::SeqCst));
    }

    #[test]
    fn members_are_published_after_the_root_init() {
        let (release, gate) = oneshot::channel::<()>();
        let gate = Mutex::new(Some(gate));
        let mut builder = Injector::builder();
        builder.provide(class(|b: Svc<B>| A { b }).on_init::<A, _>(move |_| {
            let gate = gate.lock().take();
            MaybeAsync::deferred(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(())
            })
        }));
        builder.provide(class(|a: Ref<A>| B { a }));
        let injector = builder.build().unwrap();

        let root = injector.resolve(InjectionArgument::of::<Svc<A>>());
        assert!(!root.is_ready());
        let member = injector.resolve(InjectionArgument::of::<Svc<B>>());
        assert!(!member.is_ready());

        release.send(()).unwrap();
        let a = block_on(root.into_future()).unwrap().downcast::<A>().unwrap();
        let b = block_on(member.into_future()).unwrap().downcast::<B>().unwrap();
        assert!(Svc::ptr_eq(&a.b, &b));
    }

    struct Outer {
        middle: Svc<Middle>,
    }

    struct Middle {
        outer: Ref<Outer>,
        inner: Svc<Inner>,
    }

    struct Inner {
        middle: Ref<Middle>,
    }

    #[test]
    fn cycles_sharing_a_node_init_innermost_first() {
        let log = Log::default();
        let mut builder = Injector::builder();
        builder.provide(
            class(|middle: Svc<Middle>| Outer { middle }).on_init::<Outer, _>(record(&log, "A")),
        );
        builder.provide(
            class(|outer: Ref<Outer>, inner: Svc<Inner>| Middle { outer, inner })
                .on_init::<Middle, _>(record(&log, "B")),
        );
        builder.provide(
            class(|middle: Ref<Middle>| Inner { middle }).on_init::<Inner, _>(record(&log, "C")),
        );
        let injector = builder.build().unwrap();

        let outer: Svc<Outer> = injector.get().unwrap();
        assert!(Svc::ptr_eq(&outer, &outer.middle.outer.get().unwrap()));
        assert!(Svc::ptr_eq(&outer.middle, &outer.middle.inner.middle.get().unwrap()));
        assert_eq!(vec!["C", "B", "A"], *log.lock());

        let inner: Svc<Inner> = injector.get().unwrap();
        assert!(Svc::ptr_eq(&outer.middle.inner, &inner));
        assert_eq!(3, log.lock().len());
    }

    struct FactoryA(Svc<FactoryB>);
    struct FactoryB(Svc<FactoryA>);

    #[test]
    fn factories_cannot_form_a_cycle() {
        let mut builder = Injector::builder();
        builder.provide(factory(FactoryA));
        builder.provide(factory(FactoryB));
        let injector = builder.build().unwrap();

        for _ in 0..2 {
            match injector.get::<Svc<FactoryA>>() {
                Err(InjectError::CircularReference { token, cycle }) => {
                    assert_eq!(Token::of::<FactoryA>(), token);
                    assert_eq!(3, cycle.len());
                }
                Err(error) => Err(error).unwrap(),
                Ok(_) => unreachable!("cycle should have been detected"),
            }
        }
    }

    struct Strict {
        _other: Svc<Other>,
    }

    struct Other {
        _strict: Svc<Strict>,
    }

    #[test]
    fn strong_references_cannot_close_a_cycle() {
        let mut builder = Injector::builder();
        builder.provide(class(|_other: Svc<Other>| Strict { _other }));
        builder.provide(class(|_strict: Svc<Strict>| Other { _strict }));
        let injector = builder.build().unwrap();

        assert!(matches!(
            injector.get::<Svc<Strict>>(),
            Err(InjectError::CircularReference { .. })
        ));
    }
}

#[test]
fn named_constraint_selects_the_definition() {
    let mut builder = Injector::builder();
    builder.provide(value(String::from("default")));
    builder.provide(value(String::from("x")).named("x"));
    let injector = builder.build().unwrap();

    let named: Svc<String> = injector
        .get_with(InjectionArgument::of::<Svc<String>>().named("x"))
        .unwrap();
    let plain: Svc<String> = injector.get().unwrap();
    assert_eq!("x", named.as_str());
    assert_eq!("default", plain.as_str());
}

#[test]
fn multi_providers_resolve_in_registration_order() {
    let mut builder = Injector::builder();
    builder.provide(value(String::from("foo")).multi());
    builder.provide(value(String::from("bar")).multi());
    builder.provide(value(String::from("baz")).multi());
    let injector = builder.build().unwrap();

    let values: Vec<Svc<String>> = injector.get().unwrap();
    let values: Vec<&str> = values.iter().map(|value| value.as_str()).collect();
    assert_eq!(vec!["foo", "bar", "baz"], values);
}

#[test]
fn unconstrained_providers_replace_each_other() {
    let mut builder = Injector::builder();
    builder.provide(value(1_u8));
    builder.provide(value(2_u8));
    let injector = builder.build().unwrap();

    let values: Vec<Svc<u8>> = injector.get().unwrap();
    assert_eq!(1, values.len());
    assert_eq!(2, *values[0]);
}

#[test]
fn lookup_falls_back_through_the_hierarchy() {
    let mut builder = Injector::builder();
    builder.provide(value(Svc1(1)));
    let parent = builder.build().unwrap();

    let mut builder = parent.child();
    builder.provide(class(|dep1: Svc<Svc1>| Svc2 { dep1 }));
    let child = builder.build().unwrap();

    let from_child: Svc<Svc1> = child.get().unwrap();
    let from_parent: Svc<Svc1> = parent.get().unwrap();
    assert!(Svc::ptr_eq(&from_child, &from_parent));
    assert_eq!(1, child.get::<Svc<Svc2>>().unwrap().dep1.0);
    assert!(matches!(
        parent.get::<Svc<Svc2>>(),
        Err(InjectError::NoProvider { .. })
    ));
}

#[test]
fn self_only_and_skip_self_restrict_the_walk() {
    let mut builder = Injector::builder();
    builder.provide(value(1_u8));
    let parent = builder.build().unwrap();

    let mut builder = parent.child();
    builder.provide(value(2_u8));
    let child = builder.build().unwrap();

    let own: Svc<u8> = child
        .get_with(InjectionArgument::of::<Svc<u8>>().with_hook(hooks::self_only()))
        .unwrap();
    let inherited: Svc<u8> = child
        .get_with(InjectionArgument::of::<Svc<u8>>().with_hook(hooks::skip_self()))
        .unwrap();
    assert_eq!(2, *own);
    assert_eq!(1, *inherited);
}

struct Connection(u32);

#[tokio::test]
async fn parallel_requests_share_one_construction() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut builder = Injector::builder();
    builder.provide(
        factory_async(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Connection(7)
            }
        })
        .singleton(),
    );
    let injector = builder.build().unwrap();

    let results = futures::future::join_all(
        (0..10).map(|_| injector.get_async::<Svc<Connection>>()),
    )
    .await;

    assert_eq!(1, calls.load(Ordering::SeqCst));
    let first = results[0].as_ref().unwrap().clone();
    assert_eq!(7, first.0);
    for result in &results {
        assert!(Svc::ptr_eq(&first, result.as_ref().unwrap()));
    }
}

#[tokio::test]
async fn async_dependencies_make_the_dependent_async() {
    let mut builder = Injector::builder();
    builder.provide(factory_async(|| async { Connection(3) }));
    builder.provide(class(|connection: Svc<Connection>| Svc1(connection.0 as i32)));
    let injector = builder.build().unwrap();

    let service: Svc<Svc1> = injector.get_async().await.unwrap();
    assert_eq!(3, service.0);
}

mod destroy {
    use super::*;

    struct Owned;
    struct SharedChild;

    struct Owner {
        _owned: Svc<Owned>,
        _shared: Svc<SharedChild>,
    }

    struct Sibling {
        _shared: Svc<SharedChild>,
    }

    #[test]
    fn cascade_spares_children_with_other_parents() {
        let owned = Arc::new(AtomicUsize::new(0));
        let shared = Arc::new(AtomicUsize::new(0));
        let context = Context::new();

        let mut builder = Injector::builder();
        builder.provide(class(|| Owned).transient().on_destroy::<Owned, _>(count(&owned)));
        builder.provide(
            class(|| SharedChild)
                .transient()
                .on_destroy::<SharedChild, _>(count(&shared)),
        );
        builder.provide(
            class(|_owned: Svc<Owned>, _shared: Svc<SharedChild>| Owner { _owned, _shared })
                .singleton()
                .inject([
                    InjectionArgument::of::<Svc<Owned>>(),
                    InjectionArgument::of::<Svc<SharedChild>>().with_hook(hooks::with_context(context)),
                ]),
        );
        builder.provide(
            class(|_shared: Svc<SharedChild>| Sibling { _shared })
                .singleton()
                .inject([
                    InjectionArgument::of::<Svc<SharedChild>>().with_hook(hooks::with_context(context)),
                ]),
        );
        let injector = builder.build().unwrap();

        let owner: Svc<Owner> = injector.get().unwrap();
        let sibling: Svc<Sibling> = injector.get().unwrap();
        assert_eq!(4, injector.instance_count());

        injector.destroy_service(&owner).into_ready().unwrap().unwrap();
        assert_eq!(1, owned.load(Ordering::SeqCst));
        assert_eq!(0, shared.load(Ordering::SeqCst));
        assert_eq!(2, injector.instance_count());

        injector.destroy_service(&sibling).into_ready().unwrap().unwrap();
        assert_eq!(1, shared.load(Ordering::SeqCst));
        assert_eq!(0, injector.instance_count());
    }

    struct Left {
        right: Svc<Right>,
    }

    struct Right {
        _left: Ref<Left>,
    }

    #[test]
    fn circular_pairs_go_down_together() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let mut builder = Injector::builder();
        builder.provide(
            class(|right: Svc<Right>| Left { right }).on_destroy::<Left, _>(count(&destroyed)),
        );
        builder.provide(
            class(|_left: Ref<Left>| Right { _left }).on_destroy::<Right, _>(count(&destroyed)),
        );
        let injector = builder.build().unwrap();

        let left: Svc<Left> = injector.get().unwrap();
        let _ = &left.right;
        injector.destroy_service(&left).into_ready().unwrap().unwrap();
        assert_eq!(2, destroyed.load(Ordering::SeqCst));
        assert_eq!(0, injector.instance_count());
    }

    #[test]
    fn injector_teardown_reaches_imported_modules() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let storage = define_module! {
            name = "storage",
            providers = [factory(|| Owned).on_destroy::<Owned, _>(count(&destroyed))],
            exports = [Token::of::<Owned>()],
        };

        let mut builder = Injector::builder();
        builder.add_module(storage);
        let injector = builder.build().unwrap();
        let _owned: Svc<Owned> = injector.get().unwrap();
        let children = injector.children();

        injector.destroy().into_ready().unwrap().unwrap();
        assert_eq!(1, destroyed.load(Ordering::SeqCst));
        assert!(children.iter().all(Injector::is_destroyed));
    }
}

#[test]
fn failed_construction_can_be_retried() {
    struct Flaky;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut builder = Injector::builder();
    builder.provide(try_factory(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "not yet"))
        } else {
            Ok(Flaky)
        }
    }));
    let injector = builder.build().unwrap();

    match injector.get::<Svc<Flaky>>() {
        Err(InjectError::ActivationFailed { token, inner }) => {
            assert_eq!(Token::of::<Flaky>(), token);
            assert_eq!("not yet", inner.to_string());
        }
        Err(error) => Err(error).unwrap(),
        Ok(_) => unreachable!("the first attempt fails"),
    }
    let _flaky: Svc<Flaky> = injector.get().unwrap();
    assert_eq!(2, attempts.load(Ordering::SeqCst));
}

#[test]
fn failed_init_leaves_the_instance_retryable() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut builder = Injector::builder();
    builder.provide(class(|| Svc1(5)).on_init::<Svc1, _>(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            MaybeAsync::ready(Err(InjectError::Internal("init failed".to_string())))
        } else {
            MaybeAsync::ready(Ok(()))
        }
    }));
    let injector = builder.build().unwrap();

    assert!(injector.get::<Svc<Svc1>>().is_err());
    assert_eq!(5, injector.get::<Svc<Svc1>>().unwrap().0);
}

#[test]
fn constructions_on_other_threads_are_joined() {
    struct Slow;
    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let (on_start, on_release) = (started.clone(), release.clone());
    let mut builder = Injector::builder();
    builder.provide(class(move || {
        on_start.wait();
        on_release.wait();
        Slow
    }));
    let injector = builder.build().unwrap();

    let constructing = injector.clone();
    let handle = thread::spawn(move || constructing.get::<Svc<Slow>>());
    started.wait();
    let joined = injector.resolve(InjectionArgument::of::<Svc<Slow>>());
    assert!(!joined.is_ready());
    release.wait();

    let constructed = handle.join().unwrap().unwrap();
    let joined = futures::executor::block_on(joined.into_future())
        .unwrap()
        .downcast::<Slow>()
        .unwrap();
    assert!(Svc::ptr_eq(&constructed, &joined));
}

#[test]
fn diamond_imports_construct_once() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let database = define_module! {
        name = "database",
        providers = [factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Connection(1)
        })],
        exports = [Token::of::<Connection>()],
    };
    let users = define_module! {
        name = "users",
        imports = [database.clone()],
        providers = [class(|connection: Svc<Connection>| Svc1(connection.0 as i32))],
        exports = [Token::of::<Svc1>()],
    };
    let orders = define_module! {
        name = "orders",
        imports = [database],
        providers = [class(|connection: Svc<Connection>| Svc2 { dep1: Svc::new(Svc1(connection.0 as i32)) })],
        exports = [Token::of::<Svc2>()],
    };

    let mut builder = Injector::builder();
    builder.add_module(users);
    builder.add_module(orders);
    let injector = builder.build().unwrap();

    let _users: Svc<Svc1> = injector.get().unwrap();
    let _orders: Svc<Svc2> = injector.get().unwrap();
    assert_eq!(1, created.load(Ordering::SeqCst));
}

#[test]
fn eager_providers_are_built_with_the_injector() {
    let created = Arc::new(AtomicUsize::new(0));

    let mut builder = Injector::builder();
    builder.provide(class(|| Svc1(0)).eager().on_init::<Svc1, _>(count(&created)));
    builder.build().unwrap();
    assert_eq!(1, created.load(Ordering::SeqCst));

    let mut builder = Injector::builder();
    builder.provide(class(|| Svc1(0)).eager().on_init::<Svc1, _>(count(&created)));
    builder.eager(false);
    let injector = builder.build().unwrap();
    assert_eq!(1, created.load(Ordering::SeqCst));
    let _service: Svc<Svc1> = injector.get().unwrap();
    assert_eq!(2, created.load(Ordering::SeqCst));
}

#[tokio::test]
async fn asynchronous_initialization_needs_build_async() {
    let mut module = Module::new("slow");
    module.on_init(|_| {
        MaybeAsync::deferred(async {
            tokio::task::yield_now().await;
            Ok(())
        })
    });

    let mut builder = Injector::builder();
    builder.add_module(module.clone());
    assert!(matches!(
        builder.build(),
        Err(InjectError::AsyncResolution { .. })
    ));

    let mut builder = Injector::builder();
    builder.add_module(module);
    builder.build_async().await.unwrap();
}

#[test]
fn optional_dependencies_may_be_missing() {
    struct Holder(Option<Svc<Svc1>>);
    let mut builder = Injector::builder();
    builder.provide(class(Holder));
    let injector = builder.build().unwrap();

    let holder: Svc<Holder> = injector.get().unwrap();
    assert!(holder.0.is_none());
}

#[test]
fn lazy_dependencies_resolve_on_first_use() {
    struct Owner {
        connection: Lazy<Svc<Connection>>,
    }

    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let mut builder = Injector::builder();
    builder.provide(factory(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Connection(9)
    }));
    builder.provide(class(|connection: Lazy<Svc<Connection>>| Owner { connection }));
    let injector = builder.build().unwrap();

    let owner: Svc<Owner> = injector.get().unwrap();
    assert_eq!(0, created.load(Ordering::SeqCst));
    assert_eq!(9, owner.connection.get().unwrap().0);
    assert_eq!(9, owner.connection.get().unwrap().0);
    assert_eq!(1, created.load(Ordering::SeqCst));
}

#[test]
fn lazy_dependencies_retry_after_a_failure() {
    struct Owner {
        connection: Lazy<Svc<Connection>>,
    }

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut builder = Injector::builder();
    builder.provide(try_factory(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "offline"))
        } else {
            Ok(Connection(3))
        }
    }));
    builder.provide(class(|connection: Lazy<Svc<Connection>>| Owner { connection }));
    let injector = builder.build().unwrap();

    let owner: Svc<Owner> = injector.get().unwrap();
    assert!(owner.connection.get().is_err());
    let connection = owner.connection.get().unwrap();
    assert_eq!(3, connection.0);

    let direct: Svc<Connection> = injector.get().unwrap();
    assert!(Svc::ptr_eq(&direct, &connection));
    assert_eq!(2, attempts.load(Ordering::SeqCst));
}

#[test]
fn injector_hooks_wrap_every_request() {
    let mut builder = Injector::builder();
    builder.hook(HookRecord::new(hooks::catch(|error| match error {
        InjectError::NoProvider { .. } => Ok(Injected::value(0_u16)),
        error => Err(error),
    })));
    let injector = builder.build().unwrap();

    let value: Svc<u16> = injector.get().unwrap();
    assert_eq!(0, *value);
}

#[test]
fn aliases_share_the_target_instance() {
    let mut builder = Injector::builder();
    builder.provide(class(|| Svc1(4)));
    builder.provide(alias(Token::named("primary"), Token::of::<Svc1>()));
    let injector = builder.build().unwrap();

    let direct: Svc<Svc1> = injector.get().unwrap();
    let aliased: Svc<Svc1> = injector.get_token(Token::named("primary")).unwrap();
    assert!(Svc::ptr_eq(&direct, &aliased));
}

mod tree_shaking {
    use super::*;

    struct Settings(u8);

    #[test]
    fn root_tokens_register_in_the_root_injector() {
        let token = Token::of::<Settings>().provided_in(ProvidedIn::Root, class(|| Settings(1)));
        let parent = Injector::builder().build().unwrap();
        let child = parent.child().build().unwrap();

        let from_child: Svc<Settings> = child.get_token(token.clone()).unwrap();
        let from_parent: Svc<Settings> = parent.get_token(token).unwrap();
        assert!(Svc::ptr_eq(&from_child, &from_parent));
        assert!(parent.record(&Token::of::<Settings>()).is_none());
    }

    #[test]
    fn any_tokens_register_in_every_injector() {
        let token = Token::of::<Settings>().provided_in(ProvidedIn::Any, class(|| Settings(2)));
        let parent = Injector::builder().build().unwrap();
        let child = parent.child().build().unwrap();

        let from_child: Svc<Settings> = child.get_token(token.clone()).unwrap();
        let from_parent: Svc<Settings> = parent.get_token(token).unwrap();
        assert!(!Svc::ptr_eq(&from_child, &from_parent));
        assert_eq!(2, from_child.0);
    }

    #[test]
    fn module_tokens_register_in_their_module() {
        let module = Module::new("settings");
        let token =
            Token::of::<Settings>().provided_in(ProvidedIn::Module(module.id()), value(Settings(3)));

        let mut builder = Injector::builder();
        builder.add_module(module);
        let injector = builder.build().unwrap();

        assert!(matches!(
            injector.get_token::<Settings>(token.clone()),
            Err(InjectError::NoProvider { .. })
        ));
        let children = injector.children();
        let settings: Svc<Settings> = children[0].get_token(token).unwrap();
        assert_eq!(3, settings.0);
    }

    #[test]
    fn explicit_providers_win() {
        let token = Token::of::<Settings>().provided_in(ProvidedIn::Root, value(Settings(1)));
        let mut builder = Injector::builder();
        builder.provide(value(Settings(5)));
        let injector = builder.build().unwrap();

        let settings: Svc<Settings> = injector.get_token(token).unwrap();
        assert_eq!(5, settings.0);
    }
}
