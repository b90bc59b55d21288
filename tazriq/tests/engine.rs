//! End-to-end scenarios across modules, locators, scopes and injected
//! functions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tazriq::prelude::*;

fn unique(name: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("{name}-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug)]
struct Token(&'static str);

#[test]
fn normal_conflict_and_override_resolution() {
    let module = Module::new();

    module
        .injectable(Recipe::function(|| Ok(Token("f"))))
        .unwrap();

    // second normal registration for the same type is a hard conflict
    let err = module
        .injectable(Recipe::function(|| Ok(Token("g"))))
        .unwrap_err();
    assert!(matches!(err, Error::RegistrationConflict { .. }));

    // an override registration succeeds and wins the lookup
    module
        .injectable_with(
            Recipe::function(|| Ok(Token("g"))),
            Register::default().mode(Mode::Override),
        )
        .unwrap();

    assert_eq!(module.find_instance::<Token>().unwrap().0, "g");
}

#[derive(Debug)]
struct Wanted(u32);

#[test]
fn explicit_arguments_merge_with_resolved_dependencies() {
    let module = Module::new();
    module.set_constant(Wanted(10)).unwrap();

    // h(x: Wanted, y: u32) with only `Wanted` registered
    let h = module.inject(Recipe::new(
        Signature::new([param::<Wanted>("x"), param::<u32>("y")]),
        |args| {
            let x = args.get::<Wanted>("x")?;
            let y = args.get::<u32>("y")?;
            Ok(x.0 + *y)
        },
    ));

    let total = h.call(Arguments::new().with("y", 5u32)).unwrap();
    assert_eq!(total, 15);

    // without the explicit argument the unresolved parameter is absent
    assert!(matches!(
        h.call(Arguments::new()).unwrap_err(),
        Error::MissingArgument { name: "y" }
    ));
}

#[tokio::test]
async fn async_simple_recipe_builds_fresh_instances() {
    let module = Module::new();
    let builds = Arc::new(AtomicU32::new(0));

    {
        let builds = builds.clone();
        module
            .injectable(Recipe::async_function(move || {
                let builds = builds.clone();
                async move { Ok(builds.fetch_add(1, Ordering::SeqCst)) }
            }))
            .unwrap();
    }

    // sole factory is async: the sync accessor fails
    assert!(matches!(
        module.find_instance::<u32>().unwrap_err(),
        Error::SyncAsyncMismatch { .. }
    ));

    // the async accessor builds a fresh instance each time
    let first = module.afind_instance::<u32>().await.unwrap();
    let second = module.afind_instance::<u32>().await.unwrap();
    assert_eq!(*first, 0);
    assert_eq!(*second, 1);
}

#[test]
fn singleton_uniqueness_under_concurrent_first_access() {
    let module = Module::new();
    let builds = Arc::new(AtomicU32::new(0));

    {
        let builds = builds.clone();
        module
            .singleton(Recipe::function(move || {
                std::thread::sleep(std::time::Duration::from_millis(5));
                Ok(builds.fetch_add(1, Ordering::SeqCst))
            }))
            .unwrap();
    }

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let module = module.clone();
            std::thread::spawn(move || module.find_instance::<u32>().unwrap())
        })
        .collect();

    let instances: Vec<Arc<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[derive(Debug)]
struct Session(u32);

#[test]
fn scoped_isolation_between_scope_entries() {
    let scope_name = unique("request");
    let module = Module::new();
    let builds = Arc::new(AtomicU32::new(0));

    {
        let builds = builds.clone();
        module
            .scoped(
                &scope_name,
                Recipe::function(move || Ok(Session(builds.fetch_add(1, Ordering::SeqCst)))),
            )
            .unwrap();
    }

    let first_entry = define_scope(&scope_name).unwrap();
    let a = module.find_instance::<Session>().unwrap();
    let b = module.find_instance::<Session>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    first_entry.close().unwrap();

    let second_entry = define_scope(&scope_name).unwrap();
    let c = module.find_instance::<Session>().unwrap();
    assert_ne!(a.0, c.0);
    second_entry.close().unwrap();
}

#[derive(Debug)]
struct Connection {
    label: &'static str,
}

#[test]
fn scope_exit_releases_resources_in_reverse_order() {
    let scope_name = unique("request");
    let module = Module::new();
    let released: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    struct Probe;
    struct Meter;

    for (label, spec) in [
        ("r1", TypeSpec::of::<Probe>()),
        ("r2", TypeSpec::of::<Meter>()),
    ] {
        let released = released.clone();
        module
            .scoped_resource_with(
                &scope_name,
                Recipe::function(move || {
                    let released = released.clone();
                    Ok(resource(
                        move || Ok(Connection { label }),
                        move || {
                            released.lock().push(label);
                            Ok(())
                        },
                    ))
                }),
                Register::default().mode(Mode::Override).on(spec),
            )
            .unwrap();
    }

    let guard = define_scope(&scope_name).unwrap();

    // acquire r1 before r2
    let r1 = module
        .find_instance_with::<Connection>(&TypeSpec::of::<Probe>())
        .unwrap();
    let r2 = module
        .find_instance_with::<Connection>(&TypeSpec::of::<Meter>())
        .unwrap();
    assert_eq!(r1.label, "r1");
    assert_eq!(r2.label, "r2");

    guard.close().unwrap();
    assert_eq!(*released.lock(), vec!["r2", "r1"]);
}

#[test]
fn open_resource_refuses_unlock() {
    let scope_name = unique("request");
    let module = Module::new();

    module
        .scoped_resource(
            &scope_name,
            Recipe::function(|| Ok(resource(|| Ok(Connection { label: "db" }), || Ok(())))),
        )
        .unwrap();

    let guard = define_scope(&scope_name).unwrap();
    module.find_instance::<Connection>().unwrap();

    assert!(matches!(
        module.unlock().unwrap_err(),
        Error::UnlockRefused { .. }
    ));

    guard.close().unwrap();
    module.unlock().unwrap();
}

#[tokio::test]
async fn async_resources_release_on_scope_close() {
    let scope_name = unique("request");
    let module = Module::new();
    let released = Arc::new(std::sync::atomic::AtomicBool::new(false));

    {
        let released = released.clone();
        module
            .scoped_async_resource(
                &scope_name,
                Recipe::function(move || {
                    let released = released.clone();
                    Ok(async_resource(
                        || async { Ok(Connection { label: "async" }) },
                        move || {
                            let released = released.clone();
                            async move {
                                released.store(true, Ordering::SeqCst);
                                Ok(())
                            }
                        },
                    ))
                }),
            )
            .unwrap();
    }

    let guard = adefine_scope(&scope_name).unwrap();

    // async-resource-backed registrations have no cold sync surface
    assert!(matches!(
        module.find_instance::<Connection>().unwrap_err(),
        Error::SyncAsyncMismatch { .. }
    ));

    let connection = module.afind_instance::<Connection>().await.unwrap();
    assert_eq!(connection.label, "async");

    // cached instances are served synchronously
    let cached = module.find_instance::<Connection>().unwrap();
    assert!(Arc::ptr_eq(&connection, &cached));

    guard.close().await.unwrap();
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn shared_scope_serves_all_threads() {
    let scope_name = unique("session");
    let module = Module::new();
    let builds = Arc::new(AtomicU32::new(0));

    {
        let builds = builds.clone();
        module
            .scoped(
                &scope_name,
                Recipe::function(move || Ok(Session(builds.fetch_add(1, Ordering::SeqCst)))),
            )
            .unwrap();
    }

    let guard = define_scope_with(&scope_name, ScopeOptions { shared: true }).unwrap();
    let here = module.find_instance::<Session>().unwrap();

    let there = {
        let module = module.clone();
        std::thread::spawn(move || module.find_instance::<Session>().unwrap())
    };

    assert!(Arc::ptr_eq(&here, &there.join().unwrap()));
    guard.close().unwrap();
}

#[test]
fn testing_profile_overrides_and_restores() {
    // the default module is process-wide: isolate with unique types
    #[derive(Debug, PartialEq)]
    struct ApiUrl(String);

    let main = tazriq::default_module();
    main.set_constant(ApiUrl("https://real".to_string()))
        .unwrap();

    tazriq::testing::test_module()
        .set_constant(ApiUrl("https://fake".to_string()))
        .unwrap();

    {
        let _profile = tazriq::testing::load_test_profile(&[]).unwrap();
        let url = main.find_instance::<ApiUrl>().unwrap();
        assert_eq!(url.0, "https://fake");
    }

    let url = main.find_instance::<ApiUrl>().unwrap();
    assert_eq!(url.0, "https://real");
}
