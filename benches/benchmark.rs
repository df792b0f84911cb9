use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use school_rbac::{
    BaseRole, CustomRoleStore, EngineConfigBuilder, NewCustomRole, PermissionEngine,
    RequestContext, RouteGuard, route::school_routes,
};
use std::hint::black_box;
use std::sync::Arc;

fn quiet_engine() -> PermissionEngine {
    let config = EngineConfigBuilder::new().log_decisions(false).build();
    PermissionEngine::with_config(config).unwrap()
}

fn bench_permission_check(c: &mut Criterion) {
    let engine = quiet_engine();
    let context = RequestContext::for_user("teacher-1");

    c.bench_function("permission_check", |b| {
        b.iter(|| {
            black_box(engine.has_permission(
                black_box("teacher"),
                black_box(Some("staff")),
                black_box("inventory.manage"),
                Some(&context),
            ))
        })
    });
}

fn bench_permission_denial(c: &mut Criterion) {
    let engine = quiet_engine();

    c.bench_function("permission_denial", |b| {
        b.iter(|| {
            black_box(engine.has_permission(
                black_box("student"),
                None,
                black_box("system.admin"),
                None,
            ))
        })
    });
}

fn bench_has_any_permission(c: &mut Criterion) {
    let engine = quiet_engine();
    let mut group = c.benchmark_group("has_any_permission");

    for size in [1usize, 4, 16] {
        // The only granted id sits at the end of the list.
        let mut ids = vec!["finance.manage"; size - 1];
        ids.push("grades.read");

        group.bench_with_input(BenchmarkId::new("parent", size), &ids, |b, ids| {
            b.iter(|| black_box(engine.has_any_permission("parent", None, &ids[..], None)))
        });
    }
    group.finish();
}

fn bench_resource_access(c: &mut Criterion) {
    let engine = quiet_engine();

    c.bench_function("resource_access_sanitized", |b| {
        b.iter(|| {
            black_box(engine.can_access_resource(
                "teacher",
                None,
                black_box("<b>grades</b>"),
                black_box("write;--"),
                None,
            ))
        })
    });
}

fn bench_custom_role_flattening(c: &mut Criterion) {
    let mut group = c.benchmark_group("custom_role_flattening");

    for depth in [1usize, 5, 20] {
        let store = CustomRoleStore::in_memory();
        let mut parent: Option<String> = None;
        for i in 0..depth {
            let role = store
                .create(
                    NewCustomRole::new(format!("level-{i}"), BaseRole::Teacher, "bench")
                        .with_permissions([format!("level{i}.read")])
                        .inheriting_from(parent.iter().cloned()),
                )
                .unwrap();
            parent = Some(role.id);
        }
        let head = parent.unwrap();

        group.bench_with_input(BenchmarkId::new("chain", depth), &head, |b, head| {
            b.iter(|| black_box(store.effective_permissions(head, BaseRole::Teacher)))
        });
    }
    group.finish();
}

fn bench_user_permission_with_custom_roles(c: &mut Criterion) {
    let engine = quiet_engine();
    let store = CustomRoleStore::in_memory();
    let role = store
        .create(
            NewCustomRole::new("Librarian", BaseRole::Teacher, "bench")
                .with_permissions(["inventory.read", "inventory.manage"]),
        )
        .unwrap();
    store.assign("teacher-1", &role.id).unwrap();

    c.bench_function("user_permission_custom_grant", |b| {
        b.iter(|| {
            black_box(engine.has_user_permission(
                &store,
                "teacher-1",
                "teacher",
                None,
                black_box("inventory.manage"),
                None,
            ))
        })
    });
}

fn bench_route_check(c: &mut Criterion) {
    let guard = RouteGuard::with_routes(Arc::new(quiet_engine()), school_routes());

    c.bench_function("route_check", |b| {
        b.iter(|| {
            black_box(guard.can_access_route(
                Some("parent"),
                None,
                black_box("/grades/term-1/report"),
                None,
            ))
        })
    });

    c.bench_function("list_accessible_routes", |b| {
        b.iter(|| black_box(guard.list_accessible_routes(Some("teacher"), Some("wakasek"))))
    });
}

fn bench_concurrent_access(c: &mut Criterion) {
    let engine = Arc::new(quiet_engine());

    c.bench_function("concurrent_access", |b| {
        b.iter(|| {
            let engine = Arc::clone(&engine);
            black_box(engine.has_permission("teacher", Some("kepsek"), "finance.manage", None))
        })
    });
}

criterion_group!(
    benches,
    bench_permission_check,
    bench_permission_denial,
    bench_has_any_permission,
    bench_resource_access,
    bench_custom_role_flattening,
    bench_user_permission_with_custom_roles,
    bench_route_check,
    bench_concurrent_access
);
criterion_main!(benches);
