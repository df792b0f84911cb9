//! Security-focused tests for the permission engine.
//! These tests ensure the engine cannot be compromised through various attack vectors.

use school_rbac::{
    BaseRole, CustomRolePatch, CustomRoleStore, NewCustomRole, PermissionEngine, RequestContext,
    RouteConfig, RouteGuard,
};
use std::{sync::Arc, thread};

#[test]
fn test_privilege_escalation_prevention() {
    let engine = PermissionEngine::new();

    // An extra role can never be combined with admin to widen anything.
    for extra in ["staff", "osis", "wakasek", "kepsek"] {
        assert!(!engine
            .has_permission("admin", Some(extra), "system.admin", None)
            .granted);
    }

    // Principal permissions cannot be bolted onto a student or parent.
    assert!(!engine
        .has_permission("student", Some("kepsek"), "finance.manage", None)
        .granted);
    assert!(!engine
        .has_permission("parent", Some("wakasek"), "schedule.manage", None)
        .granted);

    // Case variants are not the same role.
    assert!(!engine
        .has_permission("ADMIN", None, "system.admin", None)
        .granted);
    assert!(!engine
        .has_permission(" admin", None, "system.admin", None)
        .granted);
}

#[test]
fn test_input_validation_and_injection_prevention() {
    let engine = PermissionEngine::new();

    let long_string = "a".repeat(10000);
    let malicious_inputs = vec![
        "",
        " ",
        "\n",
        "\t",
        "users\x00.read",
        "users.read'; DROP TABLE roles; --",
        "../../../etc/passwd",
        "users.read<script>alert('xss')</script>",
        "__proto__",
        "constructor.read",
        "users.prototype",
        long_string.as_str(),
    ];

    for malicious_input in malicious_inputs {
        // Malicious permission ids are denied, never granted
        let result = engine.has_permission("admin", None, malicious_input, None);
        assert!(!result.granted, "granted for {malicious_input:?}");
        assert!(result.reason.is_some());

        // Malicious role strings are denied for real permissions
        let result = engine.has_permission(malicious_input, None, "users.read", None);
        assert!(!result.granted, "granted role {malicious_input:?}");

        assert!(engine.catalog().get_permission(malicious_input).is_none());
    }
}

#[test]
fn test_prototype_pollution_keys_never_resolve() {
    let engine = PermissionEngine::new();

    for (resource, action) in [("__proto__", "read"), ("users", "constructor"), ("prototype", "x")] {
        let result = engine.can_access_resource("admin", None, resource, action, None);
        assert!(!result.granted);
    }

    let store = CustomRoleStore::in_memory();
    let polluted = NewCustomRole::new("Evil", BaseRole::Teacher, "admin-1")
        .with_permissions(["__proto__.admin"]);
    assert!(store.create(polluted).is_err());

    let parents = NewCustomRole::new("Evil", BaseRole::Teacher, "admin-1")
        .inheriting_from(["constructor"]);
    assert!(store.create(parents).is_err());
}

#[test]
fn test_custom_role_cycles_do_not_hang() {
    let store = CustomRoleStore::in_memory();
    let ids: Vec<String> = (0..5)
        .map(|i| {
            store
                .create(
                    NewCustomRole::new(format!("ring-{i}"), BaseRole::Teacher, "admin-1")
                        .with_permissions([format!("ring{i}.member")]),
                )
                .unwrap()
                .id
        })
        .collect();

    // Wire a ring: 0 -> 1 -> 2 -> 3 -> 4 -> 0, plus self loops.
    for (i, id) in ids.iter().enumerate() {
        let next = ids[(i + 1) % ids.len()].clone();
        store
            .update(
                id,
                CustomRolePatch {
                    inherits_from: Some(vec![next, id.clone()]),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    for id in &ids {
        let perms = store.effective_permissions(id, BaseRole::Student);
        assert_eq!(perms.len(), ids.len());
    }
}

#[test]
fn test_concurrent_access_safety() {
    let engine = Arc::new(PermissionEngine::new());
    let store = Arc::new(CustomRoleStore::in_memory());
    let role = store
        .create(
            NewCustomRole::new("Shared", BaseRole::Teacher, "admin-1")
                .with_permissions(["inventory.read"]),
        )
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let store = Arc::clone(&store);
            let role_id = role.id.clone();
            thread::spawn(move || {
                let user = format!("user_{i}");
                store.assign(&user, &role_id).unwrap();

                let context = RequestContext::for_user(user.clone());
                for _ in 0..50 {
                    let result = engine.has_user_permission(
                        store.as_ref(),
                        &user,
                        "teacher",
                        None,
                        "inventory.read",
                        Some(&context),
                    );
                    assert!(result.granted);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..10 {
        assert_eq!(store.get_user_roles(&format!("user_{i}")).len(), 1);
    }
    // 10 threads x 50 checks x (base denial + custom grant), capped by the ring buffer
    assert_eq!(engine.audit_log_len(), 1000);
}

#[test]
fn test_concurrent_route_registration() {
    let guard = Arc::new(RouteGuard::new(Arc::new(PermissionEngine::new())));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                guard.register_route(RouteConfig::new(format!("/area-{i}/*")).requires_permission("grades.read"));
                guard.can_access_route(Some("student"), None, &format!("/area-{i}/x"), None)
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().granted);
    }
    assert_eq!(guard.routes().len(), 8);
}

#[test]
fn test_error_information_leakage() {
    let engine = PermissionEngine::new();

    // Denials name the requested permission and role only, never the granted set.
    let result = engine.has_permission("student", None, "finance.manage", None);
    let reason = result.reason.unwrap();
    assert!(!reason.contains("grades.read"));
    assert!(!reason.contains("attendance.read"));
}
