//! Property-based testing for the permission engine.
//!
//! This module uses the `proptest` crate to check the engine's core
//! invariants over arbitrary role strings, extra roles and permission ids.

#[cfg(test)]
mod tests {
    use crate::{
        audit::AuditFilter,
        context::RequestContext,
        core::{EngineConfigBuilder, PermissionEngine},
        custom_role::{CustomRoleStore, NewCustomRole},
        permission::BUILTIN_PERMISSIONS,
        role::{BaseRole, ExtraRole, effective_permissions, is_valid_combination, parse_combination},
    };
    use proptest::prelude::*;
    use std::collections::HashSet;

    /// Known base roles plus arbitrary junk.
    fn role_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => prop::sample::select(BaseRole::ALL.to_vec()).prop_map(|r| r.to_string()),
            1 => prop::string::string_regex("[a-zA-Z_]{0,10}").unwrap(),
        ]
    }

    /// Absent, a known extra role, or arbitrary junk.
    fn extra_role_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            2 => Just(None),
            4 => prop::sample::select(ExtraRole::ALL.to_vec()).prop_map(|e| Some(e.to_string())),
            1 => prop::string::string_regex("[a-z]{1,8}").unwrap().prop_map(Some),
        ]
    }

    /// Catalog ids plus arbitrary dotted strings.
    fn permission_id_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => prop::sample::select(BUILTIN_PERMISSIONS.to_vec()).prop_map(|def| def.id.to_string()),
            1 => prop::string::string_regex("[a-z]{1,8}\\.[a-z]{1,8}").unwrap(),
        ]
    }

    fn quiet_engine(max_audit_entries: usize) -> PermissionEngine {
        let config = EngineConfigBuilder::new()
            .max_audit_entries(max_audit_entries)
            .log_decisions(false)
            .build();
        PermissionEngine::with_config(config).unwrap()
    }

    proptest! {
        #[test]
        fn prop_decisions_are_deterministic(
            role in role_strategy(),
            extra in extra_role_strategy(),
            permission_id in permission_id_strategy()
        ) {
            let engine = quiet_engine(10);
            let first = engine.has_permission(&role, extra.as_deref(), &permission_id, None);
            let second = engine.has_permission(&role, extra.as_deref(), &permission_id, None);

            // Property: identical inputs give identical answers
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_grant_matches_effective_permissions(
            role in role_strategy(),
            extra in extra_role_strategy(),
            permission_id in permission_id_strategy()
        ) {
            let engine = quiet_engine(10);
            let result = engine.has_permission(&role, extra.as_deref(), &permission_id, None);

            match parse_combination(&role, extra.as_deref()) {
                Some((base, extra)) if engine.catalog().contains(&permission_id) => {
                    let effective = effective_permissions(base, extra);
                    prop_assert_eq!(result.granted, effective.contains(&permission_id));
                }
                _ => {
                    prop_assert!(!result.granted);
                }
            }
        }

        #[test]
        fn prop_invalid_combination_denies_everything(
            role in role_strategy(),
            extra in extra_role_strategy()
        ) {
            prop_assume!(!is_valid_combination(&role, extra.as_deref()));
            let engine = quiet_engine(BUILTIN_PERMISSIONS.len());

            for def in BUILTIN_PERMISSIONS {
                let result = engine.has_permission(&role, extra.as_deref(), def.id, None);
                prop_assert!(!result.granted);
            }
            prop_assert!(engine.get_user_permissions(&role, extra.as_deref()).is_empty());
        }

        #[test]
        fn prop_has_any_is_disjunction(
            role in role_strategy(),
            extra in extra_role_strategy(),
            ids in prop::collection::vec(permission_id_strategy(), 1..6)
        ) {
            let engine = quiet_engine(100);
            let any = engine.has_any_permission(&role, extra.as_deref(), &ids[..], None);
            let expected = ids
                .iter()
                .any(|id| engine.has_permission(&role, extra.as_deref(), id, None).granted);

            prop_assert_eq!(any.granted, expected);
            if !any.granted {
                prop_assert!(any.reason.unwrap().ends_with(&ids.join(", ")));
            }
        }

        #[test]
        fn prop_inheritance_chain_unions_permissions(
            length in 1usize..8
        ) {
            let store = CustomRoleStore::in_memory();
            let mut parent: Option<String> = None;
            let mut expected = HashSet::new();

            // Build the chain leaf first so each role can name its parent.
            for (i, def) in BUILTIN_PERMISSIONS.iter().take(length).enumerate() {
                expected.insert(def.id.to_string());
                let role = store
                    .create(
                        NewCustomRole::new(format!("link-{i}"), BaseRole::Teacher, "prop")
                            .with_permissions([def.id])
                            .inheriting_from(parent.iter().cloned()),
                    )
                    .unwrap();
                parent = Some(role.id);
            }

            let head = parent.unwrap();
            let flattened: HashSet<String> = store
                .effective_permissions(&head, BaseRole::Student)
                .into_iter()
                .collect();
            prop_assert_eq!(flattened, expected);
        }

        #[test]
        fn prop_audit_log_is_bounded(
            max in 1usize..20,
            calls in 0usize..60
        ) {
            let engine = quiet_engine(max);
            for i in 0..calls {
                let context = RequestContext::for_user(format!("u{i}"));
                engine.has_permission("teacher", None, "grades.write", Some(&context));
            }

            let logs = engine.get_audit_logs(Some(&AuditFilter::new()));
            prop_assert_eq!(logs.len(), calls.min(max));

            // Property: the retained entries are the most recent ones, newest first
            for (offset, entry) in logs.iter().enumerate() {
                prop_assert_eq!(&entry.user_id, &format!("u{}", calls - 1 - offset));
            }
        }

        #[test]
        fn prop_tags_do_not_change_resource_checks(
            role in role_strategy(),
            extra in extra_role_strategy(),
            tag in "[a-z]{0,6}"
        ) {
            let engine = quiet_engine(10);
            let plain = engine.can_access_resource(&role, extra.as_deref(), "grades", "read", None);
            let tagged = engine.can_access_resource(
                &role,
                extra.as_deref(),
                &format!("<{tag}>grades</{tag}>"),
                &format!("read<{tag}>;junk"),
                None,
            );
            prop_assert_eq!(plain.granted, tagged.granted);
        }
    }
}
