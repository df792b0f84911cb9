//! # School RBAC
//!
//! This crate provides the role-based access control and policy engine for a
//! school administration system: a static permission catalog, a base-role
//! permission matrix with an extra-role overlay, role combination rules,
//! administrator-defined custom roles with inheritance, route-level guards and
//! a bounded audit trail.
//!
//! ## Features
//!
//! - Closed set of base roles (`admin`, `teacher`, `student`, `parent`)
//! - Optional extra roles (`staff`, `osis`, `wakasek`, `kepsek`) layered on top
//! - Deterministic decisions with structured denial reasons
//! - Custom roles with cycle-safe inheritance, templates and user assignments
//! - Route guard with prefix wildcards
//! - Bounded in-memory audit log plus structured log lines
//! - Pluggable key-value storage for custom roles and audit entries
//! - Thread-safe: one engine can be shared across request handlers
//!
//! ## Quick Start
//!
//! ```rust
//! use school_rbac::{PermissionEngine, RequestContext};
//!
//! let engine = PermissionEngine::new();
//!
//! let context = RequestContext::for_user("teacher-17");
//! let result = engine.has_permission("teacher", Some("staff"), "inventory.manage", Some(&context));
//! assert!(result.granted);
//!
//! let result = engine.has_permission("teacher", None, "inventory.manage", None);
//! assert!(!result.granted);
//! assert!(result.reason.unwrap().contains("not granted for role"));
//!
//! // Every decision lands in the audit log.
//! assert_eq!(engine.get_audit_logs(None).len(), 2);
//! ```
//!
//! ## Audit Logging
//!
//! When the `audit` feature is enabled (the default), every permission check
//! is emitted as a JSON log line on the `school_rbac::audit` target using the
//! standard Rust logging framework. To enable logging:
//!
//! ```rust
//! # #[cfg(feature = "audit")]
//! # {
//! use school_rbac::init_audit_logger;
//!
//! // Initialize logging (must be called early in program execution)
//! init_audit_logger();
//!
//! // Configure log level through RUST_LOG environment variable:
//! // RUST_LOG=info,school_rbac::audit=info
//! # }
//! ```
//!
//! The following events are logged:
//! - Permission checks (granted at info, denied at warn)
//! - Custom role and template creation, updates and deletion
//! - Custom role assignments and removals
//! - Route registration
//! - Storage failures

#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    let _ = env_logger::try_init();
}

pub mod audit;
pub mod context;
pub mod core;
pub mod custom_role;
pub mod error;
pub mod macros;
pub mod permission;
pub mod property_tests;
pub mod role;
pub mod route;
pub mod storage;
pub mod template;

// Re-export main types for convenience
pub use crate::{
    audit::{AuditFilter, AuditLog, AuditLogEntry},
    context::RequestContext,
    core::{AccessResult, EngineConfig, EngineConfigBuilder, PermissionEngine},
    custom_role::{CustomRole, CustomRolePatch, CustomRoleStore, NewCustomRole},
    error::{Error, Result},
    permission::{Permission, PermissionCatalog},
    role::{BaseRole, ExtraRole, is_valid_combination},
    route::{RouteConfig, RouteGuard},
    storage::{MemoryStorage, Storage},
    template::{NewRoleTemplate, RoleTemplate},
};

#[cfg(feature = "persistence")]
pub use crate::storage::FileStorage;
