//! Route-level authorization.
//!
//! Routes are matched first-match-wins in registration order. A path ending
//! in `*` matches any route starting with the part before the `*`; any other
//! path must match exactly. Paths with no matching route are allowed for
//! authenticated callers: register a catch-all `*` route to deny by default.
//!
//! Every non-public route requires a legal (role, extra role) pair, including
//! role-only routes and unmatched paths that never reach the engine.

#[cfg(feature = "audit")]
use log::info;

use crate::{
    context::RequestContext,
    core::{AccessResult, PermissionEngine},
    role::{BaseRole, display_extra, parse_combination},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Access requirements for one route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub path: String,
    #[serde(default)]
    pub required_permission: Option<String>,
    #[serde(default)]
    pub required_role: Option<BaseRole>,
    #[serde(default)]
    pub is_public: bool,
}

impl RouteConfig {
    /// A route reachable by any authenticated caller.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            required_permission: None,
            required_role: None,
            is_public: false,
        }
    }

    /// A route reachable without authentication.
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            is_public: true,
            ..Self::new(path)
        }
    }

    pub fn requires_permission(mut self, permission_id: impl Into<String>) -> Self {
        self.required_permission = Some(permission_id.into());
        self
    }

    pub fn requires_role(mut self, role: BaseRole) -> Self {
        self.required_role = Some(role);
        self
    }

    /// Check whether this route pattern matches a concrete path.
    pub fn matches(&self, path: &str) -> bool {
        match self.path.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => self.path == path,
        }
    }
}

/// A default route table for a school administration front end.
pub fn school_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::public("/login"),
        RouteConfig::public("/public/*"),
        RouteConfig::new("/dashboard"),
        RouteConfig::new("/admin/*").requires_role(BaseRole::Admin),
        RouteConfig::new("/users/*").requires_permission("users.read"),
        RouteConfig::new("/students/*").requires_permission("students.read"),
        RouteConfig::new("/grades/*").requires_permission("grades.read"),
        RouteConfig::new("/attendance/*").requires_permission("attendance.read"),
        RouteConfig::new("/schedule/*").requires_permission("schedule.read"),
        RouteConfig::new("/inventory/*").requires_permission("inventory.read"),
        RouteConfig::new("/finance/*").requires_permission("finance.read"),
        RouteConfig::new("/reports/*").requires_permission("reports.read"),
        RouteConfig::new("/osis/*").requires_permission("osis.read"),
    ]
}

/// Maps route paths to permission checks.
pub struct RouteGuard {
    engine: Arc<PermissionEngine>,
    routes: RwLock<Vec<RouteConfig>>,
}

impl RouteGuard {
    /// Create a guard with no registered routes.
    pub fn new(engine: Arc<PermissionEngine>) -> Self {
        Self::with_routes(engine, Vec::new())
    }

    /// Create a guard with an initial route table.
    pub fn with_routes(engine: Arc<PermissionEngine>, routes: Vec<RouteConfig>) -> Self {
        Self {
            engine,
            routes: RwLock::new(routes),
        }
    }

    /// The engine permission checks are delegated to.
    pub fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    /// Append a route. Earlier registrations take precedence.
    pub fn register_route(&self, config: RouteConfig) {
        #[cfg(feature = "audit")]
        info!("Route '{}' registered", config.path);

        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config);
    }

    /// Remove every route registered with exactly this pattern.
    pub fn unregister_route(&self, path: &str) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let before = routes.len();
        routes.retain(|route| route.path != path);
        before != routes.len()
    }

    /// The registered routes, in match order.
    pub fn routes(&self) -> Vec<RouteConfig> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The first route matching `path`.
    pub fn find_route(&self, path: &str) -> Option<RouteConfig> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|route| route.matches(path))
            .cloned()
    }

    /// Decide whether a caller may reach `path`.
    pub fn can_access_route(
        &self,
        role: Option<&str>,
        extra_role: Option<&str>,
        path: &str,
        context: Option<&RequestContext>,
    ) -> AccessResult {
        let route = self.find_route(path);
        self.evaluate(route.as_ref(), role, extra_role, context, true)
    }

    /// Every registered route the caller may reach, in match order.
    ///
    /// Each route is judged by its own requirements. These checks are not
    /// written to the audit log.
    pub fn list_accessible_routes(&self, role: Option<&str>, extra_role: Option<&str>) -> Vec<RouteConfig> {
        self.routes()
            .into_iter()
            .filter(|route| {
                self.evaluate(Some(route), role, extra_role, None, false)
                    .granted
            })
            .collect()
    }

    fn evaluate(
        &self,
        route: Option<&RouteConfig>,
        role: Option<&str>,
        extra_role: Option<&str>,
        context: Option<&RequestContext>,
        record: bool,
    ) -> AccessResult {
        if route.is_some_and(|route| route.is_public) {
            return AccessResult::granted(None);
        }
        let Some(role) = role.filter(|role| !role.trim().is_empty()) else {
            return AccessResult::denied("User is not authenticated", None);
        };
        let identity = parse_combination(role, extra_role);
        let Some(route) = route else {
            return identity_only(role, extra_role, identity.is_some());
        };

        if let Some(required) = route.required_role {
            let Some((base, _)) = identity else {
                return identity_only(role, extra_role, false);
            };
            if base != required {
                return AccessResult::denied(
                    format!("Route '{}' requires role '{required}'", route.path),
                    None,
                );
            }
        }

        match &route.required_permission {
            Some(permission_id) => self
                .engine
                .evaluate(role, extra_role, permission_id, context, record),
            None => identity_only(role, extra_role, identity.is_some()),
        }
    }
}

/// Grant or deny on the caller's identity alone.
fn identity_only(role: &str, extra_role: Option<&str>, valid: bool) -> AccessResult {
    if valid {
        AccessResult::granted(None)
    } else {
        AccessResult::denied(
            format!("Invalid role combination: {role} + {}", display_extra(extra_role)),
            None,
        )
    }
}
