//! Convenience macros.

/// Macro for building a route table with a compact syntax.
///
/// Each entry is `path => kind`, where `kind` is one of `public`,
/// `authenticated`, `role(BaseRole)` or `permission("resource.action")`.
///
/// # Examples
///
/// ```rust
/// use school_rbac::{routes, role::BaseRole};
///
/// let table = routes![
///     "/login" => public,
///     "/dashboard" => authenticated,
///     "/admin/*" => role(BaseRole::Admin),
///     "/grades/*" => permission("grades.read"),
/// ];
/// assert_eq!(table.len(), 4);
/// ```
#[macro_export]
macro_rules! routes {
    (@route $path:expr => public) => {
        $crate::route::RouteConfig::public($path)
    };
    (@route $path:expr => authenticated) => {
        $crate::route::RouteConfig::new($path)
    };
    (@route $path:expr => role($role:expr)) => {
        $crate::route::RouteConfig::new($path).requires_role($role)
    };
    (@route $path:expr => permission($permission:expr)) => {
        $crate::route::RouteConfig::new($path).requires_permission($permission)
    };
    ($($path:expr => $kind:ident $(($arg:expr))?),* $(,)?) => {
        vec![$(
            $crate::routes!(@route $path => $kind $(($arg))?)
        ),*]
    };
}
