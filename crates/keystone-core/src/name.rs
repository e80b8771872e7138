//! Hierarchical key names and namespaces.
//!
//! A key name is a `/`-separated path whose first component selects the
//! namespace: `user/...`, `system/...`, `meta/...`, or a leading `/` for
//! cascading names that address the same path in every namespace.

/// Namespace of a key name, derived from its first path component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    /// `user/...` — per-user configuration.
    User,
    /// `system/...` — system-wide configuration.
    System,
    /// `/...` — cascading, addresses the path in all namespaces.
    Cascading,
    /// `meta/...` — metakey names, rejected by Get/Set.
    Meta,
    /// The empty name. Warned about but tolerated as a parent key.
    Empty,
    /// Anything else — unparseable, rejected by Get/Set.
    Invalid,
}

/// Split a name into its namespace and the namespace-relative path.
///
/// The returned path has no leading slash; it is empty for a bare
/// namespace root (`"user"`, `"/"`).
pub fn split_namespace(name: &str) -> (Namespace, &str) {
    if name.is_empty() {
        return (Namespace::Empty, "");
    }
    if let Some(rest) = name.strip_prefix('/') {
        return (Namespace::Cascading, rest);
    }
    let (head, rest) = match name.split_once('/') {
        Some((head, rest)) => (head, rest),
        None => (name, ""),
    };
    let ns = match head {
        "user" => Namespace::User,
        "system" => Namespace::System,
        "meta" => Namespace::Meta,
        _ => Namespace::Invalid,
    };
    (ns, rest)
}

/// Namespace of a key name.
pub fn namespace_of(name: &str) -> Namespace {
    split_namespace(name).0
}

/// Whether `name` is `parent` itself or below it.
///
/// Cascading names match any namespace on the other side; concrete
/// namespaces must agree. Component boundaries are respected, so
/// `user/app` does not cover `user/app2`.
pub fn covers(parent: &str, name: &str) -> bool {
    let (pns, ppath) = split_namespace(parent);
    let (nns, npath) = split_namespace(name);
    if pns == Namespace::Invalid || nns == Namespace::Invalid {
        return false;
    }
    if pns != Namespace::Cascading && nns != Namespace::Cascading && pns != nns {
        return false;
    }
    if ppath.is_empty() {
        return true;
    }
    match npath.strip_prefix(ppath) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// The path of `name` relative to `parent`, or `None` if `parent` does
/// not cover `name`. The empty string means `name` is `parent` itself.
pub fn relative_to<'a>(parent: &str, name: &'a str) -> Option<&'a str> {
    if !covers(parent, name) {
        return None;
    }
    let (_, ppath) = split_namespace(parent);
    let (_, npath) = split_namespace(name);
    if ppath.is_empty() {
        return Some(npath);
    }
    match npath.strip_prefix(ppath) {
        Some("") => Some(""),
        Some(rest) => Some(&rest[1..]),
        None => None,
    }
}
