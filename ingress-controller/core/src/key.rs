use nginx_ingress_controller_k8s_api::ObjectMeta;

/// Formats a `namespace/name` key.
#[inline]
pub fn ns_name(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// The `namespace/name` key of an object.
pub fn object_key(meta: &ObjectMeta) -> String {
    ns_name(
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}

/// Resolves a reference that may omit its namespace into a `namespace/name` key.
pub fn qualify(default_namespace: &str, reference: &str) -> String {
    if reference.contains('/') {
        return reference.to_string();
    }
    ns_name(default_namespace, reference)
}

/// Splits a reference into its namespace and name, using `default_namespace` when the reference
/// is unqualified.
pub fn split_reference<'a>(default_namespace: &'a str, reference: &'a str) -> (&'a str, &'a str) {
    match reference.split_once('/') {
        Some((ns, name)) => (ns, name),
        None => (default_namespace, reference),
    }
}

