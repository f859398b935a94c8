use nginx_ingress_controller_k8s_api::ObjectMeta;

/// Returns true when the object described by `a` wins a contested host, listener or path over
/// the object described by `b`.
///
/// The older object wins. Objects created at the same instant are ordered by UID and the
/// lexicographically greater UID wins, so the result never depends on processing order. An object
/// without a creation timestamp is treated as older than every object that has one.
pub fn wins(a: &ObjectMeta, b: &ObjectMeta) -> bool {
    let a_created = a.creation_timestamp.as_ref().map(|t| t.0);
    let b_created = b.creation_timestamp.as_ref().map(|t| t.0);

    if a_created == b_created {
        return a.uid > b.uid;
    }

    a_created < b_created
}
