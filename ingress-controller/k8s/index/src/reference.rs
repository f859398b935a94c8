//! Reverse lookups from a referenced object (a Secret, a Service, a Policy, ...) to the resources
//! that must be rendered again when it changes.

use crate::validation::{APP_PROTECT_DOS_RESOURCE, JWT_KEY};
use nginx_ingress_controller_k8s_api::{
    virtual_server::{PolicyReference, Upstream},
    Ingress, Policy, ResourceExt, TransportServer, VirtualServer, VirtualServerRoute,
};
use std::sync::Arc;


/// Answers whether an object, by namespace and name, is referenced by a resource.
///
/// Kinds that cannot reference the object keep the default implementation.
pub trait ReferenceChecker {
    fn referenced_by_ingress(&self, _namespace: &str, _name: &str, _ingress: &Ingress) -> bool {
        false
    }

    fn referenced_by_minion(&self, _namespace: &str, _name: &str, _minion: &Ingress) -> bool {
        false
    }

    fn referenced_by_virtual_server(
        &self,
        _namespace: &str,
        _name: &str,
        _vs: &VirtualServer,
    ) -> bool {
        false
    }

    fn referenced_by_virtual_server_route(
        &self,
        _namespace: &str,
        _name: &str,
        _vsr: &VirtualServerRoute,
    ) -> bool {
        false
    }

    fn referenced_by_transport_server(
        &self,
        _namespace: &str,
        _name: &str,
        _ts: &TransportServer,
    ) -> bool {
        false
    }
}

/// Finds resources that use a Secret for TLS or, with NGINX Plus, for JWT validation.
#[derive(Copy, Clone, Debug)]
pub struct SecretReferenceChecker {
    pub is_plus: bool,
}

/// Finds resources that route to a Service.
///
/// Endpoints are looked up through the Service of the same name. Upstreams that route through the
/// cluster IP do not depend on endpoints, so the endpoints checker skips them.
#[derive(Copy, Clone, Debug)]
pub struct ServiceReferenceChecker {
    pub skip_cluster_ip_upstreams: bool,
}

/// Finds VirtualServers and VirtualServerRoutes that apply a Policy.
#[derive(Copy, Clone, Debug, Default)]
pub struct PolicyReferenceChecker;

/// Finds regular and master Ingresses whose annotation lists an App Protect resource.
#[derive(Copy, Clone, Debug)]
pub struct AppProtectReferenceChecker {
    pub annotation: &'static str,
}

/// Finds resources protected by a DosProtectedResource.
#[derive(Copy, Clone, Debug, Default)]
pub struct DosProtectedReferenceChecker;

fn annotation<'i>(ingress: &'i Ingress, name: &str) -> Option<&'i str> {
    ingress.annotations().get(name).map(String::as_str)
}

/// Matches a `namespace/name` or same-namespace `name` reference.
fn matches_reference(reference: &str, namespace: &str, name: &str, resource_ns: &str) -> bool {
    match reference.split_once('/') {
        Some((ns, n)) => ns == namespace && n == name,
        None => namespace == resource_ns && reference == name,
    }
}

fn is_policy_referenced(
    policies: &[PolicyReference],
    resource_ns: &str,
    namespace: &str,
    name: &str,
) -> bool {
    policies.iter().any(|p| {
        let ns = if p.namespace.is_empty() {
            resource_ns
        } else {
            p.namespace.as_str()
        };
        p.name == name && ns == namespace
    })
}

/// Returns the policies, among `policies`, that read the given Secret.
pub fn find_policies_for_secret<'p>(
    policies: impl IntoIterator<Item = &'p Arc<Policy>>,
    namespace: &str,
    name: &str,
) -> Vec<Arc<Policy>> {
    policies
        .into_iter()
        .filter(|p| p.namespace().as_deref() == Some(namespace))
        .filter(|p| p.spec.secret_names().any(|secret| secret == name))
        .cloned()
        .collect()
}

// === impl SecretReferenceChecker ===

impl SecretReferenceChecker {
    fn jwt_key_matches(&self, name: &str, ingress: &Ingress) -> bool {
        self.is_plus && annotation(ingress, JWT_KEY) == Some(name)
    }
}

impl ReferenceChecker for SecretReferenceChecker {
    fn referenced_by_ingress(&self, namespace: &str, name: &str, ingress: &Ingress) -> bool {
        if ingress.namespace().as_deref() != Some(namespace) {
            return false;
        }

        let tls = ingress
            .spec
            .iter()
            .flat_map(|spec| spec.tls.iter().flatten())
            .any(|tls| tls.secret_name.as_deref() == Some(name));

        tls || self.jwt_key_matches(name, ingress)
    }

    fn referenced_by_minion(&self, namespace: &str, name: &str, minion: &Ingress) -> bool {
        minion.namespace().as_deref() == Some(namespace) && self.jwt_key_matches(name, minion)
    }

    fn referenced_by_virtual_server(&self, namespace: &str, name: &str, vs: &VirtualServer) -> bool {
        vs.namespace().as_deref() == Some(namespace)
            && vs.spec.tls.as_ref().is_some_and(|tls| tls.secret == name)
    }
}

// === impl ServiceReferenceChecker ===

impl ServiceReferenceChecker {
    fn upstreams_reference(
        &self,
        upstreams: &[Upstream],
        name: &str,
    ) -> bool {
        upstreams
            .iter()
            .filter(|u| !(self.skip_cluster_ip_upstreams && u.use_cluster_ip))
            .any(|u| u.service == name)
    }
}

impl ReferenceChecker for ServiceReferenceChecker {
    fn referenced_by_ingress(&self, namespace: &str, name: &str, ingress: &Ingress) -> bool {
        if ingress.namespace().as_deref() != Some(namespace) {
            return false;
        }
        let Some(spec) = &ingress.spec else {
            return false;
        };

        let default = spec.default_backend.iter();
        let paths = spec
            .rules
            .iter()
            .flatten()
            .filter_map(|rule| rule.http.as_ref())
            .flat_map(|http| http.paths.iter().map(|p| &p.backend));

        default
            .chain(paths)
            .filter_map(|backend| backend.service.as_ref())
            .any(|svc| svc.name == name)
    }

    fn referenced_by_minion(&self, namespace: &str, name: &str, minion: &Ingress) -> bool {
        self.referenced_by_ingress(namespace, name, minion)
    }

    fn referenced_by_virtual_server(&self, namespace: &str, name: &str, vs: &VirtualServer) -> bool {
        vs.namespace().as_deref() == Some(namespace)
            && self.upstreams_reference(&vs.spec.upstreams, name)
    }

    fn referenced_by_virtual_server_route(
        &self,
        namespace: &str,
        name: &str,
        vsr: &VirtualServerRoute,
    ) -> bool {
        vsr.namespace().as_deref() == Some(namespace)
            && self.upstreams_reference(&vsr.spec.upstreams, name)
    }

    fn referenced_by_transport_server(
        &self,
        namespace: &str,
        name: &str,
        ts: &TransportServer,
    ) -> bool {
        ts.namespace().as_deref() == Some(namespace)
            && ts.spec.upstreams.iter().any(|u| u.service == name)
    }
}

// === impl PolicyReferenceChecker ===

impl ReferenceChecker for PolicyReferenceChecker {
    fn referenced_by_virtual_server(&self, namespace: &str, name: &str, vs: &VirtualServer) -> bool {
        let vs_ns = vs.namespace().unwrap_or_default();
        is_policy_referenced(&vs.spec.policies, &vs_ns, namespace, name)
            || vs
                .spec
                .routes
                .iter()
                .any(|r| is_policy_referenced(&r.policies, &vs_ns, namespace, name))
    }

    fn referenced_by_virtual_server_route(
        &self,
        namespace: &str,
        name: &str,
        vsr: &VirtualServerRoute,
    ) -> bool {
        let vsr_ns = vsr.namespace().unwrap_or_default();
        vsr.spec
            .subroutes
            .iter()
            .any(|r| is_policy_referenced(&r.policies, &vsr_ns, namespace, name))
    }
}

// === impl AppProtectReferenceChecker ===

impl ReferenceChecker for AppProtectReferenceChecker {
    fn referenced_by_ingress(&self, namespace: &str, name: &str, ingress: &Ingress) -> bool {
        let Some(references) = annotation(ingress, self.annotation) else {
            return false;
        };
        let ingress_ns = ingress.namespace().unwrap_or_default();
        references
            .split(',')
            .any(|r| matches_reference(r, namespace, name, &ingress_ns))
    }
}

// === impl DosProtectedReferenceChecker ===

impl ReferenceChecker for DosProtectedReferenceChecker {
    fn referenced_by_ingress(&self, namespace: &str, name: &str, ingress: &Ingress) -> bool {
        let ingress_ns = ingress.namespace().unwrap_or_default();
        annotation(ingress, APP_PROTECT_DOS_RESOURCE)
            .is_some_and(|r| matches_reference(r, namespace, name, &ingress_ns))
    }

    fn referenced_by_virtual_server(&self, namespace: &str, name: &str, vs: &VirtualServer) -> bool {
        let vs_ns = vs.namespace().unwrap_or_default();
        std::iter::once(&vs.spec.dos)
            .chain(vs.spec.routes.iter().map(|r| &r.dos))
            .any(|dos| matches_reference(dos, namespace, name, &vs_ns))
    }

    fn referenced_by_virtual_server_route(
        &self,
        namespace: &str,
        name: &str,
        vsr: &VirtualServerRoute,
    ) -> bool {
        let vsr_ns = vsr.namespace().unwrap_or_default();
        vsr.spec
            .subroutes
            .iter()
            .any(|r| matches_reference(&r.dos, namespace, name, &vsr_ns))
    }
}
