//! Checks applied to resources before they are admitted into the configuration.
//!
//! The [`Configuration`](crate::Configuration) consults a [`ClassSelector`] to decide whether a
//! resource targets this controller at all, and a [`Validate`] implementation to decide whether it
//! is usable. Both are injected at construction so that tests and alternative deployments can swap
//! them out.

mod annotations;
pub mod field;
pub(crate) mod format;
mod global_configuration;
mod ingress;
mod transport_server;
mod virtual_server;


pub use self::{
    annotations::{
        APP_PROTECT_DOS_RESOURCE, APP_PROTECT_POLICY, APP_PROTECT_SECURITY_LOG, JWT_KEY,
        MERGEABLE_INGRESS_TYPE,
    },
    field::{FieldError, FieldErrors, Path},
    ingress::{mergeable, Mergeable},
};
use nginx_ingress_controller_k8s_api::{
    GlobalConfiguration, Ingress, TransportServer, VirtualServer, VirtualServerRoute,
    INGRESS_CLASS_ANNOTATION,
};
use std::collections::BTreeSet;

/// Optional controller capabilities that change what resources are accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Features {
    pub is_plus: bool,
    pub snippets_enabled: bool,
    pub app_protect_enabled: bool,
    pub app_protect_dos_enabled: bool,
    pub internal_routes_enabled: bool,
    pub tls_passthrough_enabled: bool,

    /// Ports the proxy already binds, which GlobalConfiguration listeners may not use.
    pub forbidden_listener_ports: BTreeSet<i32>,
}

/// Validates resources of each kind the configuration admits.
pub trait Validate: Send + Sync {
    fn ingress(&self, ingress: &Ingress) -> Result<(), FieldErrors>;

    fn virtual_server(&self, vs: &VirtualServer) -> Result<(), FieldErrors>;

    fn virtual_server_route(&self, vsr: &VirtualServerRoute) -> Result<(), FieldErrors>;

    /// Validates a VirtualServerRoute in the context of the VirtualServer route referencing it.
    fn virtual_server_route_for_virtual_server(
        &self,
        vsr: &VirtualServerRoute,
        host: &str,
        path: &str,
    ) -> Result<(), FieldErrors>;

    fn transport_server(&self, ts: &TransportServer) -> Result<(), FieldErrors>;

    fn global_configuration(&self, gc: &GlobalConfiguration) -> Result<(), FieldErrors>;
}

/// Decides whether a resource targets this controller.
pub trait ClassSelector: Send + Sync {
    fn selects_ingress(&self, ingress: &Ingress) -> bool;

    /// Checks the `ingressClassName` of a custom resource.
    fn selects_class_name(&self, class_name: &str) -> bool;
}

/// Selects resources by ingress class.
///
/// An Ingress must name the class exactly, through the legacy annotation or, when the annotation
/// is unset, through `spec.ingressClassName`. Custom resources may leave the class empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressClass(pub String);

/// The built-in validator.
#[derive(Clone, Debug, Default)]
pub struct Validator {
    features: Features,
}

// === impl IngressClass ===

impl ClassSelector for IngressClass {
    fn selects_ingress(&self, ingress: &Ingress) -> bool {
        let annotation = ingress
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(INGRESS_CLASS_ANNOTATION))
            .map(String::as_str)
            .unwrap_or_default();
        if !annotation.is_empty() {
            return annotation == self.0;
        }

        let class_name = ingress
            .spec
            .as_ref()
            .and_then(|s| s.ingress_class_name.as_deref())
            .unwrap_or_default();
        class_name == self.0
    }

    fn selects_class_name(&self, class_name: &str) -> bool {
        class_name.is_empty() || class_name == self.0
    }
}

// === impl Validator ===

impl Validator {
    pub fn new(features: Features) -> Self {
        Self { features }
    }
}

impl Validate for Validator {
    fn ingress(&self, ingress: &Ingress) -> Result<(), FieldErrors> {
        ingress::validate(ingress, &self.features).into_result()
    }

    fn virtual_server(&self, vs: &VirtualServer) -> Result<(), FieldErrors> {
        virtual_server::validate_virtual_server(vs, &self.features).into_result()
    }

    fn virtual_server_route(&self, vsr: &VirtualServerRoute) -> Result<(), FieldErrors> {
        virtual_server::validate_virtual_server_route(vsr, &self.features).into_result()
    }

    fn virtual_server_route_for_virtual_server(
        &self,
        vsr: &VirtualServerRoute,
        host: &str,
        path: &str,
    ) -> Result<(), FieldErrors> {
        let mut errors = virtual_server::validate_virtual_server_route(vsr, &self.features);
        errors.extend(virtual_server::validate_for_virtual_server(vsr, host, path));
        errors.into_result()
    }

    fn transport_server(&self, ts: &TransportServer) -> Result<(), FieldErrors> {
        transport_server::validate(ts, &self.features).into_result()
    }

    fn global_configuration(&self, gc: &GlobalConfiguration) -> Result<(), FieldErrors> {
        global_configuration::validate(gc, &self.features).into_result()
    }
}
