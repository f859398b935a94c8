#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod app_protect;
pub mod app_protect_dos;
pub mod global_configuration;
pub mod policy;
pub mod transport_server;
pub mod virtual_server;

pub use self::{
    app_protect::{APLogConf, APPolicy, APUserSig},
    app_protect_dos::{APDosLogConf, APDosPolicy, DosProtectedResource},
    global_configuration::GlobalConfiguration,
    policy::Policy,
    transport_server::TransportServer,
    virtual_server::{VirtualServer, VirtualServerRoute},
};
pub use k8s_openapi::{
    api::{
        core::v1::{Endpoints, Secret, Service},
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, IngressTLS,
        },
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
pub use kube::{
    api::{ObjectMeta, Resource, ResourceExt},
    Client,
};

/// The legacy annotation selecting the controller class of an Ingress. It takes precedence over
/// `spec.ingressClassName`.
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
