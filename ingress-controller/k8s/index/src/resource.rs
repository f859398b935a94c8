//! The resources the configuration hands to the renderer.
//!
//! A [`Resource`] is rebuilt from the admitted objects on every mutation of the configuration and
//! never changes after it is published. Warnings are accumulated on a builder while a rebuild is in
//! progress and frozen when the rebuild completes.

use nginx_ingress_controller_core::{self as core, object_key, KeyWithKind};
use nginx_ingress_controller_k8s_api::{
    Ingress, ObjectMeta, TransportServer, VirtualServer, VirtualServerRoute,
};
use std::{collections::BTreeMap, sync::Arc};

/// A change to apply to the rendered configuration.
pub type ResourceChange = core::Change<Resource>;

#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Ingress(Arc<IngressConfiguration>),
    VirtualServer(Arc<VirtualServerConfiguration>),
    TransportServer(Arc<TransportServerConfiguration>),
}

/// Selects the kinds of resources to return.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResourceFilter {
    pub ingresses: bool,
    pub virtual_servers: bool,
    pub transport_servers: bool,
}

/// A regular or master Ingress.
#[derive(Clone, Debug, PartialEq)]
pub struct IngressConfiguration {
    pub ingress: Arc<Ingress>,
    pub is_master: bool,

    /// The minions merged into a master, in `namespace/name` order.
    pub minions: Vec<MinionConfiguration>,

    /// Whether this Ingress holds each of its hosts.
    pub valid_hosts: BTreeMap<String, bool>,
    pub warnings: Vec<String>,

    /// Warnings of the minions, keyed by the minion's `namespace/name`.
    pub child_warnings: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MinionConfiguration {
    pub ingress: Arc<Ingress>,

    /// Whether this minion holds each of its paths.
    pub valid_paths: BTreeMap<String, bool>,
}

/// A VirtualServer and the VirtualServerRoutes it was able to resolve.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualServerConfiguration {
    pub virtual_server: Arc<VirtualServer>,
    pub virtual_server_routes: Vec<Arc<VirtualServerRoute>>,
    pub warnings: Vec<String>,
}

/// A TransportServer bound to a listener or, for TLS passthrough, to a host.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportServerConfiguration {
    pub transport_server: Arc<TransportServer>,

    /// The port of the GlobalConfiguration listener, or 0 when the listener is not declared.
    pub listener_port: i32,
    pub warnings: Vec<String>,
}

/// A resource under construction during a rebuild.
#[derive(Clone, Debug)]
pub(crate) enum Draft {
    Ingress(IngressConfiguration),
    VirtualServer(VirtualServerConfiguration),
    TransportServer(TransportServerConfiguration),
}

fn meta_key_with_kind(kind: &str, meta: &ObjectMeta) -> String {
    format!("{kind}/{}", object_key(meta))
}

fn same_generation(a: &ObjectMeta, b: &ObjectMeta) -> bool {
    a.namespace == b.namespace && a.name == b.name && a.generation == b.generation
}

fn same_generation_and_annotations(a: &ObjectMeta, b: &ObjectMeta) -> bool {
    same_generation(a, b) && a.annotations == b.annotations
}

// === impl Resource ===

impl Resource {
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Ingress(r) => &r.ingress.metadata,
            Self::VirtualServer(r) => &r.virtual_server.metadata,
            Self::TransportServer(r) => &r.transport_server.metadata,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ingress(_) => "Ingress",
            Self::VirtualServer(_) => "VirtualServer",
            Self::TransportServer(_) => "TransportServer",
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Ingress(r) => &r.warnings,
            Self::VirtualServer(r) => &r.warnings,
            Self::TransportServer(r) => &r.warnings,
        }
    }

    /// Returns true when this resource wins a contested host or listener over `other`.
    pub fn wins(&self, other: &Self) -> bool {
        core::wins(self.meta(), other.meta())
    }

    /// Compares the parts of two resources that affect the rendered configuration.
    ///
    /// Resources of different kinds are never equal. Metadata-only churn, such as a new resource
    /// version without a new generation, does not make two resources different.
    pub fn is_equal(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ingress(a), Self::Ingress(b)) => {
                same_generation_and_annotations(&a.ingress.metadata, &b.ingress.metadata)
                    && a.valid_hosts == b.valid_hosts
                    && a.is_master == b.is_master
                    && a.minions.len() == b.minions.len()
                    && a.minions.iter().zip(&b.minions).all(|(a, b)| {
                        same_generation_and_annotations(&a.ingress.metadata, &b.ingress.metadata)
                    })
            }
            (Self::VirtualServer(a), Self::VirtualServer(b)) => {
                same_generation(&a.virtual_server.metadata, &b.virtual_server.metadata)
                    && a.virtual_server_routes.len() == b.virtual_server_routes.len()
                    && a.virtual_server_routes
                        .iter()
                        .zip(&b.virtual_server_routes)
                        .all(|(a, b)| same_generation(&a.metadata, &b.metadata))
            }
            (Self::TransportServer(a), Self::TransportServer(b)) => a.is_equal(b),
            _ => false,
        }
    }
}

impl KeyWithKind for Resource {
    fn key_with_kind(&self) -> String {
        meta_key_with_kind(self.kind(), self.meta())
    }
}

// === impl ResourceFilter ===

impl ResourceFilter {
    pub const ALL: Self = Self {
        ingresses: true,
        virtual_servers: true,
        transport_servers: true,
    };

    pub(crate) fn accepts(&self, resource: &Resource) -> bool {
        match resource {
            Resource::Ingress(_) => self.ingresses,
            Resource::VirtualServer(_) => self.virtual_servers,
            Resource::TransportServer(_) => self.transport_servers,
        }
    }
}

impl Default for ResourceFilter {
    fn default() -> Self {
        Self::ALL
    }
}

// === impl IngressConfiguration ===

impl IngressConfiguration {
    pub(crate) fn regular(ingress: Arc<Ingress>) -> Self {
        Self {
            ingress,
            is_master: false,
            minions: Vec::new(),
            valid_hosts: BTreeMap::new(),
            warnings: Vec::new(),
            child_warnings: BTreeMap::new(),
        }
    }

    pub(crate) fn master(
        ingress: Arc<Ingress>,
        minions: Vec<MinionConfiguration>,
        child_warnings: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            is_master: true,
            minions,
            child_warnings,
            ..Self::regular(ingress)
        }
    }

    /// The hosts of the Ingress rules, in declaration order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.ingress
            .spec
            .iter()
            .flat_map(|spec| spec.rules.iter().flatten())
            .map(|rule| rule.host.as_deref().unwrap_or_default())
    }
}

// === impl MinionConfiguration ===

impl MinionConfiguration {
    pub(crate) fn new(ingress: Arc<Ingress>) -> Self {
        Self {
            ingress,
            valid_paths: BTreeMap::new(),
        }
    }
}

// === impl TransportServerConfiguration ===

impl TransportServerConfiguration {
    pub(crate) fn new(transport_server: Arc<TransportServer>) -> Self {
        Self {
            transport_server,
            listener_port: 0,
            warnings: Vec::new(),
        }
    }

    pub fn key_with_kind(&self) -> String {
        meta_key_with_kind("TransportServer", &self.transport_server.metadata)
    }

    pub(crate) fn wins(&self, other: &Self) -> bool {
        core::wins(&self.transport_server.metadata, &other.transport_server.metadata)
    }

    pub fn is_equal(&self, other: &Self) -> bool {
        same_generation(&self.transport_server.metadata, &other.transport_server.metadata)
            && self.listener_port == other.listener_port
    }
}

// === impl Draft ===

impl Draft {
    pub(crate) fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Ingress(r) => &r.ingress.metadata,
            Self::VirtualServer(r) => &r.virtual_server.metadata,
            Self::TransportServer(r) => &r.transport_server.metadata,
        }
    }

    pub(crate) fn add_warning(&mut self, warning: String) {
        match self {
            Self::Ingress(r) => r.warnings.push(warning),
            Self::VirtualServer(r) => r.warnings.push(warning),
            Self::TransportServer(r) => r.warnings.push(warning),
        }
    }

    pub(crate) fn finish(self) -> Resource {
        match self {
            Self::Ingress(r) => Resource::Ingress(Arc::new(r)),
            Self::VirtualServer(r) => Resource::VirtualServer(Arc::new(r)),
            Self::TransportServer(r) => Resource::TransportServer(Arc::new(r)),
        }
    }
}
