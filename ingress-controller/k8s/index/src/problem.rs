use nginx_ingress_controller_core::{ns_name, object_key};
use nginx_ingress_controller_k8s_api::{
    APDosLogConf, APDosPolicy, APLogConf, APPolicy, APUserSig, DosProtectedResource, Ingress,
    ObjectMeta, TransportServer, VirtualServer, VirtualServerRoute,
};
use std::sync::Arc;

/// A condition worth reporting to the owner of an object: a rejection, a lost host or an
/// unresolved reference.
#[derive(Clone, Debug, PartialEq)]
pub struct Problem {
    pub object: Object,
    pub is_error: bool,
    pub reason: String,
    pub message: String,
}

/// The object a [`Problem`] is reported against.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Ingress(Arc<Ingress>),
    VirtualServer(Arc<VirtualServer>),
    VirtualServerRoute(Arc<VirtualServerRoute>),
    TransportServer(Arc<TransportServer>),
    APPolicy(Arc<APPolicy>),
    APLogConf(Arc<APLogConf>),
    APUserSig(Arc<APUserSig>),
    APDosPolicy(Arc<APDosPolicy>),
    APDosLogConf(Arc<APDosLogConf>),
    DosProtectedResource(Arc<DosProtectedResource>),
}

// === impl Problem ===

impl Problem {
    pub fn error(object: Object, reason: &str, message: impl Into<String>) -> Self {
        Self {
            object,
            is_error: true,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(object: Object, reason: &str, message: impl Into<String>) -> Self {
        Self {
            object,
            is_error: false,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    /// Problems are reported again only when what the user would see changes.
    pub(crate) fn same_report(&self, other: &Self) -> bool {
        self.is_error == other.is_error
            && self.reason == other.reason
            && self.message == other.message
    }
}

// === impl Object ===

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ingress(_) => "Ingress",
            Self::VirtualServer(_) => "VirtualServer",
            Self::VirtualServerRoute(_) => "VirtualServerRoute",
            Self::TransportServer(_) => "TransportServer",
            Self::APPolicy(_) => "APPolicy",
            Self::APLogConf(_) => "APLogConf",
            Self::APUserSig(_) => "APUserSig",
            Self::APDosPolicy(_) => "APDosPolicy",
            Self::APDosLogConf(_) => "APDosLogConf",
            Self::DosProtectedResource(_) => "DosProtectedResource",
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Ingress(o) => &o.metadata,
            Self::VirtualServer(o) => &o.metadata,
            Self::VirtualServerRoute(o) => &o.metadata,
            Self::TransportServer(o) => &o.metadata,
            Self::APPolicy(o) => &o.metadata,
            Self::APLogConf(o) => &o.metadata,
            Self::APUserSig(o) => &o.metadata,
            Self::APDosPolicy(o) => &o.metadata,
            Self::APDosLogConf(o) => &o.metadata,
            Self::DosProtectedResource(o) => &o.metadata,
        }
    }

    /// The `namespace/name` key of the object.
    pub fn key(&self) -> String {
        object_key(self.meta())
    }

    /// The `kind/namespace/name` key of the object.
    pub fn key_with_kind(&self) -> String {
        ns_name(self.kind(), &self.key())
    }
}
