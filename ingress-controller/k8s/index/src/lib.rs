//! NGINX Ingress Controller reconciliation engine
//!
//! The engine admits the load-balancing resources of the cluster and decides which of them are
//! rendered into the proxy configuration:
//!
//! - An `Ingress`, a `VirtualServer` or a TLS passthrough `TransportServer` claims hostnames. Each
//!   hostname is held by exactly one resource; the oldest claimant wins.
//! - A master `Ingress` lends its host to minion `Ingress`es, which claim paths under it.
//! - A `VirtualServer` delegates path prefixes to `VirtualServerRoute`s.
//! - A `TransportServer` binds a listener declared by the `GlobalConfiguration`. Each listener is
//!   held by exactly one `TransportServer`.
//!
//! ```text
//! [ Ingress (master) ] <- [ Ingress (minion) ]
//! [ VirtualServer ] -> [ VirtualServerRoute ]
//! [ GlobalConfiguration ] <- [ TransportServer ]
//! ```
//!
//! Every event rebuilds the derived hosts and listeners and returns what changed, so that the
//! renderer only touches the resources that need it, along with the problems to report on the
//! objects involved. App Protect and App Protect DoS resources are kept in their own stores.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod app_protect;
pub mod app_protect_dos;
pub mod configuration;
pub mod controller;
pub mod metrics;
pub mod problem;
pub mod reference;
pub mod resource;
pub mod validation;

pub use self::{
    app_protect::{AppProtectConfiguration, UserSigChange},
    app_protect_dos::{DosConfiguration, DosEx},
    configuration::{
        Configuration, ConfigurationOptions, SharedConfiguration, TransportServerMetrics,
        Validators,
    },
    controller::{Controller, SharedController},
    metrics::IndexMetrics,
    problem::{Object, Problem},
    resource::{Resource, ResourceChange, ResourceFilter},
};
