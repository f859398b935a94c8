//! The configuration: the admitted Ingresses, VirtualServers, VirtualServerRoutes,
//! TransportServers and GlobalConfiguration, and the resources derived from them.
//!
//! Every mutation updates the admitted objects and then recomputes the derived state from scratch:
//!
//! - `hosts` maps each hostname to the single resource serving it (an Ingress, a VirtualServer or,
//!   with TLS passthrough, a TransportServer);
//! - `listeners` maps each GlobalConfiguration listener to the single TransportServer bound to it.
//!
//! The difference between the previous and the new derived state is returned as a list of
//! [`ResourceChange`]s for the renderer, with every delete ordered before every update, and a list
//! of [`Problem`]s that are new or changed since the last rebuild.

use crate::{
    problem::{Object, Problem},
    reference::{
        find_policies_for_secret, AppProtectReferenceChecker, DosProtectedReferenceChecker,
        PolicyReferenceChecker, ReferenceChecker, SecretReferenceChecker,
        ServiceReferenceChecker,
    },
    resource::{
        Draft, IngressConfiguration, MinionConfiguration, Resource, ResourceChange,
        ResourceFilter, TransportServerConfiguration, VirtualServerConfiguration,
    },
    validation::{
        self, ClassSelector, Features, FieldErrors, IngressClass, Mergeable, Validate, Validator,
        APP_PROTECT_POLICY, APP_PROTECT_SECURITY_LOG,
    },
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use nginx_ingress_controller_core::{
    self as core, object_key, qualify, squash, Change, KeyWithKind, Op,
};
use nginx_ingress_controller_k8s_api::{
    transport_server::TLS_PASSTHROUGH_LISTENER_PROTOCOL, GlobalConfiguration, Ingress, IngressRule,
    Policy, TransportServer, VirtualServer, VirtualServerRoute,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

#[cfg(test)]
mod tests;

pub type SharedConfiguration = Arc<RwLock<Configuration>>;

/// Fixed settings of a configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigurationOptions {
    pub ingress_class: String,
    pub is_tls_passthrough_enabled: bool,
    pub snippets_enabled: bool,
    pub is_plus: bool,
    pub app_protect_enabled: bool,
    pub app_protect_dos_enabled: bool,
    pub internal_routes_enabled: bool,
    pub forbidden_listener_ports: BTreeSet<i32>,
}

/// Decides which objects are admitted.
pub struct Validators {
    pub class: Box<dyn ClassSelector>,
    pub resources: Box<dyn Validate>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportServerMetrics {
    pub total_tls_passthrough: usize,
    pub total_tcp: usize,
    pub total_udp: usize,
}

pub struct Configuration {
    options: ConfigurationOptions,
    validators: Validators,

    ingresses: BTreeMap<String, Arc<Ingress>>,
    virtual_servers: BTreeMap<String, Arc<VirtualServer>>,
    virtual_server_routes: BTreeMap<String, Arc<VirtualServerRoute>>,
    transport_servers: BTreeMap<String, Arc<TransportServer>>,
    policies: BTreeMap<String, Arc<Policy>>,
    global_configuration: Option<Arc<GlobalConfiguration>>,

    hosts: BTreeMap<String, Resource>,
    listeners: BTreeMap<String, Arc<TransportServerConfiguration>>,

    host_problems: BTreeMap<String, Problem>,
    listener_problems: BTreeMap<String, Problem>,
}

type Rebuild = (Vec<ResourceChange>, Vec<Problem>);

// === impl ConfigurationOptions ===

impl ConfigurationOptions {
    pub fn features(&self) -> Features {
        Features {
            is_plus: self.is_plus,
            snippets_enabled: self.snippets_enabled,
            app_protect_enabled: self.app_protect_enabled,
            app_protect_dos_enabled: self.app_protect_dos_enabled,
            internal_routes_enabled: self.internal_routes_enabled,
            tls_passthrough_enabled: self.is_tls_passthrough_enabled,
            forbidden_listener_ports: self.forbidden_listener_ports.clone(),
        }
    }
}

// === impl Validators ===

impl Validators {
    /// The ingress class selector and the built-in validator for the given options.
    pub fn new(options: &ConfigurationOptions) -> Self {
        Self {
            class: Box::new(IngressClass(options.ingress_class.clone())),
            resources: Box::new(Validator::new(options.features())),
        }
    }
}

// === impl Configuration ===

impl Configuration {
    pub fn new(options: ConfigurationOptions, validators: Validators) -> Self {
        Self {
            options,
            validators,
            ingresses: BTreeMap::new(),
            virtual_servers: BTreeMap::new(),
            virtual_server_routes: BTreeMap::new(),
            transport_servers: BTreeMap::new(),
            policies: BTreeMap::new(),
            global_configuration: None,
            hosts: BTreeMap::new(),
            listeners: BTreeMap::new(),
            host_problems: BTreeMap::new(),
            listener_problems: BTreeMap::new(),
        }
    }

    pub fn shared(options: ConfigurationOptions, validators: Validators) -> SharedConfiguration {
        Arc::new(RwLock::new(Self::new(options, validators)))
    }

    pub fn options(&self) -> &ConfigurationOptions {
        &self.options
    }

    pub fn add_or_update_ingress(&mut self, ingress: Ingress) -> Rebuild {
        let key = object_key(&ingress.metadata);
        let ingress = Arc::new(ingress);

        let mut validation_error = None;
        if !self.validators.class.selects_ingress(&ingress) {
            self.ingresses.remove(&key);
        } else if let Err(error) = self.validators.resources.ingress(&ingress) {
            self.ingresses.remove(&key);
            validation_error = Some(error);
        } else {
            self.ingresses.insert(key, ingress.clone());
        }

        let (mut changes, mut problems) = self.rebuild_hosts();

        if let Some(error) = validation_error {
            let error = error.to_string();
            reject(
                &mut changes,
                &mut problems,
                Object::Ingress(ingress),
                error.clone(),
                error,
            );
        }

        (changes, problems)
    }

    pub fn delete_ingress(&mut self, key: &str) -> Rebuild {
        if self.ingresses.remove(key).is_none() {
            return Default::default();
        }
        self.rebuild_hosts()
    }

    pub fn add_or_update_virtual_server(&mut self, vs: VirtualServer) -> Rebuild {
        let key = object_key(&vs.metadata);
        let vs = Arc::new(vs);

        let mut validation_error = None;
        if !self
            .validators
            .class
            .selects_class_name(&vs.spec.ingress_class_name)
        {
            self.virtual_servers.remove(&key);
        } else if let Err(error) = self.validators.resources.virtual_server(&vs) {
            self.virtual_servers.remove(&key);
            validation_error = Some(error);
        } else {
            self.virtual_servers.insert(key.clone(), vs.clone());
        }

        let (mut changes, mut problems) = self.rebuild_hosts();

        if let Some(error) = validation_error {
            let message = format!("VirtualServer {key} was rejected with error: {error}");
            reject(
                &mut changes,
                &mut problems,
                Object::VirtualServer(vs),
                error.to_string(),
                message,
            );
        }

        (changes, problems)
    }

    pub fn delete_virtual_server(&mut self, key: &str) -> Rebuild {
        if self.virtual_servers.remove(key).is_none() {
            return Default::default();
        }
        self.rebuild_hosts()
    }

    /// VirtualServerRoutes are never rendered on their own, so a rejection is always reported as a
    /// problem rather than attached to a change.
    pub fn add_or_update_virtual_server_route(&mut self, vsr: VirtualServerRoute) -> Rebuild {
        let key = object_key(&vsr.metadata);
        let vsr = Arc::new(vsr);

        let mut validation_error = None;
        if !self
            .validators
            .class
            .selects_class_name(&vsr.spec.ingress_class_name)
        {
            self.virtual_server_routes.remove(&key);
        } else if let Err(error) = self.validators.resources.virtual_server_route(&vsr) {
            self.virtual_server_routes.remove(&key);
            validation_error = Some(error);
        } else {
            self.virtual_server_routes.insert(key.clone(), vsr.clone());
        }

        let (changes, mut problems) = self.rebuild_hosts();

        if let Some(error) = validation_error {
            problems.push(Problem::error(
                Object::VirtualServerRoute(vsr),
                "Rejected",
                format!("VirtualServerRoute {key} was rejected with error: {error}"),
            ));
        }

        (changes, problems)
    }

    pub fn delete_virtual_server_route(&mut self, key: &str) -> Rebuild {
        if self.virtual_server_routes.remove(key).is_none() {
            return Default::default();
        }
        self.rebuild_hosts()
    }

    pub fn add_or_update_transport_server(&mut self, ts: TransportServer) -> Rebuild {
        let key = object_key(&ts.metadata);
        let ts = Arc::new(ts);

        let mut validation_error = None;
        if !self
            .validators
            .class
            .selects_class_name(&ts.spec.ingress_class_name)
        {
            self.transport_servers.remove(&key);
        } else if let Err(error) = self.validators.resources.transport_server(&ts) {
            self.transport_servers.remove(&key);
            validation_error = Some(error);
        } else {
            self.transport_servers.insert(key.clone(), ts.clone());
        }

        let (mut changes, mut problems) = self.rebuild_transport_servers();

        if let Some(error) = validation_error {
            let message = format!("TransportServer {key} was rejected with error: {error}");
            reject(
                &mut changes,
                &mut problems,
                Object::TransportServer(ts),
                error.to_string(),
                message,
            );
        }

        (changes, problems)
    }

    pub fn delete_transport_server(&mut self, key: &str) -> Rebuild {
        if self.transport_servers.remove(key).is_none() {
            return Default::default();
        }
        self.rebuild_transport_servers()
    }

    /// Replaces the GlobalConfiguration. An invalid GlobalConfiguration is dropped, leaving no
    /// listeners declared, and its validation error is returned.
    pub fn add_or_update_global_configuration(
        &mut self,
        gc: GlobalConfiguration,
    ) -> (Vec<ResourceChange>, Vec<Problem>, Option<FieldErrors>) {
        let validation_error = match self.validators.resources.global_configuration(&gc) {
            Ok(()) => {
                self.global_configuration = Some(Arc::new(gc));
                None
            }
            Err(error) => {
                self.global_configuration = None;
                Some(error)
            }
        };

        let (changes, problems) = self.rebuild_listeners();
        (changes, problems, validation_error)
    }

    pub fn delete_global_configuration(&mut self) -> Rebuild {
        self.global_configuration = None;
        self.rebuild_listeners()
    }

    pub fn get_global_configuration(&self) -> Option<Arc<GlobalConfiguration>> {
        self.global_configuration.clone()
    }

    /// Stores a Policy of this controller's class so that it can be found by Secret.
    pub fn add_or_update_policy(&mut self, policy: Policy) {
        let key = object_key(&policy.metadata);
        if self
            .validators
            .class
            .selects_class_name(&policy.spec.ingress_class_name)
        {
            self.policies.insert(key, Arc::new(policy));
        } else {
            self.policies.remove(&key);
        }
    }

    pub fn delete_policy(&mut self, key: &str) {
        self.policies.remove(key);
    }

    /// Every resource currently holding a host or a listener, sorted by kind, namespace and name.
    pub fn get_resources(&self) -> Vec<Resource> {
        self.get_resources_with_filter(ResourceFilter::ALL)
    }

    pub fn get_resources_with_filter(&self, filter: ResourceFilter) -> Vec<Resource> {
        let mut resources = BTreeMap::new();

        for r in self.hosts.values().filter(|r| filter.accepts(r)) {
            resources.insert(r.key_with_kind(), r.clone());
        }

        if filter.transport_servers {
            for tsc in self.listeners.values() {
                let r = Resource::TransportServer(tsc.clone());
                resources.insert(r.key_with_kind(), r);
            }
        }

        resources.into_values().collect()
    }

    pub fn find_resources_for_service(&self, namespace: &str, name: &str) -> Vec<Resource> {
        let checker = ServiceReferenceChecker {
            skip_cluster_ip_upstreams: false,
        };
        self.find_resources_for_reference(namespace, name, &checker)
    }

    /// Resources reference the Service that owns the Endpoints, which has the same namespace and
    /// name.
    pub fn find_resources_for_endpoints(&self, namespace: &str, name: &str) -> Vec<Resource> {
        let checker = ServiceReferenceChecker {
            skip_cluster_ip_upstreams: true,
        };
        self.find_resources_for_reference(namespace, name, &checker)
    }

    pub fn find_resources_for_secret(&self, namespace: &str, name: &str) -> Vec<Resource> {
        let checker = SecretReferenceChecker {
            is_plus: self.options.is_plus,
        };
        self.find_resources_for_reference(namespace, name, &checker)
    }

    pub fn find_resources_for_policy(&self, namespace: &str, name: &str) -> Vec<Resource> {
        self.find_resources_for_reference(namespace, name, &PolicyReferenceChecker)
    }

    pub fn find_resources_for_app_protect_policy_annotation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Vec<Resource> {
        let checker = AppProtectReferenceChecker {
            annotation: APP_PROTECT_POLICY,
        };
        self.find_resources_for_reference(namespace, name, &checker)
    }

    pub fn find_resources_for_app_protect_log_conf_annotation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Vec<Resource> {
        let checker = AppProtectReferenceChecker {
            annotation: APP_PROTECT_SECURITY_LOG,
        };
        self.find_resources_for_reference(namespace, name, &checker)
    }

    pub fn find_resources_for_app_protect_dos_protected(
        &self,
        namespace: &str,
        name: &str,
    ) -> Vec<Resource> {
        self.find_resources_for_reference(namespace, name, &DosProtectedReferenceChecker)
    }

    pub fn find_policies_for_secret(&self, namespace: &str, name: &str) -> Vec<Arc<Policy>> {
        find_policies_for_secret(self.policies.values(), namespace, name)
    }

    pub fn get_transport_server_metrics(&self) -> TransportServerMetrics {
        let total_tls_passthrough = if self.options.is_tls_passthrough_enabled {
            self.hosts
                .values()
                .filter(|r| matches!(r, Resource::TransportServer(_)))
                .count()
        } else {
            0
        };

        let total_tcp = self
            .listeners
            .values()
            .filter(|tsc| tsc.transport_server.spec.listener.protocol == "TCP")
            .count();

        TransportServerMetrics {
            total_tls_passthrough,
            total_tcp,
            total_udp: self.listeners.len() - total_tcp,
        }
    }

    fn find_resources_for_reference(
        &self,
        namespace: &str,
        name: &str,
        checker: &dyn ReferenceChecker,
    ) -> Vec<Resource> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        for r in self.hosts.values() {
            let referenced = match r {
                Resource::Ingress(ic) => {
                    checker.referenced_by_ingress(namespace, name, &ic.ingress)
                        || ic
                            .minions
                            .iter()
                            .any(|m| checker.referenced_by_minion(namespace, name, &m.ingress))
                }
                Resource::VirtualServer(vsc) => {
                    checker.referenced_by_virtual_server(namespace, name, &vsc.virtual_server)
                        || vsc.virtual_server_routes.iter().any(|vsr| {
                            checker.referenced_by_virtual_server_route(namespace, name, vsr)
                        })
                }
                Resource::TransportServer(tsc) => {
                    checker.referenced_by_transport_server(namespace, name, &tsc.transport_server)
                }
            };
            if referenced && seen.insert(r.key_with_kind()) {
                result.push(r.clone());
            }
        }

        for tsc in self.listeners.values() {
            if checker.referenced_by_transport_server(namespace, name, &tsc.transport_server) {
                result.push(Resource::TransportServer(tsc.clone()));
            }
        }

        result
    }

    /// TransportServers occupy listeners and, with TLS passthrough, hosts. A TransportServer that
    /// moves between a listener and a host is released by one pass and claimed by the other, so
    /// its release is dropped in favour of the claim.
    fn rebuild_transport_servers(&mut self) -> Rebuild {
        let (mut changes, mut problems) = self.rebuild_listeners();
        if self.options.is_tls_passthrough_enabled {
            let (host_changes, host_problems) = self.rebuild_hosts();
            changes.extend(host_changes);
            problems.extend(host_problems);

            let claimed = changes
                .iter()
                .filter(|c| c.op == Op::AddOrUpdate)
                .map(|c| c.resource.key_with_kind())
                .collect::<HashSet<_>>();
            changes.retain(|c| {
                c.op == Op::AddOrUpdate || !claimed.contains(&c.resource.key_with_kind())
            });
            changes = squash(changes);
        }
        (changes, problems)
    }

    // === hosts ===

    fn rebuild_hosts(&mut self) -> Rebuild {
        let (hosts, resources) = self.build_hosts_and_resources();

        let changes = diff_holders(&self.hosts, &hosts);
        self.hosts = hosts;
        let changes = with_latest_resources(squash(changes), &resources);

        let mut problems = BTreeMap::new();
        self.add_problems_for_resources_without_active_host(&resources, &mut problems);
        self.add_problems_for_orphan_minions(&mut problems);
        self.add_problems_for_orphan_or_ignored_routes(&mut problems);

        let reported = changed_problems(&problems, &self.host_problems);
        self.host_problems = problems;

        (changes, reported)
    }

    fn build_hosts_and_resources(
        &self,
    ) -> (BTreeMap<String, Resource>, HashMap<String, Resource>) {
        let mut drafts = Vec::new();
        let mut hosts = BTreeMap::new();

        for ingress in self.ingresses.values() {
            let config = match validation::mergeable(ingress) {
                Mergeable::Minion => continue,
                Mergeable::Master => {
                    let host = first_rule(ingress)
                        .and_then(|r| r.host.as_deref())
                        .unwrap_or_default();
                    let (minions, child_warnings) = self.build_minions(host);
                    IngressConfiguration::master(ingress.clone(), minions, child_warnings)
                }
                Mergeable::None => IngressConfiguration::regular(ingress.clone()),
            };

            let claimed = config.hosts().map(str::to_string).collect::<Vec<_>>();
            drafts.push(Draft::Ingress(config));
            for host in claimed {
                claim_host(&mut drafts, &mut hosts, host);
            }
        }

        for vs in self.virtual_servers.values() {
            let (routes, warnings) = self.build_virtual_server_routes(vs);
            drafts.push(Draft::VirtualServer(VirtualServerConfiguration {
                virtual_server: vs.clone(),
                virtual_server_routes: routes,
                warnings,
            }));
            claim_host(&mut drafts, &mut hosts, vs.spec.host.clone());
        }

        if self.options.is_tls_passthrough_enabled {
            for ts in self.transport_servers.values() {
                if !ts.spec.listener.is_tls_passthrough() {
                    continue;
                }
                drafts.push(Draft::TransportServer(TransportServerConfiguration::new(
                    ts.clone(),
                )));
                claim_host(&mut drafts, &mut hosts, ts.spec.host.clone());
            }
        }

        // An Ingress may declare several hosts and hold only some of them.
        for (i, draft) in drafts.iter_mut().enumerate() {
            if let Draft::Ingress(config) = draft {
                let valid_hosts = config
                    .hosts()
                    .map(|host| (host.to_string(), hosts.get(host) == Some(&i)))
                    .collect();
                config.valid_hosts = valid_hosts;
            }
        }

        let resources = drafts.into_iter().map(Draft::finish).collect::<Vec<_>>();
        let hosts = hosts
            .into_iter()
            .map(|(host, i)| (host, resources[i].clone()))
            .collect();
        let resources = resources
            .into_iter()
            .map(|r| (r.key_with_kind(), r))
            .collect();

        (hosts, resources)
    }

    /// Collects the minions of the master serving `master_host`. When minions share a path, the
    /// winner holds it and the loser records a warning.
    fn build_minions(
        &self,
        master_host: &str,
    ) -> (Vec<MinionConfiguration>, BTreeMap<String, Vec<String>>) {
        let mut minions = Vec::<MinionConfiguration>::new();
        let mut child_warnings = BTreeMap::<String, Vec<String>>::new();
        let mut paths = HashMap::<String, usize>::new();

        for ingress in self.ingresses.values() {
            if validation::mergeable(ingress) != Mergeable::Minion {
                continue;
            }
            let Some(rule) = first_rule(ingress) else {
                continue;
            };
            if rule.host.as_deref().unwrap_or_default() != master_host {
                continue;
            }

            let idx = minions.len();
            minions.push(MinionConfiguration::new(ingress.clone()));

            for p in rule.http.iter().flat_map(|http| http.paths.iter()) {
                let path = p.path.clone().unwrap_or_default();
                let Some(holder) = paths.get(&path).copied() else {
                    paths.insert(path.clone(), idx);
                    minions[idx].valid_paths.insert(path, true);
                    continue;
                };

                let warning = format!("path {path} is taken by another resource");
                if !core::wins(&minions[holder].ingress.metadata, &ingress.metadata) {
                    paths.insert(path.clone(), idx);
                    minions[idx].valid_paths.insert(path.clone(), true);
                    minions[holder].valid_paths.insert(path, false);
                    child_warnings
                        .entry(object_key(&minions[holder].ingress.metadata))
                        .or_default()
                        .push(warning);
                } else {
                    minions[idx].valid_paths.insert(path, false);
                    child_warnings
                        .entry(object_key(&ingress.metadata))
                        .or_default()
                        .push(warning);
                }
            }
        }

        (minions, child_warnings)
    }

    /// Resolves the routes a VirtualServer delegates to VirtualServerRoutes. Routes that are missing
    /// or do not fit under the VirtualServer are skipped with a warning.
    fn build_virtual_server_routes(
        &self,
        vs: &VirtualServer,
    ) -> (Vec<Arc<VirtualServerRoute>>, Vec<String>) {
        let namespace = vs.metadata.namespace.as_deref().unwrap_or_default();
        let mut routes = Vec::new();
        let mut warnings = Vec::new();

        for route in vs.spec.routes.iter().filter(|r| !r.route.is_empty()) {
            let key = qualify(namespace, &route.route);
            let Some(vsr) = self.virtual_server_routes.get(&key) else {
                warnings.push(format!("VirtualServerRoute {key} doesn't exist or invalid"));
                continue;
            };

            if let Err(error) = self.validators.resources.virtual_server_route_for_virtual_server(
                vsr,
                &vs.spec.host,
                &route.path,
            ) {
                warnings.push(format!("VirtualServerRoute {key} is invalid: {error}"));
                continue;
            }

            routes.push(vsr.clone());
        }

        (routes, warnings)
    }

    fn add_problems_for_resources_without_active_host(
        &self,
        resources: &HashMap<String, Resource>,
        problems: &mut BTreeMap<String, Problem>,
    ) {
        for (key, r) in resources {
            let problem = match r {
                Resource::Ingress(ic) => {
                    if ic.valid_hosts.values().any(|valid| *valid) {
                        continue;
                    }
                    Problem::warning(
                        Object::Ingress(ic.ingress.clone()),
                        "Rejected",
                        "All hosts are taken by other resources",
                    )
                }
                Resource::VirtualServer(vsc) => {
                    if self.holds_host(&vsc.virtual_server.spec.host, key) {
                        continue;
                    }
                    Problem::warning(
                        Object::VirtualServer(vsc.virtual_server.clone()),
                        "Rejected",
                        "Host is taken by another resource",
                    )
                }
                Resource::TransportServer(tsc) => {
                    if self.holds_host(&tsc.transport_server.spec.host, key) {
                        continue;
                    }
                    Problem::warning(
                        Object::TransportServer(tsc.transport_server.clone()),
                        "Rejected",
                        "Host is taken by another resource",
                    )
                }
            };
            problems.insert(key.clone(), problem);
        }
    }

    fn holds_host(&self, host: &str, key_with_kind: &str) -> bool {
        self.hosts
            .get(host)
            .is_some_and(|holder| holder.key_with_kind() == key_with_kind)
    }

    fn add_problems_for_orphan_minions(&self, problems: &mut BTreeMap<String, Problem>) {
        for ingress in self.ingresses.values() {
            if validation::mergeable(ingress) != Mergeable::Minion {
                continue;
            }

            let host = first_rule(ingress)
                .and_then(|r| r.host.as_deref())
                .unwrap_or_default();
            if matches!(self.hosts.get(host), Some(Resource::Ingress(ic)) if ic.is_master) {
                continue;
            }

            let object = Object::Ingress(ingress.clone());
            problems.insert(
                object.key_with_kind(),
                Problem::warning(
                    object,
                    "NoIngressMasterFound",
                    "Ingress master is invalid or doesn't exist",
                ),
            );
        }
    }

    fn add_problems_for_orphan_or_ignored_routes(&self, problems: &mut BTreeMap<String, Problem>) {
        for vsr in self.virtual_server_routes.values() {
            let object = Object::VirtualServerRoute(vsr.clone());

            let problem = match self.hosts.get(&vsr.spec.host) {
                Some(Resource::VirtualServer(vsc)) => {
                    let included = vsc.virtual_server_routes.iter().any(|r| {
                        r.metadata.namespace == vsr.metadata.namespace
                            && r.metadata.name == vsr.metadata.name
                    });
                    if included {
                        continue;
                    }
                    let message = format!(
                        "VirtualServer {} ignores VirtualServerRoute",
                        object_key(&vsc.virtual_server.metadata)
                    );
                    Problem::warning(object, "Ignored", message)
                }
                _ => Problem::warning(
                    object,
                    "NoVirtualServerFound",
                    "VirtualServer is invalid or doesn't exist",
                ),
            };

            problems.insert(problem.object.key_with_kind(), problem);
        }
    }

    // === listeners ===

    fn rebuild_listeners(&mut self) -> Rebuild {
        let (listeners, configs) = self.build_listeners_and_configurations();

        let changes = diff_holders(
            &listener_resources(&self.listeners),
            &listener_resources(&listeners),
        );
        self.listeners = listeners;

        let configs = configs
            .into_iter()
            .map(|tsc| {
                let r = Resource::TransportServer(tsc);
                (r.key_with_kind(), r)
            })
            .collect::<HashMap<_, _>>();
        let changes = with_latest_resources(squash(changes), &configs);

        let mut problems = BTreeMap::new();
        for (key, r) in &configs {
            let Resource::TransportServer(tsc) = r else {
                continue;
            };
            let listener = &tsc.transport_server.spec.listener.name;
            let message = match self.listeners.get(listener) {
                None => format!("Listener {listener} doesn't exist"),
                Some(holder) if !tsc.is_equal(holder) => {
                    format!("Listener {listener} is taken by another resource")
                }
                Some(_) => continue,
            };
            problems.insert(
                key.clone(),
                Problem::warning(
                    Object::TransportServer(tsc.transport_server.clone()),
                    "Rejected",
                    message,
                ),
            );
        }

        let reported = changed_problems(&problems, &self.listener_problems);
        self.listener_problems = problems;

        (changes, reported)
    }

    /// Binds every non-passthrough TransportServer to the GlobalConfiguration listener matching
    /// its listener name and protocol. Ports are resolved in a single pass, so swapping the ports
    /// of two listeners never binds one port twice.
    fn build_listeners_and_configurations(
        &self,
    ) -> (
        BTreeMap<String, Arc<TransportServerConfiguration>>,
        Vec<Arc<TransportServerConfiguration>>,
    ) {
        let mut drafts = Vec::<TransportServerConfiguration>::new();
        let mut listeners = BTreeMap::<String, usize>::new();

        for ts in self.transport_servers.values() {
            if ts.spec.listener.protocol == TLS_PASSTHROUGH_LISTENER_PROTOCOL {
                continue;
            }

            let idx = drafts.len();
            drafts.push(TransportServerConfiguration::new(ts.clone()));

            let Some(listener) = self.global_configuration.as_ref().and_then(|gc| {
                gc.spec.listeners.iter().find(|l| {
                    l.name == ts.spec.listener.name && l.protocol == ts.spec.listener.protocol
                })
            }) else {
                continue;
            };
            drafts[idx].listener_port = listener.port;

            let Some(holder) = listeners.get(&listener.name).copied() else {
                listeners.insert(listener.name.clone(), idx);
                continue;
            };

            let warning = format!("listener {} is taken by another resource", listener.name);
            if !drafts[holder].wins(&drafts[idx]) {
                drafts[holder].warnings.push(warning);
                listeners.insert(listener.name.clone(), idx);
            } else {
                drafts[idx].warnings.push(warning);
            }
        }

        let configs = drafts.into_iter().map(Arc::new).collect::<Vec<_>>();
        let listeners = listeners
            .into_iter()
            .map(|(name, i)| (name, configs[i].clone()))
            .collect();

        (listeners, configs)
    }
}

fn first_rule(ingress: &Ingress) -> Option<&IngressRule> {
    ingress.spec.as_ref()?.rules.as_ref()?.first()
}

/// Claims `host` for the most recently added draft, resolving a conflict with the current holder.
fn claim_host(drafts: &mut [Draft], hosts: &mut BTreeMap<String, usize>, host: String) {
    let idx = drafts.len() - 1;
    let Some(holder) = hosts.get(&host).copied() else {
        hosts.insert(host, idx);
        return;
    };

    let warning = format!("host {host} is taken by another resource");
    if !core::wins(drafts[holder].meta(), drafts[idx].meta()) {
        drafts[holder].add_warning(warning);
        hosts.insert(host, idx);
    } else {
        drafts[idx].add_warning(warning);
    }
}

fn listener_resources(
    listeners: &BTreeMap<String, Arc<TransportServerConfiguration>>,
) -> BTreeMap<String, Resource> {
    listeners
        .iter()
        .map(|(name, tsc)| (name.clone(), Resource::TransportServer(tsc.clone())))
        .collect()
}

/// Computes the changes between two generations of holders (of hosts or listeners). A holder
/// that lost its slot, or that was replaced by another resource, is deleted; a slot that gained a
/// holder, or whose holder changed, is updated. Deletes come first.
fn diff_holders(
    old: &BTreeMap<String, Resource>,
    new: &BTreeMap<String, Resource>,
) -> Vec<ResourceChange> {
    let mut deletes = old
        .iter()
        .filter(|(slot, _)| !new.contains_key(*slot))
        .map(|(_, r)| Change::delete(r.clone()))
        .collect::<Vec<_>>();
    let mut updates = Vec::new();

    for (slot, r) in new {
        let Some(prior) = old.get(slot) else {
            continue;
        };
        if prior.is_equal(r) {
            continue;
        }
        if prior.key_with_kind() != r.key_with_kind() {
            deletes.push(Change::delete(prior.clone()));
        }
        updates.push(Change::add_or_update(r.clone()));
    }

    updates.extend(
        new.iter()
            .filter(|(slot, _)| !old.contains_key(*slot))
            .map(|(_, r)| Change::add_or_update(r.clone())),
    );

    deletes.extend(updates);
    deletes
}

/// Points every change at the freshly built version of its resource so that deleted resources
/// still carry their latest warnings.
fn with_latest_resources(
    mut changes: Vec<ResourceChange>,
    resources: &HashMap<String, Resource>,
) -> Vec<ResourceChange> {
    for change in &mut changes {
        if let Some(r) = resources.get(&change.resource.key_with_kind()) {
            change.resource = r.clone();
        }
    }
    changes
}

/// Returns the problems, in key order, that were not reported the same way by the last rebuild.
fn changed_problems(
    problems: &BTreeMap<String, Problem>,
    reported: &BTreeMap<String, Problem>,
) -> Vec<Problem> {
    problems
        .iter()
        .filter(|(key, p)| !reported.get(*key).is_some_and(|prior| prior.same_report(p)))
        .map(|(_, p)| p.clone())
        .collect()
}

/// Reports a validation error: on the change removing the rejected resource when there is one,
/// or as a separate error problem otherwise.
fn reject(
    changes: &mut [ResourceChange],
    problems: &mut Vec<Problem>,
    object: Object,
    change_error: String,
    problem_message: String,
) {
    let key = object.key_with_kind();
    if let Some(change) = changes
        .iter_mut()
        .find(|c| c.resource.key_with_kind() == key)
    {
        change.error = Some(change_error);
        return;
    }
    problems.push(Problem::error(object, "Rejected", problem_message));
}
