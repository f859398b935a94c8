//! Feeds cluster events into the configuration and the App Protect stores.
//!
//! The [`Controller`] is the index driven by `kubert`: each watched kind is applied to the store
//! that owns it and the returned changes and problems are reported. Objects that are only
//! referenced (Services, Endpoints, Secrets) report the resources that must be rendered again.

use crate::{
    app_protect::{AppProtectConfiguration, UserSigChange},
    app_protect_dos::{DosConfiguration, DosResource},
    configuration::SharedConfiguration,
    problem::Problem,
    resource::Resource,
};
use nginx_ingress_controller_core::{ns_name, object_key, Change, KeyWithKind, Op};
use nginx_ingress_controller_k8s_api::{
    APDosLogConf, APDosPolicy, APLogConf, APPolicy, APUserSig, DosProtectedResource, Endpoints,
    GlobalConfiguration, Ingress, Policy, ResourceExt, Secret, Service, TransportServer,
    VirtualServer, VirtualServerRoute,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};


pub type SharedController = Arc<RwLock<Controller>>;

pub struct Controller {
    configuration: SharedConfiguration,
    app_protect: AppProtectConfiguration,
    dos: DosConfiguration,

    /// The `namespace/name` of the only GlobalConfiguration that is admitted.
    global_configuration: Option<String>,
}

// === impl Controller ===

impl Controller {
    pub fn new(configuration: SharedConfiguration, global_configuration: Option<String>) -> Self {
        let dos_enabled = configuration.read().options().app_protect_dos_enabled;
        Self {
            configuration,
            app_protect: AppProtectConfiguration::default(),
            dos: DosConfiguration::new(dos_enabled),
            global_configuration,
        }
    }

    pub fn shared(
        configuration: SharedConfiguration,
        global_configuration: Option<String>,
    ) -> SharedController {
        Arc::new(RwLock::new(Self::new(configuration, global_configuration)))
    }

    pub fn configuration(&self) -> &SharedConfiguration {
        &self.configuration
    }

    pub fn app_protect(&self) -> &AppProtectConfiguration {
        &self.app_protect
    }

    pub fn dos(&self) -> &DosConfiguration {
        &self.dos
    }

    fn accepts_global_configuration(&self, key: &str) -> bool {
        self.global_configuration.as_deref() == Some(key)
    }

    fn service_changed(&self, namespace: &str, name: &str) {
        let affected = self
            .configuration
            .read()
            .find_resources_for_service(namespace, name);
        report_affected("Service", namespace, name, &affected);
    }

    fn endpoints_changed(&self, namespace: &str, name: &str) {
        let affected = self
            .configuration
            .read()
            .find_resources_for_endpoints(namespace, name);
        report_affected("Endpoints", namespace, name, &affected);
    }

    /// A Secret is used directly for TLS and through the policies that name it.
    fn secret_changed(&self, namespace: &str, name: &str) {
        let configuration = self.configuration.read();
        let affected = configuration.find_resources_for_secret(namespace, name);
        report_affected("Secret", namespace, name, &affected);

        for policy in configuration.find_policies_for_secret(namespace, name) {
            let policy_namespace = policy.namespace().unwrap_or_default();
            let policy_name = policy.name_any();
            let affected =
                configuration.find_resources_for_policy(&policy_namespace, &policy_name);
            report_affected("Policy", &policy_namespace, &policy_name, &affected);
        }
    }

    fn report_user_sigs(&self, (change, problems): (UserSigChange, Vec<Problem>)) {
        let configuration = self.configuration.read();
        for (op, policies) in [
            (Op::Delete, &change.policy_deletions),
            (Op::AddOrUpdate, &change.policy_adds_or_updates),
        ] {
            for policy in policies {
                let namespace = policy.namespace().unwrap_or_default();
                let name = policy.name_any();
                info!(?op, policy = %ns_name(&namespace, &name), "App Protect policy changed");
                let affected = configuration
                    .find_resources_for_app_protect_policy_annotation(&namespace, &name);
                report_affected("APPolicy", &namespace, &name, &affected);
            }
        }
        debug!(user_sigs = change.user_sigs.len(), "Valid user signatures");
        report_problems(&problems);
    }

    fn report_dos(&self, (changes, problems): (Vec<Change<DosResource>>, Vec<Problem>)) {
        report_changes(&changes);
        report_problems(&problems);

        let configuration = self.configuration.read();
        for change in &changes {
            if let DosResource::Protected(protected) = &change.resource {
                let namespace = protected.namespace().unwrap_or_default();
                let name = protected.name_any();
                let affected =
                    configuration.find_resources_for_app_protect_dos_protected(&namespace, &name);
                report_affected("DosProtectedResource", &namespace, &name, &affected);
            }
        }
    }
}

impl kubert::index::IndexNamespacedResource<Ingress> for Controller {
    fn apply(&mut self, ingress: Ingress) {
        report(self.configuration.write().add_or_update_ingress(ingress));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let key = ns_name(&namespace, &name);
        report(self.configuration.write().delete_ingress(&key));
    }
}

impl kubert::index::IndexNamespacedResource<VirtualServer> for Controller {
    fn apply(&mut self, vs: VirtualServer) {
        report(self.configuration.write().add_or_update_virtual_server(vs));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let key = ns_name(&namespace, &name);
        report(self.configuration.write().delete_virtual_server(&key));
    }
}

impl kubert::index::IndexNamespacedResource<VirtualServerRoute> for Controller {
    fn apply(&mut self, vsr: VirtualServerRoute) {
        report(
            self.configuration
                .write()
                .add_or_update_virtual_server_route(vsr),
        );
    }

    fn delete(&mut self, namespace: String, name: String) {
        let key = ns_name(&namespace, &name);
        report(self.configuration.write().delete_virtual_server_route(&key));
    }
}

impl kubert::index::IndexNamespacedResource<TransportServer> for Controller {
    fn apply(&mut self, ts: TransportServer) {
        report(self.configuration.write().add_or_update_transport_server(ts));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let key = ns_name(&namespace, &name);
        report(self.configuration.write().delete_transport_server(&key));
    }
}

impl kubert::index::IndexNamespacedResource<GlobalConfiguration> for Controller {
    fn apply(&mut self, gc: GlobalConfiguration) {
        let key = object_key(&gc.metadata);
        if !self.accepts_global_configuration(&key) {
            debug!(%key, "Ignoring GlobalConfiguration");
            return;
        }

        let (changes, problems, error) = self
            .configuration
            .write()
            .add_or_update_global_configuration(gc);
        if let Some(error) = error {
            warn!(%key, %error, "GlobalConfiguration is invalid");
        }
        report((changes, problems));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let key = ns_name(&namespace, &name);
        if !self.accepts_global_configuration(&key) {
            return;
        }
        report(self.configuration.write().delete_global_configuration());
    }
}

impl kubert::index::IndexNamespacedResource<Policy> for Controller {
    fn apply(&mut self, policy: Policy) {
        let namespace = policy.namespace().unwrap_or_default();
        let name = policy.name_any();

        let mut configuration = self.configuration.write();
        configuration.add_or_update_policy(policy);
        let affected = configuration.find_resources_for_policy(&namespace, &name);
        report_affected("Policy", &namespace, &name, &affected);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let mut configuration = self.configuration.write();
        configuration.delete_policy(&ns_name(&namespace, &name));
        let affected = configuration.find_resources_for_policy(&namespace, &name);
        report_affected("Policy", &namespace, &name, &affected);
    }
}

impl kubert::index::IndexNamespacedResource<Service> for Controller {
    fn apply(&mut self, service: Service) {
        let namespace = service.namespace().unwrap_or_default();
        self.service_changed(&namespace, &service.name_any());
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.service_changed(&namespace, &name);
    }
}

impl kubert::index::IndexNamespacedResource<Endpoints> for Controller {
    fn apply(&mut self, endpoints: Endpoints) {
        let namespace = endpoints.namespace().unwrap_or_default();
        self.endpoints_changed(&namespace, &endpoints.name_any());
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.endpoints_changed(&namespace, &name);
    }
}

impl kubert::index::IndexNamespacedResource<Secret> for Controller {
    fn apply(&mut self, secret: Secret) {
        let namespace = secret.namespace().unwrap_or_default();
        self.secret_changed(&namespace, &secret.name_any());
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.secret_changed(&namespace, &name);
    }
}

impl kubert::index::IndexNamespacedResource<APPolicy> for Controller {
    fn apply(&mut self, policy: APPolicy) {
        let namespace = policy.namespace().unwrap_or_default();
        let name = policy.name_any();
        let (changes, problems) = self.app_protect.add_or_update_policy(policy);
        report_changes(&changes);
        report_problems(&problems);

        let affected = self
            .configuration
            .read()
            .find_resources_for_app_protect_policy_annotation(&namespace, &name);
        report_affected("APPolicy", &namespace, &name, &affected);
    }

    fn delete(&mut self, namespace: String, name: String) {
        report_changes(&self.app_protect.delete_policy(&ns_name(&namespace, &name)));

        let affected = self
            .configuration
            .read()
            .find_resources_for_app_protect_policy_annotation(&namespace, &name);
        report_affected("APPolicy", &namespace, &name, &affected);
    }
}

impl kubert::index::IndexNamespacedResource<APLogConf> for Controller {
    fn apply(&mut self, log_conf: APLogConf) {
        let namespace = log_conf.namespace().unwrap_or_default();
        let name = log_conf.name_any();
        let (changes, problems) = self.app_protect.add_or_update_log_conf(log_conf);
        report_changes(&changes);
        report_problems(&problems);

        let affected = self
            .configuration
            .read()
            .find_resources_for_app_protect_log_conf_annotation(&namespace, &name);
        report_affected("APLogConf", &namespace, &name, &affected);
    }

    fn delete(&mut self, namespace: String, name: String) {
        report_changes(&self.app_protect.delete_log_conf(&ns_name(&namespace, &name)));

        let affected = self
            .configuration
            .read()
            .find_resources_for_app_protect_log_conf_annotation(&namespace, &name);
        report_affected("APLogConf", &namespace, &name, &affected);
    }
}

impl kubert::index::IndexNamespacedResource<APUserSig> for Controller {
    fn apply(&mut self, sig: APUserSig) {
        let update = self.app_protect.add_or_update_user_sig(sig);
        self.report_user_sigs(update);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let update = self
            .app_protect
            .delete_user_sig(&ns_name(&namespace, &name));
        self.report_user_sigs(update);
    }
}

impl kubert::index::IndexNamespacedResource<APDosPolicy> for Controller {
    fn apply(&mut self, policy: APDosPolicy) {
        let update = self.dos.add_or_update_policy(policy);
        self.report_dos(update);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let update = self.dos.delete_policy(&ns_name(&namespace, &name));
        self.report_dos(update);
    }
}

impl kubert::index::IndexNamespacedResource<APDosLogConf> for Controller {
    fn apply(&mut self, log_conf: APDosLogConf) {
        let update = self.dos.add_or_update_log_conf(log_conf);
        self.report_dos(update);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let update = self.dos.delete_log_conf(&ns_name(&namespace, &name));
        self.report_dos(update);
    }
}

impl kubert::index::IndexNamespacedResource<DosProtectedResource> for Controller {
    fn apply(&mut self, protected: DosProtectedResource) {
        let update = self.dos.add_or_update_protected_resource(protected);
        self.report_dos(update);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let changes = self
            .dos
            .delete_protected_resource(&ns_name(&namespace, &name));
        self.report_dos((changes, Vec::new()));
    }
}

fn report((changes, problems): (Vec<Change<Resource>>, Vec<Problem>)) {
    report_changes(&changes);
    report_problems(&problems);
}

fn report_changes<R: KeyWithKind>(changes: &[Change<R>]) {
    for change in changes {
        info!(
            op = ?change.op,
            resource = %change.resource.key_with_kind(),
            error = change.error.as_deref(),
            "Configuration changed",
        );
    }
}

fn report_problems(problems: &[Problem]) {
    for problem in problems {
        warn!(
            object = %problem.object.key_with_kind(),
            reason = %problem.reason,
            is_error = problem.is_error,
            "{}",
            problem.message,
        );
    }
}

fn report_affected(kind: &str, namespace: &str, name: &str, affected: &[Resource]) {
    if affected.is_empty() {
        return;
    }
    let resources = affected
        .iter()
        .map(KeyWithKind::key_with_kind)
        .collect::<Vec<_>>();
    info!(%kind, %namespace, %name, ?resources, "Referenced object changed");
}
