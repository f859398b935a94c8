use crate::{
    index::{metrics, Configuration, ConfigurationOptions, Controller, IndexMetrics, Validators},
    k8s::{self, Client, Resource},
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::collections::BTreeSet;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "nginx-ingress", about = "An NGINX ingress resource controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "nginx=info,warn",
        env = "NGINX_INGRESS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The class of the Ingresses, VirtualServers and TransportServers handled by this controller.
    #[clap(long, default_value = "nginx")]
    ingress_class: String,

    /// The `namespace/name` of the GlobalConfiguration that declares the listeners.
    #[clap(long)]
    global_configuration: Option<GlobalConfigurationRef>,

    /// Watches VirtualServers, VirtualServerRoutes, TransportServers, Policies and the
    /// GlobalConfiguration.
    #[clap(long, default_value = "true", action = clap::ArgAction::Set)]
    enable_custom_resources: bool,

    #[clap(long)]
    enable_tls_passthrough: bool,

    #[clap(long)]
    enable_snippets: bool,

    #[clap(long)]
    nginx_plus: bool,

    #[clap(long)]
    enable_app_protect: bool,

    #[clap(long)]
    enable_app_protect_dos: bool,

    #[clap(long)]
    enable_internal_routes: bool,

    /// Ports that GlobalConfiguration listeners may not use.
    #[clap(long, default_value = "80,443")]
    forbidden_listener_ports: Ports,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            ingress_class,
            global_configuration,
            enable_custom_resources,
            enable_tls_passthrough,
            enable_snippets,
            nginx_plus,
            enable_app_protect,
            enable_app_protect_dos,
            enable_internal_routes,
            forbidden_listener_ports: Ports(forbidden_listener_ports),
        } = self;

        if enable_app_protect_dos && !nginx_plus {
            bail!("App Protect DoS requires NGINX Plus");
        }
        if global_configuration.is_some() && !enable_custom_resources {
            bail!("A GlobalConfiguration requires custom resources to be enabled");
        }

        let options = ConfigurationOptions {
            ingress_class,
            is_tls_passthrough_enabled: enable_tls_passthrough,
            snippets_enabled: enable_snippets,
            is_plus: nginx_plus,
            app_protect_enabled: enable_app_protect,
            app_protect_dos_enabled: enable_app_protect_dos,
            internal_routes_enabled: enable_internal_routes,
            forbidden_listener_ports,
        };
        let watch_global_configuration = global_configuration.is_some();
        let validators = Validators::new(&options);
        let configuration = Configuration::shared(options, validators);
        let controller = Controller::shared(
            configuration.clone(),
            global_configuration.map(|GlobalConfigurationRef(key)| key),
        );

        let mut prom = <Registry>::default();
        metrics::register_transport_servers(&mut prom, configuration);
        let index_metrics =
            IndexMetrics::register(controller, prom.sub_registry_with_prefix("index"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;
        info!(
            %enable_custom_resources,
            %enable_app_protect,
            %enable_app_protect_dos,
            "Watching resources"
        );

        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone().shared(), ingresses)
                .instrument(info_span!("ingresses")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone().shared(), services)
                .instrument(info_span!("services")),
        );

        let endpoints = runtime.watch_all::<k8s::Endpoints>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone().shared(), endpoints)
                .instrument(info_span!("endpoints")),
        );

        let secrets = runtime.watch_all::<k8s::Secret>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone().shared(), secrets)
                .instrument(info_span!("secrets")),
        );

        if enable_custom_resources {
            let virtual_servers =
                runtime.watch_all::<k8s::VirtualServer>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index_metrics.clone().shared(), virtual_servers)
                    .instrument(info_span!("virtualservers.k8s.nginx.org")),
            );

            let virtual_server_routes =
                runtime.watch_all::<k8s::VirtualServerRoute>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index_metrics.clone().shared(), virtual_server_routes)
                    .instrument(info_span!("virtualserverroutes.k8s.nginx.org")),
            );

            let transport_servers =
                runtime.watch_all::<k8s::TransportServer>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index_metrics.clone().shared(), transport_servers)
                    .instrument(info_span!("transportservers.k8s.nginx.org")),
            );

            let policies = runtime.watch_all::<k8s::Policy>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index_metrics.clone().shared(), policies)
                    .instrument(info_span!("policies.k8s.nginx.org")),
            );

            if watch_global_configuration {
                let global_configurations =
                    runtime.watch_all::<k8s::GlobalConfiguration>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(
                        index_metrics.clone().shared(),
                        global_configurations,
                    )
                    .instrument(info_span!("globalconfigurations.k8s.nginx.org")),
                );
            }
        }

        if enable_app_protect {
            if api_resource_exists::<k8s::APPolicy>(&runtime.client()).await {
                let policies = runtime.watch_all::<k8s::APPolicy>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(index_metrics.clone().shared(), policies)
                        .instrument(info_span!("appolicies.appprotect.f5.com")),
                );

                let log_confs = runtime.watch_all::<k8s::APLogConf>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(index_metrics.clone().shared(), log_confs)
                        .instrument(info_span!("aplogconfs.appprotect.f5.com")),
                );

                let user_sigs = runtime.watch_all::<k8s::APUserSig>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(index_metrics.clone().shared(), user_sigs)
                        .instrument(info_span!("apusersigs.appprotect.f5.com")),
                );
            } else {
                tracing::warn!(
                    "appolicies.appprotect.f5.com resource kind not found, skipping watches"
                );
            }
        }

        if enable_app_protect_dos {
            if api_resource_exists::<k8s::APDosPolicy>(&runtime.client()).await {
                let policies = runtime.watch_all::<k8s::APDosPolicy>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(index_metrics.clone().shared(), policies)
                        .instrument(info_span!("apdospolicy.appprotectdos.f5.com")),
                );

                let log_confs =
                    runtime.watch_all::<k8s::APDosLogConf>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(index_metrics.clone().shared(), log_confs)
                        .instrument(info_span!("apdoslogconfs.appprotectdos.f5.com")),
                );

                let protected =
                    runtime.watch_all::<k8s::DosProtectedResource>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(index_metrics.shared(), protected)
                        .instrument(info_span!("dosprotectedresources.appprotectdos.f5.com")),
                );
            } else {
                tracing::warn!(
                    "apdospolicy.appprotectdos.f5.com resource kind not found, skipping watches"
                );
            }
        }

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// A `namespace/name` reference to a GlobalConfiguration.
#[derive(Clone, Debug)]
struct GlobalConfigurationRef(String);

impl std::str::FromStr for GlobalConfigurationRef {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self(s.to_string()))
            }
            _ => bail!("invalid GlobalConfiguration {s:?}: expected namespace/name"),
        }
    }
}

#[derive(Clone, Debug)]
struct Ports(BTreeSet<i32>);

impl std::str::FromStr for Ports {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.parse().map_err(Into::into))
            .collect::<Result<BTreeSet<i32>>>()
            .map(Self)
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
