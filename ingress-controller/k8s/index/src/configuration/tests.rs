use super::*;
use chrono::{TimeZone, Utc};
use k8s_openapi::api::networking::v1::ServiceBackendPort;
use maplit::{btreemap, btreeset};
use nginx_ingress_controller_core::Op;
use nginx_ingress_controller_k8s_api::{
    global_configuration::{GlobalConfigurationSpec, Listener},
    policy::{JwtAuth, PolicySpec},
    transport_server::{self as ts, TransportServerListener, TransportServerSpec},
    virtual_server::{self as vs, Route, Tls, VirtualServerRouteSpec, VirtualServerSpec},
    HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressServiceBackend, IngressSpec,
    IngressTLS, ObjectMeta, Time,
};
use pretty_assertions::assert_eq;

const CLASS: &str = "nginx";

fn mk_options() -> ConfigurationOptions {
    ConfigurationOptions {
        ingress_class: CLASS.to_string(),
        forbidden_listener_ports: btreeset![80, 443],
        ..Default::default()
    }
}

fn mk_configuration(options: ConfigurationOptions) -> Configuration {
    let validators = Validators::new(&options);
    Configuration::new(options, validators)
}

fn mk_meta(name: &str, created: i64) -> ObjectMeta {
    ObjectMeta {
        namespace: Some("default".to_string()),
        name: Some(name.to_string()),
        uid: Some(format!("uid-{name}")),
        generation: Some(1),
        creation_timestamp: Some(Time(Utc.timestamp_opt(created, 0).unwrap())),
        ..Default::default()
    }
}

fn mk_path(path: &str, service: &str) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(path.to_string()),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(80),
                    ..Default::default()
                }),
            }),
            resource: None,
        },
    }
}

fn mk_rule(host: &str, paths: Vec<HTTPIngressPath>) -> IngressRule {
    IngressRule {
        host: Some(host.to_string()),
        http: (!paths.is_empty()).then(|| HTTPIngressRuleValue { paths }),
    }
}

fn mk_ingress(name: &str, created: i64, rules: Vec<IngressRule>) -> Ingress {
    Ingress {
        metadata: mk_meta(name, created),
        spec: Some(IngressSpec {
            ingress_class_name: Some(CLASS.to_string()),
            rules: Some(rules),
            ..Default::default()
        }),
        status: None,
    }
}

fn mk_regular(name: &str, created: i64, host: &str) -> Ingress {
    mk_ingress(name, created, vec![mk_rule(host, vec![mk_path("/", "web-svc")])])
}

fn mk_mergeable(mut ingress: Ingress, kind: &str) -> Ingress {
    ingress.metadata.annotations = Some(btreemap! {
        validation::MERGEABLE_INGRESS_TYPE.to_string() => kind.to_string(),
    });
    ingress
}

fn mk_master(name: &str, created: i64, host: &str) -> Ingress {
    mk_mergeable(mk_ingress(name, created, vec![mk_rule(host, vec![])]), "master")
}

fn mk_minion(name: &str, created: i64, host: &str, path: &str) -> Ingress {
    mk_mergeable(
        mk_ingress(name, created, vec![mk_rule(host, vec![mk_path(path, "tea-svc")])]),
        "minion",
    )
}

fn mk_virtual_server(name: &str, created: i64, host: &str, routes: Vec<Route>) -> VirtualServer {
    VirtualServer {
        metadata: mk_meta(name, created),
        spec: VirtualServerSpec {
            host: host.to_string(),
            routes,
            ..Default::default()
        },
    }
}

fn mk_route_reference(path: &str, route: &str) -> Route {
    Route {
        path: path.to_string(),
        route: route.to_string(),
        ..Default::default()
    }
}

fn mk_virtual_server_route(name: &str, host: &str, path: &str) -> VirtualServerRoute {
    VirtualServerRoute {
        metadata: mk_meta(name, 10),
        spec: VirtualServerRouteSpec {
            host: host.to_string(),
            upstreams: vec![vs::Upstream {
                name: "tea".to_string(),
                service: "tea-svc".to_string(),
                port: 80,
                ..Default::default()
            }],
            subroutes: vec![Route {
                path: path.to_string(),
                action: Some(vs::Action {
                    pass: "tea".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        },
    }
}

fn mk_transport_server(
    name: &str,
    created: i64,
    listener: &str,
    protocol: &str,
    host: &str,
) -> TransportServer {
    TransportServer {
        metadata: mk_meta(name, created),
        spec: TransportServerSpec {
            listener: TransportServerListener {
                name: listener.to_string(),
                protocol: protocol.to_string(),
            },
            host: host.to_string(),
            upstreams: vec![ts::Upstream {
                name: "backend".to_string(),
                service: "backend-svc".to_string(),
                port: 5353,
                ..Default::default()
            }],
            action: Some(ts::Action {
                pass: "backend".to_string(),
            }),
            ..Default::default()
        },
    }
}

fn mk_passthrough(name: &str, created: i64, host: &str) -> TransportServer {
    mk_transport_server(
        name,
        created,
        ts::TLS_PASSTHROUGH_LISTENER_NAME,
        ts::TLS_PASSTHROUGH_LISTENER_PROTOCOL,
        host,
    )
}

fn mk_global_configuration(listeners: &[(&str, i32, &str)]) -> GlobalConfiguration {
    GlobalConfiguration {
        metadata: mk_meta("global", 0),
        spec: GlobalConfigurationSpec {
            listeners: listeners
                .iter()
                .map(|(name, port, protocol)| Listener {
                    name: name.to_string(),
                    port: *port,
                    protocol: protocol.to_string(),
                })
                .collect(),
        },
    }
}

fn ops(changes: &[ResourceChange]) -> Vec<(Op, String)> {
    changes
        .iter()
        .map(|c| (c.op, c.resource.key_with_kind()))
        .collect()
}

fn reports(problems: &[Problem]) -> Vec<(String, bool, &str, &str)> {
    problems
        .iter()
        .map(|p| {
            (
                p.object.key_with_kind(),
                p.is_error,
                p.reason.as_str(),
                p.message.as_str(),
            )
        })
        .collect()
}

fn keys(resources: &[Resource]) -> Vec<String> {
    resources.iter().map(|r| r.key_with_kind()).collect()
}

fn ingress_config(r: &Resource) -> &IngressConfiguration {
    match r {
        Resource::Ingress(ic) => ic,
        r => panic!("expected an Ingress, got {}", r.key_with_kind()),
    }
}

fn virtual_server_config(r: &Resource) -> &VirtualServerConfiguration {
    match r {
        Resource::VirtualServer(vsc) => vsc,
        r => panic!("expected a VirtualServer, got {}", r.key_with_kind()),
    }
}

fn transport_server_config(r: &Resource) -> &TransportServerConfiguration {
    match r {
        Resource::TransportServer(tsc) => tsc,
        r => panic!("expected a TransportServer, got {}", r.key_with_kind()),
    }
}

#[test]
fn ingress_lifecycle() {
    let mut config = mk_configuration(mk_options());

    let (changes, problems) = config.add_or_update_ingress(mk_regular("web", 10, "foo.example.com"));
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "Ingress/default/web".to_string())]
    );
    assert!(problems.is_empty());
    assert_eq!(
        ingress_config(&changes[0].resource).valid_hosts,
        btreemap! { "foo.example.com".to_string() => true }
    );

    // Only a new generation is rendered again.
    let (changes, problems) = config.add_or_update_ingress(mk_regular("web", 10, "foo.example.com"));
    assert!(changes.is_empty());
    assert!(problems.is_empty());

    let mut updated = mk_regular("web", 10, "foo.example.com");
    updated.metadata.generation = Some(2);
    let (changes, _) = config.add_or_update_ingress(updated);
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "Ingress/default/web".to_string())]
    );

    let (changes, problems) = config.delete_ingress("default/web");
    assert_eq!(
        ops(&changes),
        vec![(Op::Delete, "Ingress/default/web".to_string())]
    );
    assert!(problems.is_empty());
    assert!(config.get_resources().is_empty());

    let (changes, problems) = config.delete_ingress("default/web");
    assert!(changes.is_empty());
    assert!(problems.is_empty());
}

#[test]
fn ingress_of_another_class_is_ignored() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_ingress(mk_regular("web", 10, "foo.example.com"));

    let mut other = mk_regular("web", 10, "foo.example.com");
    other.spec.as_mut().unwrap().ingress_class_name = Some("other".to_string());
    let (changes, problems) = config.add_or_update_ingress(other);

    assert_eq!(
        ops(&changes),
        vec![(Op::Delete, "Ingress/default/web".to_string())]
    );
    assert_eq!(changes[0].error, None);
    assert!(problems.is_empty());
}

#[test]
fn older_ingress_keeps_host() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_ingress(mk_regular("a", 10, "foo.example.com"));

    let (changes, problems) = config.add_or_update_ingress(mk_regular("b", 20, "foo.example.com"));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "Ingress/default/b".to_string(),
            false,
            "Rejected",
            "All hosts are taken by other resources",
        )]
    );

    // The same problem is not reported twice.
    let (_, problems) = config.add_or_update_ingress(mk_regular("b", 20, "foo.example.com"));
    assert!(problems.is_empty());

    let (changes, problems) = config.delete_ingress("default/a");
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "Ingress/default/a".to_string()),
            (Op::AddOrUpdate, "Ingress/default/b".to_string()),
        ]
    );
    assert!(problems.is_empty());
    assert!(changes[1].resource.warnings().is_empty());
}

#[test]
fn older_ingress_takes_host_from_newer() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_ingress(mk_regular("a", 20, "foo.example.com"));

    let (changes, problems) = config.add_or_update_ingress(mk_regular("z", 10, "foo.example.com"));
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "Ingress/default/a".to_string()),
            (Op::AddOrUpdate, "Ingress/default/z".to_string()),
        ]
    );
    assert_eq!(
        changes[0].resource.warnings(),
        ["host foo.example.com is taken by another resource"]
    );
    assert_eq!(
        ingress_config(&changes[0].resource).valid_hosts,
        btreemap! { "foo.example.com".to_string() => false }
    );
    assert_eq!(
        reports(&problems),
        vec![(
            "Ingress/default/a".to_string(),
            false,
            "Rejected",
            "All hosts are taken by other resources",
        )]
    );
}

#[test]
fn ingress_holding_some_hosts() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_ingress(mk_regular("a", 10, "foo.example.com"));

    let b = mk_ingress(
        "b",
        20,
        vec![
            mk_rule("foo.example.com", vec![mk_path("/", "web-svc")]),
            mk_rule("bar.example.com", vec![mk_path("/", "web-svc")]),
        ],
    );
    let (changes, problems) = config.add_or_update_ingress(b);

    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "Ingress/default/b".to_string())]
    );
    assert_eq!(
        ingress_config(&changes[0].resource).valid_hosts,
        btreemap! {
            "bar.example.com".to_string() => true,
            "foo.example.com".to_string() => false,
        }
    );
    assert!(problems.is_empty());
}

#[test]
fn invalid_ingress_is_removed_with_error() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_ingress(mk_regular("web", 10, "foo.example.com"));

    let invalid = mk_ingress("web", 10, vec![mk_rule("", vec![mk_path("/", "web-svc")])]);
    let (changes, problems) = config.add_or_update_ingress(invalid);
    assert_eq!(
        ops(&changes),
        vec![(Op::Delete, "Ingress/default/web".to_string())]
    );
    assert_eq!(
        changes[0].error.as_deref(),
        Some("spec.rules[0].host: Required value")
    );
    assert!(problems.is_empty());

    let invalid = mk_ingress("new", 10, vec![mk_rule("", vec![mk_path("/", "web-svc")])]);
    let (changes, problems) = config.add_or_update_ingress(invalid);
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "Ingress/default/new".to_string(),
            true,
            "Rejected",
            "spec.rules[0].host: Required value",
        )]
    );
}

#[test]
fn mergeable_ingresses() {
    let mut config = mk_configuration(mk_options());

    let (changes, problems) =
        config.add_or_update_ingress(mk_minion("tea", 10, "cafe.example.com", "/tea"));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "Ingress/default/tea".to_string(),
            false,
            "NoIngressMasterFound",
            "Ingress master is invalid or doesn't exist",
        )]
    );

    let (changes, problems) =
        config.add_or_update_ingress(mk_master("cafe", 10, "cafe.example.com"));
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "Ingress/default/cafe".to_string())]
    );
    assert!(problems.is_empty());
    let master = ingress_config(&changes[0].resource);
    assert!(master.is_master);
    assert_eq!(master.minions.len(), 1);

    // A minion joining the master re-renders the master.
    let (changes, _) =
        config.add_or_update_ingress(mk_minion("coffee", 10, "cafe.example.com", "/coffee"));
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "Ingress/default/cafe".to_string())]
    );
    let minions = ingress_config(&changes[0].resource)
        .minions
        .iter()
        .map(|m| object_key(&m.ingress.metadata))
        .collect::<Vec<_>>();
    assert_eq!(minions, vec!["default/coffee", "default/tea"]);

    let (changes, problems) = config.delete_ingress("default/cafe");
    assert_eq!(
        ops(&changes),
        vec![(Op::Delete, "Ingress/default/cafe".to_string())]
    );
    assert_eq!(problems.len(), 2);
}

#[test]
fn minions_sharing_a_path() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_ingress(mk_master("cafe", 10, "cafe.example.com"));
    config.add_or_update_ingress(mk_minion("tea", 10, "cafe.example.com", "/tea"));

    let (changes, _) =
        config.add_or_update_ingress(mk_minion("tea-two", 20, "cafe.example.com", "/tea"));
    let master = ingress_config(&changes[0].resource);

    assert_eq!(
        master.child_warnings,
        btreemap! {
            "default/tea-two".to_string() => vec!["path /tea is taken by another resource".to_string()],
        }
    );
    assert_eq!(
        master.minions[0].valid_paths,
        btreemap! { "/tea".to_string() => true }
    );
    assert_eq!(
        master.minions[1].valid_paths,
        btreemap! { "/tea".to_string() => false }
    );
}

#[test]
fn newer_minion_loses_path_to_older() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_ingress(mk_master("cafe", 10, "cafe.example.com"));
    config.add_or_update_ingress(mk_minion("tea", 20, "cafe.example.com", "/tea"));

    let (changes, _) =
        config.add_or_update_ingress(mk_minion("tea-two", 10, "cafe.example.com", "/tea"));
    let master = ingress_config(&changes[0].resource);

    assert_eq!(
        master.child_warnings,
        btreemap! {
            "default/tea".to_string() => vec!["path /tea is taken by another resource".to_string()],
        }
    );
    assert_eq!(
        master.minions[0].valid_paths,
        btreemap! { "/tea".to_string() => false }
    );
    assert_eq!(
        master.minions[1].valid_paths,
        btreemap! { "/tea".to_string() => true }
    );
}

#[test]
fn virtual_server_with_routes() {
    let mut config = mk_configuration(mk_options());

    let (changes, problems) = config
        .add_or_update_virtual_server_route(mk_virtual_server_route("tea", "cafe.example.com", "/tea"));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "VirtualServerRoute/default/tea".to_string(),
            false,
            "NoVirtualServerFound",
            "VirtualServer is invalid or doesn't exist",
        )]
    );

    let vs = mk_virtual_server(
        "cafe",
        10,
        "cafe.example.com",
        vec![mk_route_reference("/tea", "tea")],
    );
    let (changes, problems) = config.add_or_update_virtual_server(vs);
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "VirtualServer/default/cafe".to_string())]
    );
    assert!(problems.is_empty());
    let vsc = virtual_server_config(&changes[0].resource);
    assert_eq!(vsc.virtual_server_routes.len(), 1);
    assert!(vsc.warnings.is_empty());

    let (changes, problems) = config.delete_virtual_server_route("default/tea");
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "VirtualServer/default/cafe".to_string())]
    );
    assert!(problems.is_empty());
    assert_eq!(
        changes[0].resource.warnings(),
        ["VirtualServerRoute default/tea doesn't exist or invalid"]
    );
}

#[test]
fn virtual_server_ignores_misplaced_route() {
    let mut config = mk_configuration(mk_options());
    let vs = mk_virtual_server(
        "cafe",
        10,
        "cafe.example.com",
        vec![mk_route_reference("/tea", "tea")],
    );
    config.add_or_update_virtual_server(vs);

    let (changes, problems) = config
        .add_or_update_virtual_server_route(mk_virtual_server_route("tea", "cafe.example.com", "/coffee"));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "VirtualServerRoute/default/tea".to_string(),
            false,
            "Ignored",
            "VirtualServer default/cafe ignores VirtualServerRoute",
        )]
    );

    let resources = config.get_resources();
    assert_eq!(
        resources[0].warnings(),
        [concat!(
            "VirtualServerRoute default/tea is invalid: ",
            "spec.subroutes[0].path: Invalid value: \"/coffee\": must start with '/tea'",
        )]
    );
}

#[test]
fn invalid_virtual_server_is_reported() {
    let mut config = mk_configuration(mk_options());

    let (changes, problems) = config.add_or_update_virtual_server(mk_virtual_server("cafe", 10, "", vec![]));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "VirtualServer/default/cafe".to_string(),
            true,
            "Rejected",
            "VirtualServer default/cafe was rejected with error: spec.host: Required value",
        )]
    );
}

#[test]
fn invalid_virtual_server_route_is_always_a_problem() {
    let mut config = mk_configuration(mk_options());
    let vs = mk_virtual_server(
        "cafe",
        10,
        "cafe.example.com",
        vec![mk_route_reference("/tea", "tea")],
    );
    config.add_or_update_virtual_server(vs);
    config.add_or_update_virtual_server_route(mk_virtual_server_route("tea", "cafe.example.com", "/tea"));

    let (changes, problems) =
        config.add_or_update_virtual_server_route(mk_virtual_server_route("tea", "", "/tea"));
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "VirtualServer/default/cafe".to_string())]
    );
    assert_eq!(changes[0].error, None);
    assert_eq!(
        reports(&problems),
        vec![(
            "VirtualServerRoute/default/tea".to_string(),
            true,
            "Rejected",
            "VirtualServerRoute default/tea was rejected with error: spec.host: Required value",
        )]
    );
}

#[test]
fn virtual_server_and_ingress_compete_for_host() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_ingress(mk_regular("web", 10, "cafe.example.com"));

    let (changes, problems) = config
        .add_or_update_virtual_server(mk_virtual_server("cafe", 20, "cafe.example.com", vec![]));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "VirtualServer/default/cafe".to_string(),
            false,
            "Rejected",
            "Host is taken by another resource",
        )]
    );

    let (changes, problems) = config.delete_ingress("default/web");
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "Ingress/default/web".to_string()),
            (Op::AddOrUpdate, "VirtualServer/default/cafe".to_string()),
        ]
    );
    assert!(problems.is_empty());
}

#[test]
fn transport_server_listeners() {
    let mut config = mk_configuration(mk_options());

    let (changes, problems) =
        config.add_or_update_transport_server(mk_transport_server("dns", 10, "dns-tcp", "TCP", ""));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "TransportServer/default/dns".to_string(),
            false,
            "Rejected",
            "Listener dns-tcp doesn't exist",
        )]
    );

    let (changes, problems, errors) = config
        .add_or_update_global_configuration(mk_global_configuration(&[("dns-tcp", 5353, "TCP")]));
    assert!(errors.is_none());
    assert!(problems.is_empty());
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "TransportServer/default/dns".to_string())]
    );
    assert_eq!(transport_server_config(&changes[0].resource).listener_port, 5353);

    let (changes, problems) = config
        .add_or_update_transport_server(mk_transport_server("dns-two", 20, "dns-tcp", "TCP", ""));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "TransportServer/default/dns-two".to_string(),
            false,
            "Rejected",
            "Listener dns-tcp is taken by another resource",
        )]
    );

    let (changes, problems) = config.delete_global_configuration();
    assert_eq!(
        ops(&changes),
        vec![(Op::Delete, "TransportServer/default/dns".to_string())]
    );
    assert_eq!(
        reports(&problems),
        vec![
            (
                "TransportServer/default/dns".to_string(),
                false,
                "Rejected",
                "Listener dns-tcp doesn't exist",
            ),
            (
                "TransportServer/default/dns-two".to_string(),
                false,
                "Rejected",
                "Listener dns-tcp doesn't exist",
            ),
        ]
    );
    assert_eq!(config.get_global_configuration(), None);
}

#[test]
fn listener_protocol_must_match() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_global_configuration(mk_global_configuration(&[("dns", 5353, "UDP")]));

    let (changes, problems) =
        config.add_or_update_transport_server(mk_transport_server("dns", 10, "dns", "TCP", ""));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "TransportServer/default/dns".to_string(),
            false,
            "Rejected",
            "Listener dns doesn't exist",
        )]
    );
}

#[test]
fn swapping_listener_ports_rebinds_both() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_global_configuration(mk_global_configuration(&[
        ("dns-tcp", 5353, "TCP"),
        ("dns-udp", 5354, "UDP"),
    ]));
    config.add_or_update_transport_server(mk_transport_server("tcp", 10, "dns-tcp", "TCP", ""));
    config.add_or_update_transport_server(mk_transport_server("udp", 10, "dns-udp", "UDP", ""));

    let (changes, problems, errors) = config.add_or_update_global_configuration(
        mk_global_configuration(&[("dns-tcp", 5354, "TCP"), ("dns-udp", 5353, "UDP")]),
    );
    assert!(errors.is_none());
    assert!(problems.is_empty());
    assert_eq!(
        ops(&changes),
        vec![
            (Op::AddOrUpdate, "TransportServer/default/tcp".to_string()),
            (Op::AddOrUpdate, "TransportServer/default/udp".to_string()),
        ]
    );
    assert_eq!(transport_server_config(&changes[0].resource).listener_port, 5354);
    assert_eq!(transport_server_config(&changes[1].resource).listener_port, 5353);
    assert_eq!(
        config.get_transport_server_metrics(),
        TransportServerMetrics {
            total_tls_passthrough: 0,
            total_tcp: 1,
            total_udp: 1,
        }
    );
}

#[test]
fn invalid_global_configuration_is_dropped() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_global_configuration(mk_global_configuration(&[("dns-tcp", 5353, "TCP")]));
    config.add_or_update_transport_server(mk_transport_server("dns", 10, "dns-tcp", "TCP", ""));

    let (changes, _, errors) =
        config.add_or_update_global_configuration(mk_global_configuration(&[("dns-tcp", 80, "TCP")]));
    assert_eq!(
        errors.map(|e| e.to_string()),
        Some("spec.listeners[0].port: Forbidden: port 80 is forbidden".to_string())
    );
    assert_eq!(
        ops(&changes),
        vec![(Op::Delete, "TransportServer/default/dns".to_string())]
    );
    assert_eq!(config.get_global_configuration(), None);
}

#[test]
fn invalid_transport_server_is_removed_with_error() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_global_configuration(mk_global_configuration(&[("dns-tcp", 5353, "TCP")]));
    config.add_or_update_transport_server(mk_transport_server("dns", 10, "dns-tcp", "TCP", ""));

    let mut invalid = mk_transport_server("dns", 10, "dns-tcp", "TCP", "");
    invalid.spec.action = None;
    let (changes, problems) = config.add_or_update_transport_server(invalid);

    assert_eq!(
        ops(&changes),
        vec![(Op::Delete, "TransportServer/default/dns".to_string())]
    );
    assert_eq!(
        changes[0].error.as_deref(),
        Some("spec.action: Required value: must specify action")
    );
    assert!(problems.is_empty());
}

#[test]
fn tls_passthrough_transport_servers_hold_hosts() {
    let options = ConfigurationOptions {
        is_tls_passthrough_enabled: true,
        ..mk_options()
    };
    let mut config = mk_configuration(options);
    config.add_or_update_virtual_server(mk_virtual_server("app", 20, "app.example.com", vec![]));

    let (changes, problems) =
        config.add_or_update_transport_server(mk_passthrough("secure", 10, "app.example.com"));
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "VirtualServer/default/app".to_string()),
            (Op::AddOrUpdate, "TransportServer/default/secure".to_string()),
        ]
    );
    assert_eq!(
        reports(&problems),
        vec![(
            "VirtualServer/default/app".to_string(),
            false,
            "Rejected",
            "Host is taken by another resource",
        )]
    );
    assert_eq!(
        config.get_transport_server_metrics(),
        TransportServerMetrics {
            total_tls_passthrough: 1,
            total_tcp: 0,
            total_udp: 0,
        }
    );

    let (changes, problems) = config.delete_transport_server("default/secure");
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "TransportServer/default/secure".to_string()),
            (Op::AddOrUpdate, "VirtualServer/default/app".to_string()),
        ]
    );
    assert!(problems.is_empty());
}

#[test]
fn tls_passthrough_requires_the_feature() {
    let mut config = mk_configuration(mk_options());

    let (changes, problems) =
        config.add_or_update_transport_server(mk_passthrough("secure", 10, "app.example.com"));
    assert!(changes.is_empty());
    assert_eq!(
        reports(&problems),
        vec![(
            "TransportServer/default/secure".to_string(),
            true,
            "Rejected",
            "TransportServer default/secure was rejected with error: spec.listener: Forbidden: TLS Passthrough is not enabled",
        )]
    );
}

#[test]
fn transport_server_moving_between_host_and_listener() {
    let options = ConfigurationOptions {
        is_tls_passthrough_enabled: true,
        ..mk_options()
    };
    let mut config = mk_configuration(options);
    config.add_or_update_global_configuration(mk_global_configuration(&[("dns-tcp", 5353, "TCP")]));
    config.add_or_update_transport_server(mk_passthrough("dns", 10, "app.example.com"));

    let (changes, problems) =
        config.add_or_update_transport_server(mk_transport_server("dns", 10, "dns-tcp", "TCP", ""));
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "TransportServer/default/dns".to_string())]
    );
    assert_eq!(transport_server_config(&changes[0].resource).listener_port, 5353);
    assert!(problems.is_empty());
    assert_eq!(
        config.get_transport_server_metrics(),
        TransportServerMetrics {
            total_tls_passthrough: 0,
            total_tcp: 1,
            total_udp: 0,
        }
    );

    let (changes, problems) =
        config.add_or_update_transport_server(mk_passthrough("dns", 10, "app.example.com"));
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "TransportServer/default/dns".to_string())]
    );
    assert_eq!(
        transport_server_config(&changes[0].resource)
            .transport_server
            .spec
            .listener
            .protocol,
        ts::TLS_PASSTHROUGH_LISTENER_PROTOCOL
    );
    assert!(problems.is_empty());
    assert_eq!(
        config.get_transport_server_metrics(),
        TransportServerMetrics {
            total_tls_passthrough: 1,
            total_tcp: 0,
            total_udp: 0,
        }
    );
}

/// Objects created at the same instant, competing for hosts and a listener.
fn mk_tied_events() -> [fn(&mut Configuration); 8] {
    [
        |c: &mut Configuration| {
            c.add_or_update_ingress(mk_regular("web", 10, "a.example.com"));
        },
        |c: &mut Configuration| {
            c.add_or_update_virtual_server(mk_virtual_server("cafe", 10, "a.example.com", vec![]));
        },
        |c: &mut Configuration| {
            c.add_or_update_transport_server(mk_passthrough("secure", 10, "a.example.com"));
        },
        |c: &mut Configuration| {
            c.add_or_update_ingress(mk_regular("b-web", 10, "b.example.com"));
        },
        |c: &mut Configuration| {
            c.add_or_update_virtual_server(mk_virtual_server("other", 10, "b.example.com", vec![]));
        },
        |c: &mut Configuration| {
            c.add_or_update_global_configuration(mk_global_configuration(&[(
                "dns-tcp", 5353, "TCP",
            )]));
        },
        |c: &mut Configuration| {
            c.add_or_update_transport_server(mk_transport_server("dns", 10, "dns-tcp", "TCP", ""));
        },
        |c: &mut Configuration| {
            c.add_or_update_transport_server(mk_transport_server(
                "dns-two", 10, "dns-tcp", "TCP", "",
            ));
        },
    ]
}

#[test]
fn resources_do_not_depend_on_event_order() {
    let options = ConfigurationOptions {
        is_tls_passthrough_enabled: true,
        ..mk_options()
    };
    let events = mk_tied_events();

    let mut forward = mk_configuration(options.clone());
    for event in events.iter() {
        event(&mut forward);
    }

    let mut backward = mk_configuration(options);
    for event in events.iter().rev() {
        event(&mut backward);
    }

    assert_eq!(
        keys(&forward.get_resources()),
        vec![
            "Ingress/default/web",
            "TransportServer/default/dns-two",
            "VirtualServer/default/other",
        ]
    );
    assert_eq!(forward.get_resources(), backward.get_resources());
}

#[test]
fn resources_are_sorted_and_filtered() {
    let mut config = mk_configuration(mk_options());
    config.add_or_update_global_configuration(mk_global_configuration(&[("dns-tcp", 5353, "TCP")]));
    config.add_or_update_transport_server(mk_transport_server("dns", 10, "dns-tcp", "TCP", ""));
    config.add_or_update_virtual_server(mk_virtual_server("cafe", 10, "cafe.example.com", vec![]));
    config.add_or_update_ingress(mk_ingress(
        "web",
        10,
        vec![
            mk_rule("a.example.com", vec![mk_path("/", "web-svc")]),
            mk_rule("b.example.com", vec![mk_path("/", "web-svc")]),
        ],
    ));

    assert_eq!(
        keys(&config.get_resources()),
        vec![
            "Ingress/default/web",
            "TransportServer/default/dns",
            "VirtualServer/default/cafe",
        ]
    );
    assert_eq!(
        keys(&config.get_resources_with_filter(ResourceFilter {
            ingresses: false,
            virtual_servers: true,
            transport_servers: true,
        })),
        vec!["TransportServer/default/dns", "VirtualServer/default/cafe"]
    );
}

#[test]
fn finds_resources_for_references() {
    let mut config = mk_configuration(mk_options());

    let mut web = mk_ingress(
        "web",
        10,
        vec![
            mk_rule("a.example.com", vec![mk_path("/", "web-svc")]),
            mk_rule("b.example.com", vec![mk_path("/", "web-svc")]),
        ],
    );
    web.spec.as_mut().unwrap().tls = Some(vec![IngressTLS {
        hosts: None,
        secret_name: Some("web-tls".to_string()),
    }]);
    config.add_or_update_ingress(web);

    let mut cafe = mk_virtual_server("cafe", 10, "cafe.example.com", vec![]);
    cafe.spec.tls = Some(Tls {
        secret: "cafe-tls".to_string(),
    });
    cafe.spec.upstreams = vec![vs::Upstream {
        name: "web".to_string(),
        service: "web-svc".to_string(),
        port: 80,
        use_cluster_ip: true,
        ..Default::default()
    }];
    config.add_or_update_virtual_server(cafe);

    config.add_or_update_global_configuration(mk_global_configuration(&[("dns-tcp", 5353, "TCP")]));
    config.add_or_update_transport_server(mk_transport_server("dns", 10, "dns-tcp", "TCP", ""));

    assert_eq!(
        keys(&config.find_resources_for_service("default", "web-svc")),
        vec!["Ingress/default/web", "VirtualServer/default/cafe"]
    );
    assert_eq!(
        keys(&config.find_resources_for_endpoints("default", "web-svc")),
        vec!["Ingress/default/web"]
    );
    assert_eq!(
        keys(&config.find_resources_for_service("default", "backend-svc")),
        vec!["TransportServer/default/dns"]
    );
    assert!(config
        .find_resources_for_service("other", "web-svc")
        .is_empty());
    assert_eq!(
        keys(&config.find_resources_for_secret("default", "cafe-tls")),
        vec!["VirtualServer/default/cafe"]
    );
    assert_eq!(
        keys(&config.find_resources_for_secret("default", "web-tls")),
        vec!["Ingress/default/web"]
    );
}

#[test]
fn policies_for_secret() {
    let mut config = mk_configuration(mk_options());

    let jwt = |name: &str, class: &str| Policy {
        metadata: mk_meta(name, 10),
        spec: PolicySpec {
            ingress_class_name: class.to_string(),
            jwt: Some(JwtAuth {
                secret: "jwk".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
    };
    config.add_or_update_policy(jwt("a", ""));
    config.add_or_update_policy(jwt("b", CLASS));
    config.add_or_update_policy(jwt("c", "other"));

    let names = |policies: Vec<Arc<Policy>>| {
        policies
            .iter()
            .map(|p| object_key(&p.metadata))
            .collect::<Vec<_>>()
    };
    assert_eq!(
        names(config.find_policies_for_secret("default", "jwk")),
        vec!["default/a", "default/b"]
    );

    config.delete_policy("default/a");
    assert_eq!(
        names(config.find_policies_for_secret("default", "jwk")),
        vec!["default/b"]
    );
    assert!(config.find_policies_for_secret("other", "jwk").is_empty());
}
