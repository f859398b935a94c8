use super::{
    field::{FieldError, FieldErrors, Path},
    format, Features,
};
use nginx_ingress_controller_k8s_api::transport_server::{
    Action, TransportServer, TransportServerListener, Upstream, UpstreamParameters,
    TLS_PASSTHROUGH_LISTENER_NAME, TLS_PASSTHROUGH_LISTENER_PROTOCOL,
};
use std::collections::BTreeSet;

/// Protocols a regular (non-passthrough) listener may declare.
pub(super) const LISTENER_PROTOCOLS: &str = "TCP, UDP";

const STREAM_LB_METHODS: &[&str] = &[
    "round_robin",
    "least_conn",
    "random",
    "random two",
    "random two least_conn",
];

const PLUS_STREAM_LB_METHODS: &[&str] = &[
    "random least_conn",
    "least_time connect",
    "least_time first_byte",
    "least_time last_byte",
    "least_time last_byte inflight",
];

pub(super) fn validate(ts: &TransportServer, features: &Features) -> FieldErrors {
    let spec = &ts.spec;
    let path = Path::new("spec");

    let mut errors = validate_listener(&spec.listener, &path.child("listener"), features);

    let host_path = path.child("host");
    if spec.listener.is_tls_passthrough() {
        errors.extend(format::validate_host(&spec.host, &host_path));
    } else if !spec.host.is_empty() {
        errors.push(FieldError::forbidden(
            &host_path,
            "host field is allowed only for TLS Passthrough TransportServers",
        ));
    }

    let (upstream_errors, upstreams) =
        validate_upstreams(&spec.upstreams, &path.child("upstreams"), features.is_plus);
    errors.extend(upstream_errors);

    if let Some(params) = &spec.upstream_parameters {
        errors.extend(validate_upstream_parameters(
            params,
            &path.child("upstreamParameters"),
            &spec.listener.protocol,
        ));
    }
    if let Some(session) = &spec.session_parameters {
        errors.extend(format::validate_time(
            &session.timeout,
            &path.child("sessionParameters").child("timeout"),
        ));
    }

    let action_path = path.child("action");
    match &spec.action {
        None => errors.push(FieldError::required(&action_path, "must specify action")),
        Some(action) => errors.extend(validate_action(action, &action_path, &upstreams)),
    }

    errors.extend(format::validate_snippet(
        &spec.server_snippets,
        &path.child("serverSnippets"),
        features.snippets_enabled,
    ));
    errors.extend(format::validate_snippet(
        &spec.stream_snippets,
        &path.child("streamSnippets"),
        features.snippets_enabled,
    ));

    errors
}

fn validate_listener(
    listener: &TransportServerListener,
    path: &Path,
    features: &Features,
) -> FieldErrors {
    if !listener.is_tls_passthrough() {
        let mut errors = format::validate_dns1035_label(&listener.name, &path.child("name"));
        errors.extend(validate_listener_protocol(
            &listener.protocol,
            &path.child("protocol"),
        ));
        return errors;
    }

    if !features.tls_passthrough_enabled {
        return FieldError::forbidden(path, "TLS Passthrough is not enabled").into();
    }

    if listener.name == TLS_PASSTHROUGH_LISTENER_NAME
        && listener.protocol != TLS_PASSTHROUGH_LISTENER_PROTOCOL
    {
        return FieldError::invalid(
            &path.child("protocol"),
            &listener.protocol,
            format!(
                "must be '{TLS_PASSTHROUGH_LISTENER_PROTOCOL}' for the built-in \
                 {TLS_PASSTHROUGH_LISTENER_NAME} listener"
            ),
        )
        .into();
    }

    if listener.protocol == TLS_PASSTHROUGH_LISTENER_PROTOCOL
        && listener.name != TLS_PASSTHROUGH_LISTENER_NAME
    {
        return FieldError::invalid(
            &path.child("name"),
            &listener.name,
            format!(
                "must be '{TLS_PASSTHROUGH_LISTENER_NAME}' for a listener with the protocol \
                 {TLS_PASSTHROUGH_LISTENER_PROTOCOL}"
            ),
        )
        .into();
    }

    FieldErrors::default()
}

pub(super) fn validate_listener_protocol(protocol: &str, path: &Path) -> FieldErrors {
    if protocol.is_empty() {
        return FieldError::required(
            path,
            format!("must specify protocol. Accepted values: {LISTENER_PROTOCOLS}"),
        )
        .into();
    }
    if protocol != "TCP" && protocol != "UDP" {
        return FieldError::invalid(
            path,
            protocol,
            format!("invalid protocol. Accepted values: {LISTENER_PROTOCOLS}"),
        )
        .into();
    }
    FieldErrors::default()
}

fn validate_upstreams<'u>(
    upstreams: &'u [Upstream],
    path: &Path,
    is_plus: bool,
) -> (FieldErrors, BTreeSet<&'u str>) {
    let mut errors = FieldErrors::default();
    let mut names = BTreeSet::new();

    for (i, upstream) in upstreams.iter().enumerate() {
        let upstream_path = path.index(i);
        let name_path = upstream_path.child("name");

        let name_errors = format::validate_dns1035_label(&upstream.name, &name_path);
        if !name_errors.is_empty() {
            errors.extend(name_errors);
        } else if !names.insert(upstream.name.as_str()) {
            errors.push(FieldError::duplicate(&name_path, &upstream.name));
        }

        errors.extend(format::validate_dns1035_label(
            &upstream.service,
            &upstream_path.child("service"),
        ));
        errors.extend(format::validate_non_negative(
            upstream.max_fails,
            &upstream_path.child("maxFails"),
        ));
        errors.extend(format::validate_non_negative(
            upstream.max_conns,
            &upstream_path.child("maxConns"),
        ));
        errors.extend(format::validate_time(
            &upstream.fail_timeout,
            &upstream_path.child("failTimeout"),
        ));
        errors.extend(format::validate_port(
            upstream.port.into(),
            &upstream_path.child("port"),
        ));
        errors.extend(validate_lb_method(
            &upstream.load_balancing_method,
            &upstream_path.child("loadBalancingMethod"),
            is_plus,
        ));
    }

    (errors, names)
}

fn validate_lb_method(method: &str, path: &Path, is_plus: bool) -> FieldErrors {
    let method = method.trim();
    if method.is_empty() {
        return FieldErrors::default();
    }

    if method.starts_with("hash") {
        if !format::is_hash_lb_method(method) {
            return FieldError::invalid(
                path,
                method,
                format!("invalid value for load balancing method: {method}"),
            )
            .into();
        }
        if let Err(msg) = format::escaped_string(method) {
            return FieldError::invalid(path, method, format!("invalid value for hash: {msg}"))
                .into();
        }
        return FieldErrors::default();
    }

    if STREAM_LB_METHODS.contains(&method) || (is_plus && PLUS_STREAM_LB_METHODS.contains(&method))
    {
        return FieldErrors::default();
    }

    FieldError::invalid(
        path,
        method,
        format!("load balancing method is not valid: {method}"),
    )
    .into()
}

fn validate_upstream_parameters(
    params: &UpstreamParameters,
    path: &Path,
    protocol: &str,
) -> FieldErrors {
    let mut errors = FieldErrors::default();

    for (value, name) in [
        (params.udp_requests, "udpRequests"),
        (params.udp_responses, "udpResponses"),
    ] {
        let param_path = path.child(name);
        if value.is_some() && protocol != "UDP" {
            errors.push(FieldError::forbidden(
                &param_path,
                "is not allowed for non-UDP TransportServers",
            ));
        } else {
            errors.extend(format::validate_non_negative(value, &param_path));
        }
    }

    errors.extend(format::validate_time(
        &params.connect_timeout,
        &path.child("connectTimeout"),
    ));
    errors.extend(format::validate_time(
        &params.next_upstream_timeout,
        &path.child("nextUpstreamTimeout"),
    ));
    errors.extend(format::validate_non_negative(
        Some(params.next_upstream_tries),
        &path.child("nextUpstreamTries"),
    ));

    errors
}

fn validate_action(action: &Action, path: &Path, upstreams: &BTreeSet<&str>) -> FieldErrors {
    if action.pass.is_empty() {
        return FieldError::required(path, "must specify pass").into();
    }
    if !upstreams.contains(action.pass.as_str()) {
        return FieldError::not_found(&path.child("pass"), &action.pass).into();
    }
    FieldErrors::default()
}
