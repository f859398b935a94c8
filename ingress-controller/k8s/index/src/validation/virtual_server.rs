use super::{
    field::{FieldError, FieldErrors, Path},
    format, Features,
};
use nginx_ingress_controller_k8s_api::virtual_server::{
    Action, PolicyReference, Route, Upstream, VirtualServer, VirtualServerRoute,
};
use std::collections::BTreeSet;

pub(super) fn validate_virtual_server(vs: &VirtualServer, features: &Features) -> FieldErrors {
    let spec = &vs.spec;
    let path = Path::new("spec");

    let mut errors = format::validate_host(&spec.host, &path.child("host"));

    if let Some(tls) = &spec.tls {
        if !tls.secret.is_empty() {
            let secret_path = path.child("tls").child("secret");
            errors.extend(
                format::dns1123_subdomain(&tls.secret)
                    .into_iter()
                    .map(|msg| FieldError::invalid(&secret_path, &tls.secret, msg)),
            );
        }
    }

    errors.extend(validate_policies(&spec.policies, &path.child("policies")));

    let (upstream_errors, upstreams) =
        validate_upstreams(&spec.upstreams, &path.child("upstreams"), features);
    errors.extend(upstream_errors);

    let routes_path = path.child("routes");
    let mut paths = BTreeSet::new();
    for (i, route) in spec.routes.iter().enumerate() {
        let route_path = routes_path.index(i);
        errors.extend(validate_route(route, &route_path, &upstreams, features, true));
        if !paths.insert(route.path.as_str()) {
            errors.push(FieldError::duplicate(&route_path.child("path"), &route.path));
        }
    }

    errors.extend(validate_dos(&spec.dos, &path.child("dos"), features));
    errors.extend(format::validate_snippet(
        &spec.server_snippets,
        &path.child("server-snippets"),
        features.snippets_enabled,
    ));
    errors.extend(format::validate_snippet(
        &spec.http_snippets,
        &path.child("http-snippets"),
        features.snippets_enabled,
    ));

    errors
}

pub(super) fn validate_virtual_server_route(
    vsr: &VirtualServerRoute,
    features: &Features,
) -> FieldErrors {
    let spec = &vsr.spec;
    let path = Path::new("spec");

    let mut errors = format::validate_host(&spec.host, &path.child("host"));

    let (upstream_errors, upstreams) =
        validate_upstreams(&spec.upstreams, &path.child("upstreams"), features);
    errors.extend(upstream_errors);

    let subroutes_path = path.child("subroutes");
    let mut paths = BTreeSet::new();
    for (i, route) in spec.subroutes.iter().enumerate() {
        let route_path = subroutes_path.index(i);
        errors.extend(validate_route(route, &route_path, &upstreams, features, false));
        if !paths.insert(route.path.as_str()) {
            errors.push(FieldError::duplicate(&route_path.child("path"), &route.path));
        }
    }

    errors
}

/// Checks that a VirtualServerRoute fits under the route of the VirtualServer that references it.
pub(super) fn validate_for_virtual_server(
    vsr: &VirtualServerRoute,
    host: &str,
    route_path: &str,
) -> FieldErrors {
    let path = Path::new("spec");
    let mut errors = FieldErrors::default();

    if vsr.spec.host != host {
        errors.push(FieldError::invalid(
            &path.child("host"),
            &vsr.spec.host,
            format!("must be equal to '{host}'"),
        ));
    }

    let subroutes_path = path.child("subroutes");
    for (i, subroute) in vsr.spec.subroutes.iter().enumerate() {
        if !subroute.path.starts_with(route_path) {
            errors.push(FieldError::invalid(
                &subroutes_path.index(i).child("path"),
                &subroute.path,
                format!("must start with '{route_path}'"),
            ));
        }
    }

    errors
}

fn validate_policies(policies: &[PolicyReference], path: &Path) -> FieldErrors {
    let mut errors = FieldErrors::default();
    let mut seen = BTreeSet::new();

    for (i, policy) in policies.iter().enumerate() {
        let policy_path = path.index(i);
        let name_path = policy_path.child("name");
        if policy.name.is_empty() {
            errors.push(FieldError::required(&name_path, ""));
            continue;
        }

        errors.extend(
            format::qualified_name(&policy.name)
                .into_iter()
                .map(|msg| FieldError::invalid(&name_path, &policy.name, msg)),
        );
        if !policy.namespace.is_empty() {
            let ns_path = policy_path.child("namespace");
            errors.extend(
                format::dns1123_subdomain(&policy.namespace)
                    .into_iter()
                    .map(|msg| FieldError::invalid(&ns_path, &policy.namespace, msg)),
            );
        }

        let key = format!("{}/{}", policy.namespace, policy.name);
        if !seen.insert(key) {
            errors.push(FieldError::duplicate(&name_path, &policy.name));
        }
    }

    errors
}

fn validate_upstreams<'u>(
    upstreams: &'u [Upstream],
    path: &Path,
    features: &Features,
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
        errors.extend(format::validate_port(
            upstream.port.into(),
            &upstream_path.child("port"),
        ));

        if let Err(msg) = format::http_lb_method(&upstream.lb_method, features.is_plus) {
            errors.push(FieldError::invalid(
                &upstream_path.child("lb-method"),
                &upstream.lb_method,
                msg,
            ));
        }
    }

    (errors, names)
}

fn validate_route(
    route: &Route,
    path: &Path,
    upstreams: &BTreeSet<&str>,
    features: &Features,
    allow_route_reference: bool,
) -> FieldErrors {
    let mut errors = FieldErrors::default();

    let route_path_path = path.child("path");
    if route.path.is_empty() {
        errors.push(FieldError::required(&route_path_path, ""));
    } else if !route.path.starts_with('/') && !route.path.starts_with('~') {
        errors.push(FieldError::invalid(
            &route_path_path,
            &route.path,
            "must start with '/' or '~'",
        ));
    } else if let Err(msg) = format::escaped_string(&route.path) {
        errors.push(FieldError::invalid(&route_path_path, &route.path, msg));
    }

    let has_route = allow_route_reference && !route.route.is_empty();
    if !allow_route_reference && !route.route.is_empty() {
        errors.push(FieldError::forbidden(
            &path.child("route"),
            "subroutes cannot reference other routes",
        ));
    }

    match (&route.action, has_route) {
        (Some(_), true) => errors.push(FieldError::invalid(
            path,
            &route.path,
            "must specify exactly one of: `action` or `route`",
        )),
        (None, false) => errors.push(FieldError::required(
            path,
            if allow_route_reference {
                "must specify exactly one of: `action` or `route`"
            } else {
                "must specify `action`"
            },
        )),
        (Some(action), false) => {
            errors.extend(validate_action(action, &path.child("action"), upstreams))
        }
        (None, true) => {
            let reference_path = path.child("route");
            let (ns, name) = route.route.split_once('/').unwrap_or(("", route.route.as_str()));
            if !ns.is_empty() {
                errors.extend(
                    format::dns1123_subdomain(ns)
                        .into_iter()
                        .map(|msg| FieldError::invalid(&reference_path, &route.route, msg)),
                );
            }
            errors.extend(
                format::dns1123_subdomain(name)
                    .into_iter()
                    .map(|msg| FieldError::invalid(&reference_path, &route.route, msg)),
            );
        }
    }

    errors.extend(validate_policies(&route.policies, &path.child("policies")));
    errors.extend(validate_dos(&route.dos, &path.child("dos"), features));
    errors.extend(format::validate_snippet(
        &route.location_snippets,
        &path.child("location-snippets"),
        features.snippets_enabled,
    ));

    errors
}

fn validate_action(action: &Action, path: &Path, upstreams: &BTreeSet<&str>) -> FieldErrors {
    let mut errors = FieldErrors::default();

    if action.kinds() != 1 {
        errors.push(FieldError::invalid(
            path,
            action.kinds() as i32,
            "must specify exactly one of: `pass`, `redirect`, `return` or `proxy`",
        ));
        return errors;
    }

    let upstream = if !action.pass.is_empty() {
        Some((&action.pass, path.child("pass")))
    } else {
        action
            .proxy
            .as_ref()
            .map(|proxy| (&proxy.upstream, path.child("proxy").child("upstream")))
    };
    if let Some((name, name_path)) = upstream {
        if !upstreams.contains(name.as_str()) {
            errors.push(FieldError::not_found(&name_path, name));
        }
    }

    if let Some(redirect) = &action.redirect {
        let url_path = path.child("redirect").child("url");
        if redirect.url.is_empty() {
            errors.push(FieldError::required(&url_path, ""));
        }
        if let Some(code) = redirect.code {
            if ![301, 302, 307, 308].contains(&code) {
                errors.push(FieldError::not_supported(
                    &path.child("redirect").child("code"),
                    code,
                    &["301", "302", "307", "308"],
                ));
            }
        }
    }

    if let Some(respond) = &action.respond {
        if let Some(code) = respond.code {
            if !(200..=599).contains(&code) {
                errors.push(FieldError::invalid(
                    &path.child("return").child("code"),
                    code,
                    "must be between 200 and 599, inclusive",
                ));
            }
        }
        if let Err(msg) = format::escaped_string(&respond.body) {
            errors.push(FieldError::invalid(
                &path.child("return").child("body"),
                &respond.body,
                msg,
            ));
        }
    }

    errors
}

fn validate_dos(dos: &str, path: &Path, features: &Features) -> FieldErrors {
    if dos.is_empty() {
        return FieldErrors::default();
    }
    if !features.app_protect_dos_enabled {
        return FieldError::forbidden(
            path,
            "dos protected resource specified but App Protect DoS is not enabled",
        )
        .into();
    }
    format::qualified_name(dos)
        .into_iter()
        .map(|msg| FieldError::invalid(path, dos, msg))
        .collect()
}
