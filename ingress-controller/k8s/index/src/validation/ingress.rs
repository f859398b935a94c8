use super::{
    annotations::{self, MERGEABLE_INGRESS_TYPE},
    field::{FieldError, FieldErrors, Path},
    Features,
};
use nginx_ingress_controller_k8s_api::{Ingress, IngressBackend, IngressSpec};
use std::collections::{BTreeMap, BTreeSet};

/// The role of an Ingress in a mergeable (master/minion) group.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mergeable {
    Master,
    Minion,
    None,
}

pub fn mergeable(ingress: &Ingress) -> Mergeable {
    let kind = ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(MERGEABLE_INGRESS_TYPE));
    match kind.map(String::as_str) {
        Some("master") => Mergeable::Master,
        Some("minion") => Mergeable::Minion,
        _ => Mergeable::None,
    }
}

pub(super) fn validate(ingress: &Ingress, features: &Features) -> FieldErrors {
    let empty = BTreeMap::new();
    let annotations = ingress.metadata.annotations.as_ref().unwrap_or(&empty);
    let spec = ingress.spec.clone().unwrap_or_default();
    let spec_path = Path::new("spec");

    let mut errors = annotations::validate(
        annotations,
        &spec_services(&spec),
        features,
        &Path::new("annotations"),
    );
    errors.extend(validate_spec(&spec, &spec_path));

    match mergeable(ingress) {
        Mergeable::Master => errors.extend(validate_master(&spec, &spec_path)),
        Mergeable::Minion => errors.extend(validate_minion(&spec, &spec_path)),
        Mergeable::None => {}
    }

    errors
}

fn validate_spec(spec: &IngressSpec, path: &Path) -> FieldErrors {
    let mut errors = FieldErrors::default();

    if let Some(backend) = &spec.default_backend {
        errors.extend(validate_backend(backend, &path.child("defaultBackend")));
    }

    let rules = spec.rules.as_deref().unwrap_or_default();
    if rules.is_empty() {
        errors.push(FieldError::required(&path.child("rules"), ""));
        return errors;
    }

    let mut hosts = BTreeSet::new();
    for (i, rule) in rules.iter().enumerate() {
        let rule_path = path.child("rules").index(i);
        let host = rule.host.as_deref().unwrap_or_default();
        if host.is_empty() {
            errors.push(FieldError::required(&rule_path.child("host"), ""));
        } else if !hosts.insert(host) {
            errors.push(FieldError::duplicate(&rule_path.child("host"), host));
        }

        let Some(http) = &rule.http else {
            continue;
        };
        for (j, p) in http.paths.iter().enumerate() {
            let backend_path = rule_path.child("http").child("paths").index(j).child("backend");
            errors.extend(validate_backend(&p.backend, &backend_path));
        }
    }

    errors
}

fn validate_backend(backend: &IngressBackend, path: &Path) -> FieldErrors {
    if backend.resource.is_some() {
        return FieldError::forbidden(
            &path.child("resource"),
            "resource backends are not supported",
        )
        .into();
    }
    FieldErrors::default()
}

fn validate_master(spec: &IngressSpec, path: &Path) -> FieldErrors {
    let rules = spec.rules.as_deref().unwrap_or_default();
    if rules.len() != 1 {
        return FieldError::too_many(&path.child("rules"), rules.len(), 1).into();
    }

    let paths = rules[0].http.as_ref().map_or(0, |http| http.paths.len());
    if paths > 0 {
        let paths_path = path.child("rules").index(0).child("http").child("paths");
        return FieldError::too_many(&paths_path, paths, 0).into();
    }

    FieldErrors::default()
}

fn validate_minion(spec: &IngressSpec, path: &Path) -> FieldErrors {
    let mut errors = FieldErrors::default();

    let tls = spec.tls.as_ref().map_or(0, Vec::len);
    if tls > 0 {
        errors.push(FieldError::too_many(&path.child("tls"), tls, 0));
    }

    let rules = spec.rules.as_deref().unwrap_or_default();
    if rules.len() != 1 {
        errors.push(FieldError::too_many(&path.child("rules"), rules.len(), 1));
        return errors;
    }

    let paths = rules[0].http.as_ref().map_or(0, |http| http.paths.len());
    if paths == 0 {
        let paths_path = path.child("rules").index(0).child("http").child("paths");
        errors.push(FieldError::required(
            &paths_path,
            "must include at least one path",
        ));
    }

    errors
}

/// Names of the services the Ingress routes to.
fn spec_services(spec: &IngressSpec) -> BTreeSet<String> {
    let default = spec.default_backend.iter();
    let paths = spec
        .rules
        .iter()
        .flatten()
        .filter_map(|r| r.http.as_ref())
        .flat_map(|http| http.paths.iter().map(|p| &p.backend));

    default
        .chain(paths)
        .filter_map(|b| b.service.as_ref())
        .map(|svc| svc.name.clone())
        .collect()
}
