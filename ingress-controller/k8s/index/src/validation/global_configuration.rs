use super::{
    field::{FieldError, FieldErrors, Path},
    format, transport_server, Features,
};
use nginx_ingress_controller_k8s_api::{
    global_configuration::Listener, transport_server::TLS_PASSTHROUGH_LISTENER_NAME,
    GlobalConfiguration,
};
use std::collections::BTreeSet;

pub(super) fn validate(gc: &GlobalConfiguration, features: &Features) -> FieldErrors {
    let path = Path::new("spec").child("listeners");
    let mut errors = FieldErrors::default();
    let mut names = BTreeSet::new();
    let mut ports = BTreeSet::new();

    for (i, listener) in gc.spec.listeners.iter().enumerate() {
        let listener_path = path.index(i);
        errors.extend(validate_listener(
            listener,
            &listener_path,
            &mut names,
            &mut ports,
            features,
        ));
    }

    errors
}

fn validate_listener<'l>(
    listener: &'l Listener,
    path: &Path,
    names: &mut BTreeSet<&'l str>,
    ports: &mut BTreeSet<i32>,
    features: &Features,
) -> FieldErrors {
    let name_path = path.child("name");
    let mut errors = if listener.name == TLS_PASSTHROUGH_LISTENER_NAME {
        FieldError::forbidden(&name_path, "reserved name").into()
    } else {
        format::validate_dns1035_label(&listener.name, &name_path)
    };
    if errors.is_empty() && !names.insert(listener.name.as_str()) {
        errors.push(FieldError::duplicate(&name_path, &listener.name));
    }

    let port_path = path.child("port");
    let port_errors = format::validate_port(listener.port.into(), &port_path);
    if !port_errors.is_empty() {
        errors.extend(port_errors);
    } else if features.forbidden_listener_ports.contains(&listener.port) {
        errors.push(FieldError::forbidden(
            &port_path,
            format!("port {} is forbidden", listener.port),
        ));
    } else if !ports.insert(listener.port) {
        errors.push(FieldError::duplicate(&port_path, listener.port));
    }

    errors.extend(transport_server::validate_listener_protocol(
        &listener.protocol,
        &path.child("protocol"),
    ));

    errors
}
