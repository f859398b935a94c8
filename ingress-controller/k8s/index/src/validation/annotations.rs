//! Ingress annotation checks.
//!
//! Every known annotation has an ordered list of rules. Rules are applied in order and the first
//! failing rule stops the checks for that annotation. Annotations are visited in name order so
//! that the reported errors are stable.

use super::{
    field::{FieldError, FieldErrors, Path},
    format, Features,
};
use std::collections::{BTreeMap, BTreeSet};

pub const MERGEABLE_INGRESS_TYPE: &str = "nginx.org/mergeable-ingress-type";
pub const JWT_KEY: &str = "nginx.com/jwt-key";
pub const APP_PROTECT_POLICY: &str = "appprotect.f5.com/app-protect-policy";
pub const APP_PROTECT_SECURITY_LOG: &str = "appprotect.f5.com/app-protect-security-log";
pub const APP_PROTECT_DOS_RESOURCE: &str = "appprotectdos.f5.com/app-protect-dos-resource";

const HEALTH_CHECKS: &str = "nginx.com/health-checks";
const HEALTH_CHECKS_MANDATORY: &str = "nginx.com/health-checks-mandatory";
const HSTS: &str = "nginx.org/hsts";

#[derive(Copy, Clone, Debug)]
enum Rule {
    Required,
    Bool,
    Int,
    Int64,
    Uint64,
    Time,
    Offset,
    Size,
    ProxyBuffers,
    PortList,
    ServiceList,
    StickyServiceList,
    RewriteList,
    PlusOnly,
    AppProtectOnly,
    AppProtectDosOnly,
    InternalRoutesOnly,
    Snippets,
    MergeableType,
    LbMethod,
    ServerTokens,
    QualifiedName,
    Related(&'static str, Expect),
}

#[derive(Copy, Clone, Debug)]
enum Expect {
    IsBool,
    IsTrue,
}

struct Context<'a> {
    annotations: &'a BTreeMap<String, String>,
    services: &'a BTreeSet<String>,
    features: &'a Features,
    path: Path,
    value: &'a str,
}

/// The rules of each annotation, sorted by annotation name.
static RULES: &[(&str, &[Rule])] = {
    use Rule::*;
    &[
        (
            APP_PROTECT_POLICY,
            &[AppProtectOnly, Required],
        ),
        (
            "appprotect.f5.com/app-protect-enable",
            &[AppProtectOnly, Required, Bool],
        ),
        (
            APP_PROTECT_SECURITY_LOG,
            &[AppProtectOnly, Required],
        ),
        (
            "appprotect.f5.com/app-protect-security-log-enable",
            &[AppProtectOnly, Required, Bool],
        ),
        (
            APP_PROTECT_DOS_RESOURCE,
            &[AppProtectDosOnly, PlusOnly, QualifiedName],
        ),
        ("ingress.kubernetes.io/ssl-redirect", &[Required, Bool]),
        (HEALTH_CHECKS, &[PlusOnly, Required, Bool]),
        (
            HEALTH_CHECKS_MANDATORY,
            &[
                PlusOnly,
                Related(HEALTH_CHECKS, Expect::IsTrue),
                Required,
                Bool,
            ],
        ),
        (
            "nginx.com/health-checks-mandatory-queue",
            &[
                PlusOnly,
                Related(HEALTH_CHECKS_MANDATORY, Expect::IsTrue),
                Required,
                Uint64,
            ],
        ),
        ("nginx.com/jwt-key", &[PlusOnly]),
        ("nginx.com/jwt-login-url", &[PlusOnly]),
        ("nginx.com/jwt-realm", &[PlusOnly]),
        ("nginx.com/jwt-token", &[PlusOnly]),
        ("nginx.com/slow-start", &[PlusOnly, Required, Time]),
        (
            "nginx.com/sticky-cookie-services",
            &[PlusOnly, Required, StickyServiceList],
        ),
        ("nginx.org/client-max-body-size", &[Required, Offset]),
        ("nginx.org/fail-timeout", &[Required, Time]),
        ("nginx.org/grpc-services", &[Required, ServiceList]),
        (HSTS, &[Required, Bool]),
        (
            "nginx.org/hsts-behind-proxy",
            &[Related(HSTS, Expect::IsBool), Required, Bool],
        ),
        (
            "nginx.org/hsts-include-subdomains",
            &[Related(HSTS, Expect::IsBool), Required, Bool],
        ),
        (
            "nginx.org/hsts-max-age",
            &[Related(HSTS, Expect::IsBool), Required, Int64],
        ),
        ("nginx.org/keepalive", &[Required, Int]),
        ("nginx.org/lb-method", &[Required, LbMethod]),
        ("nginx.org/listen-ports", &[Required, PortList]),
        ("nginx.org/listen-ports-ssl", &[Required, PortList]),
        ("nginx.org/location-snippets", &[Snippets]),
        ("nginx.org/max-conns", &[Required, Uint64]),
        ("nginx.org/max-fails", &[Required, Uint64]),
        (MERGEABLE_INGRESS_TYPE, &[Required, MergeableType]),
        ("nginx.org/proxy-buffer-size", &[Required, Size]),
        ("nginx.org/proxy-buffering", &[Required, Bool]),
        ("nginx.org/proxy-buffers", &[Required, ProxyBuffers]),
        ("nginx.org/proxy-connect-timeout", &[Required, Time]),
        ("nginx.org/proxy-hide-headers", &[]),
        ("nginx.org/proxy-max-temp-file-size", &[Required, Size]),
        ("nginx.org/proxy-pass-headers", &[]),
        ("nginx.org/proxy-read-timeout", &[Required, Time]),
        ("nginx.org/proxy-send-timeout", &[Required, Time]),
        ("nginx.org/redirect-to-https", &[Required, Bool]),
        ("nginx.org/rewrites", &[Required, RewriteList]),
        ("nginx.org/server-snippets", &[Snippets]),
        ("nginx.org/server-tokens", &[ServerTokens]),
        ("nginx.org/ssl-services", &[Required, ServiceList]),
        ("nginx.org/upstream-zone-size", &[Required, Size]),
        ("nginx.org/websocket-services", &[Required, ServiceList]),
        ("nsm.nginx.com/internal-route", &[InternalRoutesOnly, Required, Bool]),
    ]
};

/// Validates the annotations of an Ingress. `services` holds the names of the services its spec
/// routes to.
pub(super) fn validate(
    annotations: &BTreeMap<String, String>,
    services: &BTreeSet<String>,
    features: &Features,
    path: &Path,
) -> FieldErrors {
    let mut errors = FieldErrors::default();
    let mut names = RULES.iter().collect::<Vec<_>>();
    names.sort_by_key(|(name, _)| *name);

    for (name, rules) in names {
        let Some(value) = annotations.get(*name) else {
            continue;
        };
        let cx = Context {
            annotations,
            services,
            features,
            path: path.child(name),
            value,
        };
        if let Some(error) = rules.iter().find_map(|rule| rule.check(&cx)) {
            errors.push(error);
        }
    }

    errors
}

// === impl Rule ===

impl Rule {
    fn check(&self, cx: &Context<'_>) -> Option<FieldError> {
        let invalid = |msg: &str| Some(FieldError::invalid(&cx.path, cx.value, msg));
        let forbidden = |msg: &str| Some(FieldError::forbidden(&cx.path, msg));
        let value = cx.value;

        match self {
            Self::Required if value.is_empty() => Some(FieldError::required(&cx.path, "")),
            Self::Bool if format::parse_bool(value).is_none() => invalid("must be a boolean"),
            Self::Int if value.parse::<i32>().is_err() => invalid("must be an integer"),
            Self::Int64 if value.parse::<i64>().is_err() => invalid("must be an integer"),
            Self::Uint64 if value.parse::<u64>().is_err() => {
                invalid("must be a non-negative integer")
            }
            Self::Time if !format::is_time(value) => invalid("must be a time"),
            Self::Offset if !format::is_offset(value) => invalid("must be an offset"),
            Self::Size if !format::is_size(value) => invalid("must be a size"),
            Self::ProxyBuffers if !format::is_proxy_buffers(value) => {
                invalid("must be a proxy buffer spec")
            }
            Self::PortList if !format::is_port_list(value) => {
                invalid("must be a comma-separated list of port numbers")
            }
            Self::ServiceList => {
                let unknown = format::service_list(value)
                    .filter(|svc| !cx.services.contains(*svc))
                    .collect::<BTreeSet<_>>();
                if unknown.is_empty() {
                    return None;
                }
                let unknown = unknown.into_iter().collect::<Vec<_>>().join(",");
                invalid(&format!(
                    "must be a comma-separated list of services. The following services were not \
                     found: {unknown}"
                ))
            }
            Self::StickyServiceList if !format::is_sticky_service_list(value) => {
                invalid("must be a semicolon-separated list of sticky services")
            }
            Self::RewriteList if !format::is_rewrite_list(value) => {
                invalid("must be a semicolon-separated list of rewrites")
            }
            Self::PlusOnly if !cx.features.is_plus => forbidden("annotation requires NGINX Plus"),
            Self::AppProtectOnly if !cx.features.app_protect_enabled => {
                forbidden("annotation requires AppProtect")
            }
            Self::AppProtectDosOnly if !cx.features.app_protect_dos_enabled => {
                forbidden("annotation requires AppProtectDos")
            }
            Self::InternalRoutesOnly if !cx.features.internal_routes_enabled => {
                forbidden("annotation requires Internal Routes enabled")
            }
            Self::Snippets if !cx.features.snippets_enabled => {
                forbidden("snippet specified but snippets feature is not enabled")
            }
            Self::MergeableType if value != "master" && value != "minion" => {
                invalid("must be one of: 'master' or 'minion'")
            }
            Self::LbMethod => format::http_lb_method(value, cx.features.is_plus)
                .err()
                .and_then(|msg| invalid(&msg)),
            Self::ServerTokens
                if !cx.features.is_plus && format::parse_bool(value).is_none() =>
            {
                invalid("must be a boolean")
            }
            Self::QualifiedName if !format::qualified_name(value).is_empty() => {
                invalid("must be a qualified name")
            }
            Self::Related(name, check) => {
                let Some(related) = cx.annotations.get(*name) else {
                    return forbidden(&format!("related annotation {name}: must be set"));
                };
                let msg = match (check, format::parse_bool(related)) {
                    (_, None) => format!("related annotation {name}: must be a boolean"),
                    (Expect::IsTrue, Some(false)) => {
                        format!("related annotation {name}: must be true")
                    }
                    _ => return None,
                };
                forbidden(&msg)
            }
            _ => None,
        }
    }
}
