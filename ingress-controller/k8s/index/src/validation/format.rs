//! Value formats shared by the resource validators.

use super::field::{FieldError, FieldErrors, Path};
use once_cell::sync::Lazy;
use regex::Regex;

const DNS1035_LABEL_FMT: &str = "[a-z]([-a-z0-9]*[a-z0-9])?";
const DNS1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const QUALIFIED_NAME_FMT: &str = "([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]";

const DNS1035_LABEL_MAX_LEN: usize = 63;
const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;
const QUALIFIED_NAME_MAX_LEN: usize = 63;

pub(crate) const PORT_RANGE_MSG: &str = "must be between 1 and 65535, inclusive";

static DNS1035_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{DNS1035_LABEL_FMT}$")).expect("should compile"));

static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{DNS1123_LABEL_FMT}(\.{DNS1123_LABEL_FMT})*$")).expect("should compile")
});

static QUALIFIED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{QUALIFIED_NAME_FMT}$")).expect("should compile"));

static ESCAPED_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^([^"\\]|\\.)*$"#).expect("should compile"));

static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(ms|s|m|h|d|w|M|y)? *)+$").expect("should compile"));

static OFFSET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[kKmMgG]?$").expect("should compile"));

static SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[kKmM]?$").expect("should compile"));

static PROXY_BUFFERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+ \d+[kKmM]?$").expect("should compile"));

static STICKY_SERVICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^serviceName=(\S+)\s+(\S.*)$").expect("should compile"));

static REWRITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^serviceName=(\S+)\s+rewrite=(\S+)$").expect("should compile"));

static HASH_LB_METHOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^hash (\S+)(?: consistent)?$").expect("should compile"));

/// HTTP load balancing methods available in every build.
const HTTP_LB_METHODS: &[&str] = &[
    "round_robin",
    "least_conn",
    "ip_hash",
    "random",
    "random two",
    "random two least_conn",
];

/// HTTP load balancing methods that require NGINX Plus.
const PLUS_HTTP_LB_METHODS: &[&str] = &[
    "least_time header",
    "least_time last_byte",
    "least_time header inflight",
    "least_time last_byte inflight",
    "random least_time=header",
    "random least_time=last_byte",
    "random two least_time=header",
    "random two least_time=last_byte",
];

/// Messages describing why `value` is not a DNS-1035 label.
pub(crate) fn dns1035_label(value: &str) -> Vec<String> {
    let mut msgs = Vec::new();
    if value.len() > DNS1035_LABEL_MAX_LEN {
        msgs.push(format!(
            "must be no more than {DNS1035_LABEL_MAX_LEN} characters"
        ));
    }
    if !DNS1035_LABEL.is_match(value) {
        msgs.push(format!(
            "a DNS-1035 label must consist of lower case alphanumeric characters or '-', start with \
             an alphabetic character, and end with an alphanumeric character (e.g. 'my-name', or \
             'abc-123', regex used for validation is '{DNS1035_LABEL_FMT}')"
        ));
    }
    msgs
}

/// Messages describing why `value` is not a DNS-1123 subdomain.
pub(crate) fn dns1123_subdomain(value: &str) -> Vec<String> {
    let mut msgs = Vec::new();
    if value.len() > DNS1123_SUBDOMAIN_MAX_LEN {
        msgs.push(format!(
            "must be no more than {DNS1123_SUBDOMAIN_MAX_LEN} characters"
        ));
    }
    if !DNS1123_SUBDOMAIN.is_match(value) {
        msgs.push(format!(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' \
             or '.', and must start and end with an alphanumeric character (e.g. 'example.com', \
             regex used for validation is '{DNS1123_LABEL_FMT}(\\.{DNS1123_LABEL_FMT})*')"
        ));
    }
    msgs
}

/// Messages describing why `value` is not a qualified name (an optional DNS subdomain prefix, a
/// slash and a name).
pub(crate) fn qualified_name(value: &str) -> Vec<String> {
    let (prefix, name) = match value.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, value),
    };

    let mut msgs = Vec::new();
    match prefix {
        Some("") => msgs.push("prefix part must be non-empty".to_string()),
        Some(prefix) => msgs.extend(
            dns1123_subdomain(prefix)
                .into_iter()
                .map(|m| format!("prefix part {m}")),
        ),
        None => {}
    }

    if name.is_empty() {
        msgs.push("name part must be non-empty".to_string());
        return msgs;
    }
    if name.len() > QUALIFIED_NAME_MAX_LEN {
        msgs.push(format!(
            "name part must be no more than {QUALIFIED_NAME_MAX_LEN} characters"
        ));
    }
    if !QUALIFIED_NAME.is_match(name) {
        msgs.push(format!(
            "name part must consist of alphanumeric characters, '-', '_' or '.', and must start \
             and end with an alphanumeric character (e.g. 'MyName', or 'my.name', or '123-abc', \
             regex used for validation is '{QUALIFIED_NAME_FMT}')"
        ));
    }
    msgs
}

/// Checks that every `"` is escaped and the value does not end in a lone backslash.
pub(crate) fn escaped_string(value: &str) -> Result<(), String> {
    if ESCAPED_STRING.is_match(value) {
        return Ok(());
    }
    Err(format!(
        "'{value}' must have all '\"' (double quotes) escaped and must not end with an unescaped \
         '\\' (backslash)"
    ))
}

pub(crate) fn is_valid_port(port: i64) -> bool {
    (1..=65535).contains(&port)
}

/// Parses booleans the way the proxy's annotation parser does.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

pub(crate) fn is_time(value: &str) -> bool {
    TIME.is_match(value.trim())
}

pub(crate) fn is_offset(value: &str) -> bool {
    OFFSET.is_match(value.trim())
}

pub(crate) fn is_size(value: &str) -> bool {
    SIZE.is_match(value.trim())
}

pub(crate) fn is_proxy_buffers(value: &str) -> bool {
    PROXY_BUFFERS.is_match(value.trim())
}

pub(crate) fn is_port_list(value: &str) -> bool {
    value.split(',').all(|p| {
        p.trim()
            .parse::<i64>()
            .map(is_valid_port)
            .unwrap_or(false)
    })
}

/// Splits a comma-separated service list.
pub(crate) fn service_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn is_sticky_service_list(value: &str) -> bool {
    list_items(value).all(|item| STICKY_SERVICE.is_match(item))
}

pub(crate) fn is_rewrite_list(value: &str) -> bool {
    list_items(value).all(|item| REWRITE.is_match(item))
}

fn list_items(value: &str) -> impl Iterator<Item = &str> {
    value.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Checks an HTTP load balancing method (`nginx.org/lb-method`, VirtualServer `lb-method`).
pub(crate) fn http_lb_method(method: &str, is_plus: bool) -> Result<(), String> {
    let method = method.trim();
    if method.is_empty()
        || HTTP_LB_METHODS.contains(&method)
        || (is_plus && PLUS_HTTP_LB_METHODS.contains(&method))
        || HASH_LB_METHOD.is_match(method)
    {
        return Ok(());
    }
    Err(format!("Invalid load balancing method: {method:?}"))
}

pub(crate) fn is_hash_lb_method(method: &str) -> bool {
    HASH_LB_METHOD.is_match(method)
}

// === field helpers ===

pub(crate) fn validate_dns1035_label(value: &str, path: &Path) -> FieldErrors {
    if value.is_empty() {
        return FieldError::required(path, "").into();
    }
    dns1035_label(value)
        .into_iter()
        .map(|msg| FieldError::invalid(path, value, msg))
        .collect()
}

pub(crate) fn validate_host(host: &str, path: &Path) -> FieldErrors {
    if host.is_empty() {
        return FieldError::required(path, "").into();
    }
    dns1123_subdomain(host)
        .into_iter()
        .map(|msg| FieldError::invalid(path, host, msg))
        .collect()
}

pub(crate) fn validate_time(value: &str, path: &Path) -> FieldErrors {
    if value.is_empty() || is_time(value) {
        return FieldErrors::default();
    }
    FieldError::invalid(path, value, "must be a time").into()
}

pub(crate) fn validate_non_negative(value: Option<i32>, path: &Path) -> FieldErrors {
    match value {
        Some(n) if n < 0 => FieldError::invalid(path, n, "must be positive").into(),
        _ => FieldErrors::default(),
    }
}

pub(crate) fn validate_port(port: i64, path: &Path) -> FieldErrors {
    if is_valid_port(port) {
        return FieldErrors::default();
    }
    FieldError::Invalid {
        path: path.clone(),
        value: super::field::Value::Int(port),
        detail: PORT_RANGE_MSG.to_string(),
    }
    .into()
}

pub(crate) fn validate_snippet(snippet: &str, path: &Path, snippets_enabled: bool) -> FieldErrors {
    if snippets_enabled || snippet.is_empty() {
        return FieldErrors::default();
    }
    FieldError::forbidden(path, "snippet specified but snippets feature is not enabled").into()
}
