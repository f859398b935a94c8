use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The name of the built-in listener used by TLS passthrough TransportServers.
pub const TLS_PASSTHROUGH_LISTENER_NAME: &str = "tls-passthrough";

/// The protocol of the built-in TLS passthrough listener.
pub const TLS_PASSTHROUGH_LISTENER_PROTOCOL: &str = "TLS_PASSTHROUGH";

/// Describes TCP, UDP or TLS passthrough load balancing.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "k8s.nginx.org",
    version = "v1alpha1",
    kind = "TransportServer",
    namespaced,
    shortname = "ts",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerSpec {
    #[serde(default)]
    pub ingress_class_name: String,
    pub listener: TransportServerListener,
    #[serde(default)]
    pub server_snippets: String,
    #[serde(default)]
    pub stream_snippets: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    pub upstream_parameters: Option<UpstreamParameters>,
    pub session_parameters: Option<SessionParameters>,
    pub action: Option<Action>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerListener {
    pub name: String,
    pub protocol: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    pub name: String,
    pub service: String,
    pub port: i32,
    #[serde(default)]
    pub fail_timeout: String,
    pub max_fails: Option<i32>,
    pub max_conns: Option<i32>,
    #[serde(default)]
    pub load_balancing_method: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamParameters {
    pub udp_requests: Option<i32>,
    pub udp_responses: Option<i32>,
    #[serde(default)]
    pub connect_timeout: String,
    #[serde(default)]
    pub next_upstream: bool,
    #[serde(default)]
    pub next_upstream_timeout: String,
    #[serde(default)]
    pub next_upstream_tries: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionParameters {
    #[serde(default)]
    pub timeout: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default)]
    pub pass: String,
}

impl TransportServerListener {
    /// True for listeners that look like the built-in TLS passthrough listener, by name or protocol.
    pub fn is_tls_passthrough(&self) -> bool {
        self.name == TLS_PASSTHROUGH_LISTENER_NAME
            || self.protocol == TLS_PASSTHROUGH_LISTENER_PROTOCOL
    }
}
