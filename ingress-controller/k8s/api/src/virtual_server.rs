use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Describes the HTTP load balancing of a single host.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "k8s.nginx.org",
    version = "v1",
    kind = "VirtualServer",
    namespaced,
    shortname = "vs",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerSpec {
    #[serde(default)]
    pub ingress_class_name: String,
    #[serde(default)]
    pub host: String,
    pub tls: Option<Tls>,
    #[serde(default)]
    pub policies: Vec<PolicyReference>,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub dos: String,
    #[serde(default, rename = "server-snippets")]
    pub server_snippets: String,
    #[serde(default, rename = "http-snippets")]
    pub http_snippets: String,
}

/// Contributes subroutes under a path prefix of a VirtualServer host.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "k8s.nginx.org",
    version = "v1",
    kind = "VirtualServerRoute",
    namespaced,
    shortname = "vsr",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerRouteSpec {
    #[serde(default)]
    pub ingress_class_name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub subroutes: Vec<Route>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    #[serde(default)]
    pub secret: String,
}

/// References a `Policy`, defaulting to the namespace of the referencing resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReference {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    pub name: String,
    pub service: String,
    pub port: u16,
    #[serde(default, rename = "use-cluster-ip")]
    pub use_cluster_ip: bool,
    #[serde(default, rename = "lb-method")]
    pub lb_method: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub path: String,

    /// Delegates the path to a `VirtualServerRoute`, as `namespace/name` or `name`.
    #[serde(default)]
    pub route: String,
    pub action: Option<Action>,
    #[serde(default)]
    pub policies: Vec<PolicyReference>,
    #[serde(default)]
    pub dos: String,
    #[serde(default, rename = "location-snippets")]
    pub location_snippets: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default)]
    pub pass: String,
    pub redirect: Option<ActionRedirect>,
    #[serde(rename = "return")]
    pub respond: Option<ActionReturn>,
    pub proxy: Option<ActionProxy>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionRedirect {
    pub url: String,
    pub code: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionReturn {
    pub code: Option<i32>,
    #[serde(default, rename = "type")]
    pub content_type: String,
    pub body: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionProxy {
    pub upstream: String,
}

impl Action {
    /// The number of mutually exclusive action kinds that are set.
    pub fn kinds(&self) -> usize {
        usize::from(!self.pass.is_empty())
            + usize::from(self.redirect.is_some())
            + usize::from(self.respond.is_some())
            + usize::from(self.proxy.is_some())
    }
}
