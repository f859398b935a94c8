use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configures a single feature (access control, rate limiting, authentication, mTLS) that
/// VirtualServers and VirtualServerRoutes may reference.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "k8s.nginx.org",
    version = "v1",
    kind = "Policy",
    namespaced,
    shortname = "pol",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub ingress_class_name: String,
    pub access_control: Option<AccessControl>,
    pub rate_limit: Option<RateLimit>,
    pub jwt: Option<JwtAuth>,
    #[serde(rename = "ingressMTLS")]
    pub ingress_mtls: Option<IngressMtls>,
    #[serde(rename = "egressMTLS")]
    pub egress_mtls: Option<EgressMtls>,
    pub oidc: Option<Oidc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessControl {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub rate: String,
    pub key: String,
    #[serde(default)]
    pub zone_size: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JwtAuth {
    #[serde(default)]
    pub realm: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressMtls {
    #[serde(default)]
    pub client_cert_secret: String,
    #[serde(default)]
    pub verify_client: String,
    pub verify_depth: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EgressMtls {
    #[serde(default)]
    pub tls_secret: String,
    #[serde(default)]
    pub trusted_cert_secret: String,
    #[serde(default)]
    pub verify_server: bool,
    #[serde(default)]
    pub ssl_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Oidc {
    #[serde(default)]
    pub auth_endpoint: String,
    #[serde(default)]
    pub token_endpoint: String,
    #[serde(default)]
    pub jwks_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scope: String,
}

impl PolicySpec {
    /// Names of the secrets, in the policy's own namespace, that this policy reads.
    pub fn secret_names(&self) -> impl Iterator<Item = &str> {
        let jwt = self.jwt.iter().map(|j| j.secret.as_str());
        let ingress_mtls = self
            .ingress_mtls
            .iter()
            .map(|m| m.client_cert_secret.as_str());
        let egress_mtls = self.egress_mtls.iter().flat_map(|m| {
            [m.tls_secret.as_str(), m.trusted_cert_secret.as_str()].into_iter()
        });
        let oidc = self.oidc.iter().map(|o| o.client_secret.as_str());
        jwt.chain(ingress_mtls)
            .chain(egress_mtls)
            .chain(oidc)
            .filter(|name| !name.is_empty())
    }
}
