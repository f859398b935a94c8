//! NGINX App Protect DoS resources.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appprotectdos.f5.com",
    version = "v1beta1",
    kind = "APDosPolicy",
    namespaced,
    derive = "PartialEq"
)]
pub struct APDosPolicySpec {
    pub mitigation_mode: Option<String>,
    pub signatures: Option<String>,
    pub bad_actors: Option<String>,
    pub automation_tools: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appprotectdos.f5.com",
    version = "v1beta1",
    kind = "APDosLogConf",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct APDosLogConfSpec {
    pub content: Option<Value>,
    pub filter: Option<Value>,
}

/// Enables DoS protection for a VirtualServer, route or Ingress that references it.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appprotectdos.f5.com",
    version = "v1beta1",
    kind = "DosProtectedResource",
    namespaced,
    shortname = "pr",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct DosProtectedResourceSpec {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub name: String,
    pub ap_dos_monitor: Option<ApDosMonitor>,
    #[serde(default)]
    pub dos_access_log_dest: String,

    /// An `APDosPolicy` as `namespace/name` or `name`.
    #[serde(default)]
    pub ap_dos_policy: String,
    pub dos_security_log: Option<DosSecurityLog>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApDosMonitor {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub protocol: String,
    pub timeout: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DosSecurityLog {
    #[serde(default)]
    pub enable: bool,

    /// An `APDosLogConf` as `namespace/name` or `name`.
    #[serde(default)]
    pub ap_dos_log_conf: String,
    #[serde(default)]
    pub dos_log_dest: String,
}

impl APDosPolicySpec {
    pub fn is_empty(&self) -> bool {
        self.mitigation_mode.is_none()
            && self.signatures.is_none()
            && self.bad_actors.is_none()
            && self.automation_tools.is_none()
    }
}
