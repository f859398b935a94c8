//! NGINX App Protect WAF resources.
//!
//! The bodies of these resources are owned by the App Protect compiler, so only the fields the
//! controller inspects are typed; everything else is carried as raw JSON.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appprotect.f5.com",
    version = "v1beta1",
    kind = "APPolicy",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct APPolicySpec {
    pub policy: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appprotect.f5.com",
    version = "v1beta1",
    kind = "APLogConf",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct APLogConfSpec {
    pub content: Option<Value>,
    pub filter: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "appprotect.f5.com",
    version = "v1beta1",
    kind = "APUserSig",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct APUserSigSpec {
    pub signatures: Option<Value>,
    pub tag: Option<String>,
    pub revision_datetime: Option<String>,
}
