//! App Protect WAF policies, log configurations and user-defined signatures.
//!
//! Every object is stored, valid or not, so that a resource referencing it can be told why it
//! cannot be used. Policies may require user-defined signatures by tag; a policy is only usable
//! while every requirement is satisfied by a valid signature, so signature events may flip the
//! validity of any number of policies.

use crate::problem::{Object, Problem};
use chrono::{DateTime, Utc};
use nginx_ingress_controller_core::{self as core, ns_name, object_key, wins, Change, KeyWithKind};
use nginx_ingress_controller_k8s_api::{APLogConf, APPolicy, APUserSig, ObjectMeta, ResourceExt};
use serde_json::Value;
use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};


pub const POLICY_KIND: &str = "APPolicy";
pub const LOG_CONF_KIND: &str = "APLogConf";
pub const USER_SIG_KIND: &str = "APUserSig";

pub type AppProtectChange = core::Change<AppProtectResource>;

#[derive(Clone, Debug, PartialEq)]
pub enum AppProtectResource {
    Policy(Arc<APPolicy>),
    LogConf(Arc<APLogConf>),
    UserSig(Arc<APUserSig>),
}

/// The policies a user signature event made usable or unusable, and every signature that is
/// valid afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserSigChange {
    pub policy_deletions: Vec<Arc<APPolicy>>,
    pub policy_adds_or_updates: Vec<Arc<APPolicy>>,
    pub user_sigs: Vec<Arc<APUserSig>>,
}

/// Why a stored object cannot be used.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Invalid {
    #[error("Validation Failed")]
    ValidationFailed,

    #[error("Policy has unsatisfied signature requirements")]
    MissingUserSig,

    #[error("Duplicate tag set")]
    DuplicateTag,

    #[error("Invalid timestamp")]
    InvalidTimestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("Unknown App Protect resource kind {0}")]
    UnknownKind(String),

    #[error("App Protect {kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error(transparent)]
    Invalid(#[from] Invalid),
}

#[derive(Debug, Default)]
pub struct AppProtectConfiguration {
    policies: BTreeMap<String, PolicyEntry>,
    log_confs: BTreeMap<String, LogConfEntry>,
    user_sigs: BTreeMap<String, UserSigEntry>,
}

#[derive(Clone, Debug)]
struct PolicyEntry {
    policy: Arc<APPolicy>,
    requirements: Vec<SignatureRequirement>,
    status: Result<(), Invalid>,
}

#[derive(Clone, Debug)]
struct LogConfEntry {
    log_conf: Arc<APLogConf>,
    status: Result<(), Invalid>,
}

#[derive(Clone, Debug)]
struct UserSigEntry {
    sig: Arc<APUserSig>,
    tag: String,
    revision: Option<DateTime<Utc>>,
    status: Result<(), Invalid>,
}

/// A policy's demand for a user signature with `tag`, optionally bounded by revision time.
#[derive(Clone, Debug, PartialEq, Eq)]
struct SignatureRequirement {
    tag: String,
    min_revision: Option<DateTime<Utc>>,
    max_revision: Option<DateTime<Utc>>,
}

// === impl AppProtectResource ===

impl AppProtectResource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Policy(_) => POLICY_KIND,
            Self::LogConf(_) => LOG_CONF_KIND,
            Self::UserSig(_) => USER_SIG_KIND,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Policy(p) => &p.metadata,
            Self::LogConf(l) => &l.metadata,
            Self::UserSig(s) => &s.metadata,
        }
    }

    fn object(&self) -> Object {
        match self {
            Self::Policy(p) => Object::APPolicy(p.clone()),
            Self::LogConf(l) => Object::APLogConf(l.clone()),
            Self::UserSig(s) => Object::APUserSig(s.clone()),
        }
    }
}

impl KeyWithKind for AppProtectResource {
    fn key_with_kind(&self) -> String {
        ns_name(self.kind(), &object_key(self.meta()))
    }
}

// === impl AppProtectConfiguration ===

impl AppProtectConfiguration {
    pub fn add_or_update_policy(&mut self, policy: APPolicy) -> (Vec<AppProtectChange>, Vec<Problem>) {
        let policy = Arc::new(policy);
        let key = object_key(&policy.metadata);

        let (requirements, status, message) = match signature_requirements(&policy) {
            Ok(requirements) if self.satisfies(&requirements) => (requirements, Ok(()), None),
            Ok(requirements) => {
                let invalid = Invalid::MissingUserSig;
                (requirements, Err(invalid), Some(invalid.to_string()))
            }
            Err((invalid, message)) => (Vec::new(), Err(invalid), Some(message)),
        };
        self.policies.insert(
            key,
            PolicyEntry {
                policy: policy.clone(),
                requirements,
                status,
            },
        );

        let resource = AppProtectResource::Policy(policy);
        match message {
            None => (vec![Change::add_or_update(resource)], Vec::new()),
            Some(message) => reject(resource, message),
        }
    }

    pub fn add_or_update_log_conf(
        &mut self,
        log_conf: APLogConf,
    ) -> (Vec<AppProtectChange>, Vec<Problem>) {
        let log_conf = Arc::new(log_conf);
        let key = object_key(&log_conf.metadata);

        let validation = validate_log_conf(&log_conf);
        self.log_confs.insert(
            key,
            LogConfEntry {
                log_conf: log_conf.clone(),
                status: validation.as_ref().map_err(|_| Invalid::ValidationFailed).copied(),
            },
        );

        let resource = AppProtectResource::LogConf(log_conf);
        match validation {
            Ok(()) => (vec![Change::add_or_update(resource)], Vec::new()),
            Err(message) => reject(resource, message),
        }
    }

    /// Stores a user signature and reconciles every signature tag and policy requirement.
    pub fn add_or_update_user_sig(&mut self, sig: APUserSig) -> (UserSigChange, Vec<Problem>) {
        let entry = UserSigEntry::new(Arc::new(sig));

        let mut problems = Vec::new();
        if let Err(invalid) = entry.status {
            problems.push(Problem::error(
                Object::APUserSig(entry.sig.clone()),
                "Rejected",
                invalid.to_string(),
            ));
        }

        self.user_sigs.insert(object_key(&entry.sig.metadata), entry);
        let change = self.reconcile_user_sigs(&mut problems);
        (change, problems)
    }

    pub fn delete_policy(&mut self, key: &str) -> Vec<AppProtectChange> {
        self.policies
            .remove(key)
            .map(|e| Change::delete(AppProtectResource::Policy(e.policy)))
            .into_iter()
            .collect()
    }

    pub fn delete_log_conf(&mut self, key: &str) -> Vec<AppProtectChange> {
        self.log_confs
            .remove(key)
            .map(|e| Change::delete(AppProtectResource::LogConf(e.log_conf)))
            .into_iter()
            .collect()
    }

    pub fn delete_user_sig(&mut self, key: &str) -> (UserSigChange, Vec<Problem>) {
        if self.user_sigs.remove(key).is_none() {
            return Default::default();
        }
        let mut problems = Vec::new();
        let change = self.reconcile_user_sigs(&mut problems);
        (change, problems)
    }

    /// Looks up a stored object by kind (`APPolicy`, `APLogConf` or `APUserSig`) and
    /// `namespace/name` key, failing when it is missing or invalid.
    pub fn get_app_resource(
        &self,
        kind: &str,
        key: &str,
    ) -> Result<AppProtectResource, LookupError> {
        let not_found = |kind| LookupError::NotFound {
            kind,
            key: key.to_string(),
        };
        match kind {
            POLICY_KIND => {
                let entry = self.policies.get(key).ok_or_else(|| not_found("Policy"))?;
                entry.status?;
                Ok(AppProtectResource::Policy(entry.policy.clone()))
            }
            LOG_CONF_KIND => {
                let entry = self.log_confs.get(key).ok_or_else(|| not_found("LogConf"))?;
                entry.status?;
                Ok(AppProtectResource::LogConf(entry.log_conf.clone()))
            }
            USER_SIG_KIND => {
                let entry = self.user_sigs.get(key).ok_or_else(|| not_found("UserSig"))?;
                entry.status?;
                Ok(AppProtectResource::UserSig(entry.sig.clone()))
            }
            _ => Err(LookupError::UnknownKind(kind.to_string())),
        }
    }

    /// Every requirement must be met by at least one valid signature.
    fn satisfies(&self, requirements: &[SignatureRequirement]) -> bool {
        requirements.iter().all(|req| {
            self.user_sigs
                .values()
                .any(|sig| sig.status.is_ok() && req.is_satisfied_by(sig))
        })
    }

    fn reconcile_user_sigs(&mut self, problems: &mut Vec<Problem>) -> UserSigChange {
        self.reconcile_tags(problems);

        let mut change = UserSigChange::default();
        let verified = self
            .policies
            .iter()
            .map(|(key, entry)| (key.clone(), self.satisfies(&entry.requirements)))
            .collect::<Vec<_>>();
        for (key, satisfied) in verified {
            let Some(entry) = self.policies.get_mut(&key) else {
                continue;
            };
            match entry.status {
                Err(Invalid::MissingUserSig) if satisfied => {
                    entry.status = Ok(());
                    change.policy_adds_or_updates.push(entry.policy.clone());
                }
                Ok(()) if !satisfied => {
                    let invalid = Invalid::MissingUserSig;
                    entry.status = Err(invalid);
                    change.policy_deletions.push(entry.policy.clone());
                    problems.push(Problem::error(
                        Object::APPolicy(entry.policy.clone()),
                        "Rejected",
                        invalid.to_string(),
                    ));
                }
                _ => {}
            }
        }

        change.user_sigs = self
            .user_sigs
            .values()
            .filter(|e| e.status.is_ok())
            .map(|e| e.sig.clone())
            .collect();
        change
    }

    /// Only one signature may carry a tag: the winner among those sharing it becomes valid and
    /// the others are invalidated. Signatures that failed validation take no part.
    fn reconcile_tags(&mut self, problems: &mut Vec<Problem>) {
        let mut by_tag = BTreeMap::<String, Vec<Arc<APUserSig>>>::new();
        for entry in self.user_sigs.values() {
            if entry.tag.is_empty() || entry.status == Err(Invalid::ValidationFailed) {
                continue;
            }
            by_tag
                .entry(entry.tag.clone())
                .or_default()
                .push(entry.sig.clone());
        }

        for mut sigs in by_tag.into_values() {
            sigs.sort_by(|a, b| winner_first(&a.metadata, &b.metadata));
            for (i, sig) in sigs.into_iter().enumerate() {
                let Some(entry) = self.user_sigs.get_mut(&object_key(&sig.metadata)) else {
                    continue;
                };
                if i == 0 {
                    entry.status = Ok(());
                } else if entry.status.is_ok() {
                    let invalid = Invalid::DuplicateTag;
                    entry.status = Err(invalid);
                    problems.push(Problem::error(
                        Object::APUserSig(sig),
                        "Rejected",
                        invalid.to_string(),
                    ));
                }
            }
        }
    }
}

// === impl UserSigEntry ===

impl UserSigEntry {
    fn new(sig: Arc<APUserSig>) -> Self {
        let rejected = |sig, invalid| Self {
            sig,
            tag: String::new(),
            revision: None,
            status: Err(invalid),
        };

        if !matches!(sig.spec.signatures, Some(Value::Array(_))) {
            return rejected(sig, Invalid::ValidationFailed);
        }
        let revision = match sig.spec.revision_datetime.as_deref().map(parse_revision) {
            None => None,
            Some(Ok(revision)) => Some(revision),
            Some(Err(_)) => return rejected(sig, Invalid::InvalidTimestamp),
        };

        Self {
            tag: sig.spec.tag.clone().unwrap_or_default(),
            sig,
            revision,
            status: Ok(()),
        }
    }
}

// === impl SignatureRequirement ===

impl SignatureRequirement {
    /// Entries without a tag do not constrain the policy and yield `None`.
    fn from_value(value: &Value) -> Result<Option<Self>, String> {
        let Some(tag) = value.get("tag").and_then(Value::as_str) else {
            return Ok(None);
        };
        Ok(Some(Self {
            tag: tag.to_string(),
            min_revision: revision_bound(value, "minRevisionDatetime")?,
            max_revision: revision_bound(value, "maxRevisionDatetime")?,
        }))
    }

    fn is_satisfied_by(&self, sig: &UserSigEntry) -> bool {
        if sig.tag.is_empty() || sig.tag != self.tag {
            return false;
        }
        let Some(revision) = sig.revision else {
            return true;
        };
        match (self.min_revision, self.max_revision) {
            (None, None) => true,
            (Some(min), Some(max)) => min < revision && revision < max,
            (Some(min), None) => min < revision,
            (None, Some(max)) => revision < max,
        }
    }
}

/// Checks that a free-form field holds an object.
pub(crate) fn require_object<'v>(
    value: Option<&'v Value>,
    field: &str,
) -> Result<&'v serde_json::Map<String, Value>, String> {
    value
        .and_then(Value::as_object)
        .ok_or_else(|| format!("Required field {field} not found"))
}

fn signature_requirements(
    policy: &APPolicy,
) -> Result<Vec<SignatureRequirement>, (Invalid, String)> {
    let name = policy.name_any();
    let body = require_object(policy.spec.policy.as_ref(), "spec.policy").map_err(|e| {
        (
            Invalid::ValidationFailed,
            format!("Error validating App Protect Policy {name}: {e}"),
        )
    })?;

    let Some(requirements) = body.get("signature-requirements") else {
        return Ok(Vec::new());
    };
    let Some(requirements) = requirements.as_array() else {
        return Err((
            Invalid::ValidationFailed,
            format!(
                "Error retrieving Signature requirements from {name}: \
                 spec.policy.signature-requirements must be a list"
            ),
        ));
    };

    requirements
        .iter()
        .filter_map(|r| SignatureRequirement::from_value(r).transpose())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            (
                Invalid::InvalidTimestamp,
                format!("Error creating time requirements from {name}: {e}"),
            )
        })
}

fn validate_log_conf(log_conf: &APLogConf) -> Result<(), String> {
    let name = log_conf.name_any();
    require_object(log_conf.spec.content.as_ref(), "spec.content")
        .and_then(|_| require_object(log_conf.spec.filter.as_ref(), "spec.filter"))
        .map(|_| ())
        .map_err(|e| format!("Error validating App Protect Log Configuration {name}: {e}"))
}

fn revision_bound(requirement: &Value, field: &str) -> Result<Option<DateTime<Utc>>, String> {
    let Some(value) = requirement.get(field).and_then(Value::as_str) else {
        return Ok(None);
    };
    parse_revision(value)
        .map(Some)
        .map_err(|e| format!("invalid {field} {value:?}: {e}"))
}

fn parse_revision(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|t| t.with_timezone(&Utc))
}

/// Orders the winner of a contested tag first.
fn winner_first(a: &ObjectMeta, b: &ObjectMeta) -> Ordering {
    if wins(a, b) {
        Ordering::Less
    } else if wins(b, a) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

fn reject(resource: AppProtectResource, message: String) -> (Vec<AppProtectChange>, Vec<Problem>) {
    let problem = Problem::error(resource.object(), "Rejected", message.clone());
    let mut change = Change::delete(resource);
    change.error = Some(message);
    (vec![change], vec![problem])
}
