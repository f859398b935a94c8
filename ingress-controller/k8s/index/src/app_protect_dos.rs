//! App Protect DoS policies, log configurations and protected resources.
//!
//! A `DosProtectedResource` may reference a policy and a log configuration by `name` or
//! `namespace/name`. Whenever a policy or log configuration changes, every protected resource that
//! references it is evaluated again.

use crate::{
    app_protect::require_object,
    problem::{Object, Problem},
    validation::{
        field::{FieldError, Path},
        format,
    },
};
use nginx_ingress_controller_core::{
    self as core, ns_name, object_key, qualify, Change, KeyWithKind,
};
use nginx_ingress_controller_k8s_api::{
    app_protect_dos::ApDosMonitor, APDosLogConf, APDosPolicy, DosProtectedResource, ObjectMeta,
    ResourceExt,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::BTreeMap, sync::Arc};

#[cfg(test)]
mod tests;

const MAX_NAME_LEN: usize = 63;

const MONITOR_PROTOCOLS: &[&str] = &["grpc", "http1", "http2"];

static LOG_DEST_DNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9-]{1,62}\.)([A-Za-z0-9-]{1,63}\.)*[A-Za-z]{2,6}:\d{1,5}$")
        .expect("should compile")
});

static LOG_DEST_IP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}:\d{1,5}$").expect("should compile"));

static LOG_DEST_LOCALHOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^localhost:\d{1,5}$").expect("should compile"));

pub type DosChange = core::Change<DosResource>;

#[derive(Clone, Debug, PartialEq)]
pub enum DosResource {
    Policy(Arc<APDosPolicy>),
    LogConf(Arc<APDosLogConf>),
    Protected(Arc<DosProtectedResource>),
}

/// A valid protected resource joined with the policy and log configuration it references.
#[derive(Clone, Debug, PartialEq)]
pub struct DosEx {
    pub dos_protected: Arc<DosProtectedResource>,
    pub dos_policy: Option<Arc<APDosPolicy>>,
    pub dos_log_conf: Option<Arc<APDosLogConf>>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DosError {
    #[error("DosProtectedResource is referenced but Dos feature is not enabled. resource: {0}")]
    Disabled(String),

    #[error("DosProtectedResource {0} not found")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("DosProtectedResource references a missing DosPolicy: {0}")]
    MissingPolicy(String),

    #[error("DosProtectedResource references a missing DosLogConf: {0}")]
    MissingLogConf(String),
}

#[derive(Debug, Default)]
pub struct DosConfiguration {
    policies: BTreeMap<String, Entry<APDosPolicy>>,
    log_confs: BTreeMap<String, Entry<APDosLogConf>>,
    protected: BTreeMap<String, Entry<DosProtectedResource>>,
    is_dos_enabled: bool,
}

/// A stored object and, when it failed validation, the reason it cannot be used.
#[derive(Debug)]
struct Entry<T> {
    object: Arc<T>,
    error: Option<String>,
}

// === impl DosResource ===

impl DosResource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Policy(_) => "APDosPolicy",
            Self::LogConf(_) => "APDosLogConf",
            Self::Protected(_) => "DosProtectedResource",
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Policy(p) => &p.metadata,
            Self::LogConf(l) => &l.metadata,
            Self::Protected(p) => &p.metadata,
        }
    }

    fn object(&self) -> Object {
        match self {
            Self::Policy(p) => Object::APDosPolicy(p.clone()),
            Self::LogConf(l) => Object::APDosLogConf(l.clone()),
            Self::Protected(p) => Object::DosProtectedResource(p.clone()),
        }
    }
}

impl KeyWithKind for DosResource {
    fn key_with_kind(&self) -> String {
        ns_name(self.kind(), &object_key(self.meta()))
    }
}

// === impl Entry ===

impl<T> Entry<T> {
    fn new(object: Arc<T>, validation: &Result<(), String>, stored_as: &str) -> Self {
        Self {
            object,
            error: validation
                .as_ref()
                .err()
                .map(|e| format!("failed to store {stored_as}: {e}")),
        }
    }

    fn valid(&self) -> Result<Arc<T>, String> {
        match &self.error {
            None => Ok(self.object.clone()),
            Some(error) => Err(error.clone()),
        }
    }
}

// === impl DosConfiguration ===

impl DosConfiguration {
    pub fn new(is_dos_enabled: bool) -> Self {
        Self {
            is_dos_enabled,
            ..Default::default()
        }
    }

    pub fn add_or_update_policy(&mut self, policy: APDosPolicy) -> (Vec<DosChange>, Vec<Problem>) {
        let policy = Arc::new(policy);
        let key = object_key(&policy.metadata);

        let validation = validate_policy(&policy);
        self.policies.insert(
            key.clone(),
            Entry::new(policy.clone(), &validation, "ApDosPolicy"),
        );

        let (mut changes, mut problems) = match validation {
            Ok(()) => Default::default(),
            Err(message) => reject(DosResource::Policy(policy), message),
        };
        for protected in self.protected_referencing_policy(&key) {
            let (c, p) = self.evaluate_protected(protected);
            changes.extend(c);
            problems.extend(p);
        }
        (changes, problems)
    }

    pub fn add_or_update_log_conf(
        &mut self,
        log_conf: APDosLogConf,
    ) -> (Vec<DosChange>, Vec<Problem>) {
        let log_conf = Arc::new(log_conf);
        let key = object_key(&log_conf.metadata);

        let validation = validate_log_conf(&log_conf);
        self.log_confs.insert(
            key.clone(),
            Entry::new(log_conf.clone(), &validation, "ApDosLogconf"),
        );

        let (mut changes, mut problems) = match validation {
            Ok(()) => Default::default(),
            Err(message) => reject(DosResource::LogConf(log_conf), message),
        };
        for protected in self.protected_referencing_log_conf(&key) {
            let (c, p) = self.evaluate_protected(protected);
            changes.extend(c);
            problems.extend(p);
        }
        (changes, problems)
    }

    pub fn add_or_update_protected_resource(
        &mut self,
        protected: DosProtectedResource,
    ) -> (Vec<DosChange>, Vec<Problem>) {
        self.evaluate_protected(Arc::new(protected))
    }

    pub fn delete_policy(&mut self, key: &str) -> (Vec<DosChange>, Vec<Problem>) {
        let mut changes = self
            .policies
            .remove(key)
            .map(|e| Change::delete(DosResource::Policy(e.object)))
            .into_iter()
            .collect::<Vec<_>>();
        let mut problems = Vec::new();
        for protected in self.protected_referencing_policy(key) {
            let (c, p) = self.evaluate_protected(protected);
            changes.extend(c);
            problems.extend(p);
        }
        (changes, problems)
    }

    pub fn delete_log_conf(&mut self, key: &str) -> (Vec<DosChange>, Vec<Problem>) {
        let mut changes = self
            .log_confs
            .remove(key)
            .map(|e| Change::delete(DosResource::LogConf(e.object)))
            .into_iter()
            .collect::<Vec<_>>();
        let mut problems = Vec::new();
        for protected in self.protected_referencing_log_conf(key) {
            let (c, p) = self.evaluate_protected(protected);
            changes.extend(c);
            problems.extend(p);
        }
        (changes, problems)
    }

    pub fn delete_protected_resource(&mut self, key: &str) -> Vec<DosChange> {
        self.protected
            .remove(key)
            .map(|e| Change::delete(DosResource::Protected(e.object)))
            .into_iter()
            .collect()
    }

    /// Resolves a reference to a protected resource, made from an object in `parent_namespace`,
    /// into the protected resource and the policy and log configuration it references.
    pub fn get_valid_dos_ex(
        &self,
        parent_namespace: &str,
        reference: &str,
    ) -> Result<DosEx, DosError> {
        let key = qualify(parent_namespace, reference);
        if !self.is_dos_enabled {
            return Err(DosError::Disabled(key));
        }

        let entry = self
            .protected
            .get(&key)
            .ok_or_else(|| DosError::NotFound(key.clone()))?;
        let dos_protected = entry.valid().map_err(DosError::Invalid)?;

        let namespace = dos_protected.namespace().unwrap_or_default();
        let dos_policy = match policy_reference(&dos_protected) {
            Some(reference) => Some(
                self.valid_policy(&qualify(&namespace, reference))
                    .map_err(DosError::MissingPolicy)?,
            ),
            None => None,
        };
        let dos_log_conf = match log_conf_reference(&dos_protected) {
            Some(reference) => Some(
                self.valid_log_conf(&qualify(&namespace, reference))
                    .map_err(DosError::MissingLogConf)?,
            ),
            None => None,
        };

        Ok(DosEx {
            dos_protected,
            dos_policy,
            dos_log_conf,
        })
    }

    /// Protected resources referencing the policy with the given `namespace/name` key.
    pub fn protected_referencing_policy(&self, key: &str) -> Vec<Arc<DosProtectedResource>> {
        self.protected_referencing(key, policy_reference)
    }

    /// Protected resources referencing the log configuration with the given `namespace/name` key.
    pub fn protected_referencing_log_conf(&self, key: &str) -> Vec<Arc<DosProtectedResource>> {
        self.protected_referencing(key, log_conf_reference)
    }

    fn protected_referencing(
        &self,
        key: &str,
        reference: fn(&DosProtectedResource) -> Option<&str>,
    ) -> Vec<Arc<DosProtectedResource>> {
        self.protected
            .values()
            .filter(|e| {
                let namespace = e.object.namespace().unwrap_or_default();
                reference(&e.object).map_or(false, |r| qualify(&namespace, r) == key)
            })
            .map(|e| e.object.clone())
            .collect()
    }

    /// Stores a protected resource and checks that what it references is usable.
    ///
    /// A protected resource with an unusable reference stays valid in the store; it is removed
    /// from the rendered configuration until the reference is fixed.
    fn evaluate_protected(
        &mut self,
        protected: Arc<DosProtectedResource>,
    ) -> (Vec<DosChange>, Vec<Problem>) {
        let key = object_key(&protected.metadata);
        let validation = validate_protected_resource(&protected);
        self.protected.insert(
            key,
            Entry::new(protected.clone(), &validation, "DosProtectedResource"),
        );
        if let Err(message) = validation {
            return reject(DosResource::Protected(protected), message);
        }

        let namespace = protected.namespace().unwrap_or_default();
        if let Some(reference) = policy_reference(&protected) {
            let reference = qualify(&namespace, reference);
            if let Err(error) = self.valid_policy(&reference) {
                let message =
                    format!("dos protected refers ({reference}) to an invalid DosPolicy: {error}");
                return reject(DosResource::Protected(protected), message);
            }
        }
        if let Some(reference) = log_conf_reference(&protected) {
            let reference = qualify(&namespace, reference);
            if let Err(error) = self.valid_log_conf(&reference) {
                let message =
                    format!("dos protected refers ({reference}) to an invalid DosLogConf: {error}");
                return reject(DosResource::Protected(protected), message);
            }
        }

        (
            vec![Change::add_or_update(DosResource::Protected(protected))],
            Vec::new(),
        )
    }

    fn valid_policy(&self, key: &str) -> Result<Arc<APDosPolicy>, String> {
        self.policies
            .get(key)
            .ok_or_else(|| format!("DosPolicy {key} not found"))?
            .valid()
    }

    fn valid_log_conf(&self, key: &str) -> Result<Arc<APDosLogConf>, String> {
        self.log_confs
            .get(key)
            .ok_or_else(|| format!("DosLogConf {key} not found"))?
            .valid()
    }
}

fn policy_reference(protected: &DosProtectedResource) -> Option<&str> {
    Some(protected.spec.ap_dos_policy.as_str()).filter(|r| !r.is_empty())
}

fn log_conf_reference(protected: &DosProtectedResource) -> Option<&str> {
    protected
        .spec
        .dos_security_log
        .as_ref()
        .map(|l| l.ap_dos_log_conf.as_str())
        .filter(|r| !r.is_empty())
}

fn validate_policy(policy: &APDosPolicy) -> Result<(), String> {
    if policy.spec.is_empty() {
        let name = policy.name_any();
        return Err(format!(
            "error validating DosPolicy {name}: Required field spec not found"
        ));
    }
    Ok(())
}

fn validate_log_conf(log_conf: &APDosLogConf) -> Result<(), String> {
    let name = log_conf.name_any();
    require_object(log_conf.spec.content.as_ref(), "spec.content")
        .and_then(|_| require_object(log_conf.spec.filter.as_ref(), "spec.filter"))
        .map(|_| ())
        .map_err(|e| format!("error validating App Protect Dos Log Configuration {name}: {e}"))
}

/// Checks the fields of a protected resource in order, reporting the first failure.
fn validate_protected_resource(protected: &DosProtectedResource) -> Result<(), String> {
    let name = protected.name_any();
    let spec = &protected.spec;
    let missing = |field| {
        format!("error validating DosProtectedResource: {name} missing value for field: {field}")
    };
    let invalid = |field, err: String| {
        format!("error validating DosProtectedResource: {name} invalid field: {field} err: {err}")
    };

    if spec.name.is_empty() {
        return Err(missing("name"));
    }
    validate_name(&spec.name).map_err(|e| invalid("name", e))?;

    if let Some(monitor) = &spec.ap_dos_monitor {
        validate_monitor(monitor).map_err(|e| invalid("apDosMonitor", e))?;
    }

    if spec.dos_access_log_dest.is_empty() {
        return Err(missing("dosAccessLogDest"));
    }
    validate_log_dest(&spec.dos_access_log_dest).map_err(|e| invalid("dosAccessLogDest", e))?;

    if !spec.ap_dos_policy.is_empty() {
        validate_reference(&spec.ap_dos_policy).map_err(|e| invalid("apDosPolicy", e))?;
    }

    if let Some(log) = &spec.dos_security_log {
        validate_log_dest(&log.dos_log_dest)
            .map_err(|e| invalid("dosSecurityLog/dosLogDest", e))?;
        validate_reference(&log.ap_dos_log_conf)
            .map_err(|e| invalid("dosSecurityLog/apDosLogConf", e))?;
    }

    Ok(())
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.len() > MAX_NAME_LEN {
        return Err(format!("app Protect Dos Name max length is {MAX_NAME_LEN}"));
    }
    format::escaped_string(name)
}

fn validate_monitor(monitor: &ApDosMonitor) -> Result<(), String> {
    format::escaped_string(&monitor.uri)?;
    if !monitor.protocol.is_empty() && !MONITOR_PROTOCOLS.contains(&monitor.protocol.as_str()) {
        let error = FieldError::not_supported(
            &Path::new("dosMonitorProtocol"),
            &monitor.protocol,
            MONITOR_PROTOCOLS,
        );
        return Err(format!("app Protect Dos Monitor Protocol must be: {error}"));
    }
    Ok(())
}

/// A log destination is `<ip-address | localhost | dns name>:<port>` or `stderr`.
fn validate_log_dest(dest: &str) -> Result<(), String> {
    if LOG_DEST_IP.is_match(dest)
        || LOG_DEST_DNS.is_match(dest)
        || LOG_DEST_LOCALHOST.is_match(dest)
    {
        let port = dest
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse::<i64>().ok())
            .unwrap_or_default();
        if !format::is_valid_port(port) {
            return Err(format!(
                "invalid log destination: error parsing port: {port} not a valid port number"
            ));
        }
        return Ok(());
    }
    if dest == "stderr" {
        return Ok(());
    }
    Err(format!(
        "invalid log destination: {dest}, must follow format: \
         <ip-address | localhost | dns name>:<port> or stderr"
    ))
}

fn validate_reference(reference: &str) -> Result<(), String> {
    if !format::qualified_name(reference).is_empty() {
        return Err(format!("reference name is invalid: {reference}"));
    }
    Ok(())
}

fn reject(resource: DosResource, message: String) -> (Vec<DosChange>, Vec<Problem>) {
    let problem = Problem::error(resource.object(), "Rejected", message.clone());
    let mut change = Change::delete(resource);
    change.error = Some(message);
    (vec![change], vec![problem])
}
