use super::*;
use nginx_ingress_controller_core::Op;
use nginx_ingress_controller_k8s_api::app_protect_dos::{
    APDosLogConfSpec, APDosPolicySpec, DosProtectedResourceSpec, DosSecurityLog,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn mk_meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn mk_policy(namespace: &str, name: &str) -> APDosPolicy {
    APDosPolicy {
        metadata: mk_meta(namespace, name),
        spec: APDosPolicySpec {
            mitigation_mode: Some("standard".to_string()),
            ..Default::default()
        },
    }
}

fn mk_log_conf(namespace: &str, name: &str) -> APDosLogConf {
    APDosLogConf {
        metadata: mk_meta(namespace, name),
        spec: APDosLogConfSpec {
            content: Some(json!({ "format": "splunk" })),
            filter: Some(json!({ "traffic-mitigation-stats": "all" })),
        },
    }
}

fn mk_protected(name: &str, policy: &str, log_conf: Option<&str>) -> DosProtectedResource {
    DosProtectedResource {
        metadata: mk_meta("default", name),
        spec: DosProtectedResourceSpec {
            enable: true,
            name: "webapp".to_string(),
            dos_access_log_dest: "syslog-svc.default.svc.cluster.local:514".to_string(),
            ap_dos_policy: policy.to_string(),
            dos_security_log: log_conf.map(|l| DosSecurityLog {
                enable: true,
                ap_dos_log_conf: l.to_string(),
                dos_log_dest: "127.0.0.1:5561".to_string(),
            }),
            ..Default::default()
        },
    }
}

fn ops(changes: &[DosChange]) -> Vec<(Op, String)> {
    changes
        .iter()
        .map(|c| (c.op, c.resource.key_with_kind()))
        .collect()
}

fn messages(problems: &[Problem]) -> Vec<String> {
    problems.iter().map(|p| p.message.clone()).collect()
}

#[test]
fn protected_resource_follows_its_policy() {
    let mut config = DosConfiguration::new(true);

    let (changes, problems) =
        config.add_or_update_protected_resource(mk_protected("dos", "policy", None));
    assert_eq!(
        ops(&changes),
        vec![(Op::Delete, "DosProtectedResource/default/dos".to_string())]
    );
    assert_eq!(
        messages(&problems),
        vec![
            "dos protected refers (default/policy) to an invalid DosPolicy: DosPolicy default/policy not found"
                .to_string()
        ]
    );

    let (changes, problems) = config.add_or_update_policy(mk_policy("default", "policy"));
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "DosProtectedResource/default/dos".to_string())]
    );
    assert!(problems.is_empty());

    let (changes, problems) = config.delete_policy("default/policy");
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "APDosPolicy/default/policy".to_string()),
            (Op::Delete, "DosProtectedResource/default/dos".to_string()),
        ]
    );
    assert_eq!(problems.len(), 1);
}

#[test]
fn invalid_policy_cascades() {
    let mut config = DosConfiguration::new(true);
    config.add_or_update_policy(mk_policy("other", "policy"));
    config.add_or_update_protected_resource(mk_protected("dos", "other/policy", None));

    let mut empty = mk_policy("other", "policy");
    empty.spec = APDosPolicySpec::default();
    let (changes, problems) = config.add_or_update_policy(empty);
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "APDosPolicy/other/policy".to_string()),
            (Op::Delete, "DosProtectedResource/default/dos".to_string()),
        ]
    );
    assert_eq!(
        messages(&problems),
        vec![
            "error validating DosPolicy policy: Required field spec not found".to_string(),
            "dos protected refers (other/policy) to an invalid DosPolicy: failed to store \
             ApDosPolicy: error validating DosPolicy policy: Required field spec not found"
                .to_string(),
        ]
    );
}

#[test]
fn log_conf_cascades() {
    let mut config = DosConfiguration::new(true);
    config.add_or_update_policy(mk_policy("default", "policy"));
    config.add_or_update_protected_resource(mk_protected("dos", "policy", Some("logs")));

    let (changes, problems) = config.add_or_update_log_conf(mk_log_conf("default", "logs"));
    assert_eq!(
        ops(&changes),
        vec![(Op::AddOrUpdate, "DosProtectedResource/default/dos".to_string())]
    );
    assert!(problems.is_empty());

    let mut broken = mk_log_conf("default", "logs");
    broken.spec.content = None;
    let (changes, problems) = config.add_or_update_log_conf(broken);
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "APDosLogConf/default/logs".to_string()),
            (Op::Delete, "DosProtectedResource/default/dos".to_string()),
        ]
    );
    assert_eq!(
        problems[0].message,
        "error validating App Protect Dos Log Configuration logs: Required field spec.content not found"
    );

    let (changes, _) = config.delete_log_conf("default/logs");
    assert_eq!(
        ops(&changes),
        vec![
            (Op::Delete, "APDosLogConf/default/logs".to_string()),
            (Op::Delete, "DosProtectedResource/default/dos".to_string()),
        ]
    );
}

#[test]
fn valid_dos_ex() {
    let mut config = DosConfiguration::new(true);
    config.add_or_update_policy(mk_policy("default", "policy"));
    config.add_or_update_log_conf(mk_log_conf("default", "logs"));
    config.add_or_update_protected_resource(mk_protected("dos", "policy", Some("logs")));

    let dos = config
        .get_valid_dos_ex("default", "dos")
        .expect("protected resource should resolve");
    assert_eq!(dos.dos_protected.metadata.name.as_deref(), Some("dos"));
    assert_eq!(
        dos.dos_policy.map(|p| object_key(&p.metadata)),
        Some("default/policy".to_string())
    );
    assert_eq!(
        dos.dos_log_conf.map(|l| object_key(&l.metadata)),
        Some("default/logs".to_string())
    );
    assert!(config.get_valid_dos_ex("other", "default/dos").is_ok());

    assert_eq!(
        config.get_valid_dos_ex("other", "dos"),
        Err(DosError::NotFound("other/dos".to_string()))
    );

    config.delete_log_conf("default/logs");
    assert_eq!(
        config
            .get_valid_dos_ex("default", "dos")
            .map_err(|e| e.to_string()),
        Err(
            "DosProtectedResource references a missing DosLogConf: DosLogConf default/logs not found"
                .to_string()
        )
    );

    config.delete_policy("default/policy");
    assert_eq!(
        config
            .get_valid_dos_ex("default", "dos")
            .map_err(|e| e.to_string()),
        Err(
            "DosProtectedResource references a missing DosPolicy: DosPolicy default/policy not found"
                .to_string()
        )
    );

    assert_eq!(
        ops(&config.delete_protected_resource("default/dos")),
        vec![(Op::Delete, "DosProtectedResource/default/dos".to_string())]
    );
    assert!(config.delete_protected_resource("default/dos").is_empty());
}

#[test]
fn dos_ex_requires_the_feature() {
    let mut config = DosConfiguration::new(false);
    config.add_or_update_protected_resource(mk_protected("dos", "", None));
    assert_eq!(
        config
            .get_valid_dos_ex("default", "dos")
            .map_err(|e| e.to_string()),
        Err(
            "DosProtectedResource is referenced but Dos feature is not enabled. resource: default/dos"
                .to_string()
        )
    );
}

#[test]
fn invalid_protected_resource_is_stored() {
    let mut config = DosConfiguration::new(true);

    let mut protected = mk_protected("dos", "", None);
    protected.spec.name = String::new();
    let (changes, problems) = config.add_or_update_protected_resource(protected);
    let message = "error validating DosProtectedResource: dos missing value for field: name";
    assert_eq!(changes[0].error.as_deref(), Some(message));
    assert_eq!(messages(&problems), vec![message.to_string()]);
    assert_eq!(
        config.get_valid_dos_ex("default", "dos"),
        Err(DosError::Invalid(format!(
            "failed to store DosProtectedResource: {message}"
        )))
    );
}

#[test]
fn references_resolve_against_the_protected_namespace() {
    let mut config = DosConfiguration::new(true);
    config.add_or_update_protected_resource(mk_protected("a", "policy", Some("logs")));
    config.add_or_update_protected_resource(mk_protected("b", "other/policy", None));

    let names = |protected: Vec<Arc<DosProtectedResource>>| {
        protected
            .iter()
            .map(|p| object_key(&p.metadata))
            .collect::<Vec<_>>()
    };
    assert_eq!(
        names(config.protected_referencing_policy("default/policy")),
        vec!["default/a"]
    );
    assert_eq!(
        names(config.protected_referencing_policy("other/policy")),
        vec!["default/b"]
    );
    assert_eq!(
        names(config.protected_referencing_log_conf("default/logs")),
        vec!["default/a"]
    );
    assert!(config.protected_referencing_log_conf("other/logs").is_empty());
}

#[rstest]
#[case::valid(|_: &mut DosProtectedResourceSpec| {}, None)]
#[case::name_too_long(
    |s: &mut DosProtectedResourceSpec| s.name = "a".repeat(64),
    Some("invalid field: name err: app Protect Dos Name max length is 63"),
)]
#[case::unescaped_name(
    |s: &mut DosProtectedResourceSpec| s.name = "web\"app".to_string(),
    Some("invalid field: name err: 'web\"app' must have all '\"' (double quotes) escaped"),
)]
#[case::monitor_protocol(
    |s: &mut DosProtectedResourceSpec| s.ap_dos_monitor = Some(ApDosMonitor {
        uri: "example.com".to_string(),
        protocol: "http3".to_string(),
        timeout: None,
    }),
    Some("invalid field: apDosMonitor err: app Protect Dos Monitor Protocol must be: \
          dosMonitorProtocol: Unsupported value: \"http3\""),
)]
#[case::missing_access_log(
    |s: &mut DosProtectedResourceSpec| s.dos_access_log_dest = String::new(),
    Some("missing value for field: dosAccessLogDest"),
)]
#[case::stderr_access_log(
    |s: &mut DosProtectedResourceSpec| s.dos_access_log_dest = "stderr".to_string(),
    None,
)]
#[case::localhost_access_log(
    |s: &mut DosProtectedResourceSpec| s.dos_access_log_dest = "localhost:514".to_string(),
    None,
)]
#[case::access_log_port(
    |s: &mut DosProtectedResourceSpec| s.dos_access_log_dest = "10.0.0.1:70000".to_string(),
    Some("invalid field: dosAccessLogDest err: invalid log destination: error parsing port: \
          70000 not a valid port number"),
)]
#[case::access_log_format(
    |s: &mut DosProtectedResourceSpec| s.dos_access_log_dest = "syslog".to_string(),
    Some("invalid field: dosAccessLogDest err: invalid log destination: syslog, must follow format"),
)]
#[case::policy_reference(
    |s: &mut DosProtectedResourceSpec| s.ap_dos_policy = "a/b/c".to_string(),
    Some("invalid field: apDosPolicy err: reference name is invalid: a/b/c"),
)]
#[case::security_log_dest(
    |s: &mut DosProtectedResourceSpec| s.dos_security_log = Some(DosSecurityLog {
        enable: true,
        ap_dos_log_conf: "logs".to_string(),
        dos_log_dest: String::new(),
    }),
    Some("invalid field: dosSecurityLog/dosLogDest err: invalid log destination: , must follow"),
)]
#[case::security_log_reference(
    |s: &mut DosProtectedResourceSpec| s.dos_security_log = Some(DosSecurityLog {
        enable: true,
        ap_dos_log_conf: String::new(),
        dos_log_dest: "stderr".to_string(),
    }),
    Some("invalid field: dosSecurityLog/apDosLogConf err: reference name is invalid: "),
)]
fn protected_resource_validation(
    #[case] edit: fn(&mut DosProtectedResourceSpec),
    #[case] expected: Option<&str>,
) {
    let mut protected = mk_protected("dos", "policy", None);
    edit(&mut protected.spec);

    match (validate_protected_resource(&protected), expected) {
        (Ok(()), None) => {}
        (Err(error), Some(expected)) => assert!(
            error.contains(expected),
            "{error:?} should contain {expected:?}"
        ),
        (result, expected) => panic!("got {result:?}, expected {expected:?}"),
    }
}
