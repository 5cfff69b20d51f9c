//! Continuous-deployment progression tests

use std::collections::BTreeMap;

use chrono::NaiveDate;
use deploy_data::errors::DeployDataError;
use deploy_data::models::artifact::ArtifactProps;
use deploy_data::models::rrc::ReleaseReadinessConfig;
use deploy_data::progression::resolver::{build_plan, resolve, resolve_progression, CdInputs, ResolveContext};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn rrc(yaml: &str) -> ReleaseReadinessConfig {
    serde_yaml::from_str(yaml).unwrap()
}

fn mapping(pairs: &[(&str, &str)]) -> CdInputs {
    CdInputs {
        environment_mapping: pairs
            .iter()
            .map(|(tier, env)| (tier.to_string(), env.to_string()))
            .collect(),
        ..Default::default()
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2027, 1, 10).unwrap()
}

#[test]
fn test_last_env_of_last_tier() {
    let config = rrc(
        r#"
jiraDetails:
  fixVersion: "2027.1"
  environments:
    DEV: true
    QA: "qa1,qa2"
"#,
    );
    let props = ArtifactProps::new(BTreeMap::from([(
        "CONTINUOUS_DEPLOY".to_string(),
        vec!["qa1".to_string()],
    )]));
    let ctx = ResolveContext {
        package_name: "foo",
        env: "qa2",
        manifest_deploy: false,
        today: today(),
    };

    let auto_deploy = resolve(&config, &mapping(&[("dev", "dev1")]), &props, &ctx).unwrap();

    assert_eq!(auto_deploy.env_name, "QA");
    assert_eq!(auto_deploy.next_env, "");
    assert_eq!(auto_deploy.next_env_name, "");
    assert!(auto_deploy.last_lower_env);
    assert!(!auto_deploy.skip_deploy);
    assert_eq!(auto_deploy.cd_deployed, vec!["qa1".to_string()]);
}

#[test]
fn test_first_env_moves_to_next_in_tier() {
    let config = rrc("jiraDetails:\n  environments:\n    DEV: true\n    QA: \"qa1,qa2\"\n");
    let cd = mapping(&[("dev", "dev1")]);
    let plan = build_plan(&config, &cd);

    let dev = resolve_progression(&plan, &[], "dev1", false, &cd).unwrap();
    assert_eq!(dev.env_name, "DEV");
    assert_eq!(dev.next_env, "qa1");
    assert_eq!(dev.next_env_name, "QA");
    assert!(!dev.last_lower_env);

    let qa = resolve_progression(&plan, &["dev1".to_string()], "qa1", false, &cd).unwrap();
    assert_eq!(qa.next_env, "qa2");
    assert_eq!(qa.next_env_name, "QA");
    assert!(!qa.last_lower_env);
}

#[test]
fn test_manifest_flow_transition_ids() {
    let config = rrc("jiraDetails:\n  environments:\n    HINT: true\n    PREPROD: true\n");
    let cd = CdInputs {
        jira_mappings: BTreeMap::from([("HINT".to_string(), "301".to_string())]),
        ..mapping(&[
            ("hint", "hint1"),
            ("preprod", "kpo-preprod-1"),
            ("stage", "kpo-stage"),
            ("prod", "kpo-prod"),
        ])
    };
    let plan = build_plan(&config, &cd);

    let hint = resolve_progression(&plan, &[], "hint1", true, &cd).unwrap();
    assert_eq!(hint.env_name, "HINT");
    assert_eq!(hint.env_id, "301");
    assert_eq!(hint.next_env, "kpo-preprod-1");
    assert_eq!(hint.next_env_name, "PREPROD");
    assert!(!hint.last_lower_env);
}

#[test]
fn test_manifest_env_outside_plan_is_skipped() {
    let config = rrc("jiraDetails:\n  environments:\n    HINT: hint1\n    REGIONAL: reg1\n");
    let cd = mapping(&[("hint", "x"), ("regional", "x")]);
    let plan = build_plan(&config, &cd);

    let progression = resolve_progression(&plan, &[], "load9", true, &cd).unwrap();
    assert!(progression.skip_deploy);
    assert!(!progression.last_lower_env);
    assert_eq!(progression.next_env, "hint1");
}

#[test]
fn test_past_scheduled_date_rejected() {
    let config = rrc(
        r#"
jiraDetails:
  fixVersion: "2027.1"
  environments:
    QA: qa1
snowDetails:
  ScheduledDate: "01/09/2027"
"#,
    );
    let ctx = ResolveContext {
        package_name: "foo",
        env: "qa1",
        manifest_deploy: false,
        today: today(),
    };
    let err = resolve(&config, &CdInputs::default(), &ArtifactProps::default(), &ctx).unwrap_err();
    assert!(matches!(err, DeployDataError::ValidationError(_)));
}

#[test]
fn test_fully_deployed_trailing_tier() {
    let config = rrc("jiraDetails:\n  environments:\n    HINT: \"hint1,hint2\"\n    REGIONAL: reg1\n");
    let cd = mapping(&[("hint", "x"), ("regional", "x")]);
    let plan = build_plan(&config, &cd);

    let hint = resolve_progression(&plan, &["reg1".to_string()], "hint1", true, &cd).unwrap();
    assert_eq!(hint.env_name, "HINT");
    assert_eq!(hint.next_env, "hint2");
    assert_eq!(hint.next_env_name, "HINT");
    assert!(!hint.last_lower_env);

    let last = resolve_progression(&plan, &["reg1".to_string(), "hint1".to_string()], "hint2", true, &cd).unwrap();
    assert_eq!(last.next_env, "");
    assert!(last.last_lower_env);
}

#[test]
fn test_env_aliases_resolve_through_check_env_map() {
    let config = rrc("jiraDetails:\n  environments:\n    HINT: kpo-hint1\n    REGIONAL: reg1\n");
    let cd = CdInputs {
        check_env_map: BTreeMap::from([("kpo-hint1".to_string(), "hint1".to_string())]),
        ..mapping(&[("hint", "x"), ("regional", "x")])
    };
    let plan = build_plan(&config, &cd);
    assert!(plan.contains_env("hint1"));

    for alias in ["kpo-hint1", " KPO-HINT1 "] {
        let hint = resolve_progression(&plan, &[], alias, true, &cd).unwrap();
        assert_eq!(hint.env_name, "HINT");
        assert!(!hint.skip_deploy);
        assert_eq!(hint.next_env, "reg1");
        assert_eq!(hint.next_env_name, "REGIONAL");
        assert!(!hint.last_lower_env);
    }

    let regional = resolve_progression(&plan, &["KPO-HINT1".to_string()], "reg1", true, &cd).unwrap();
    assert!(regional.remaining.tiers().iter().all(|tier| !tier.envs.contains(&"hint1".to_string())));
    assert!(regional.last_lower_env);
}

proptest! {
    #[test]
    fn prop_deployed_env_never_comes_back(
        dev_count in 1usize..4,
        qa_count in 1usize..5,
        seeded in 0usize..5,
    ) {
        let seeded = seeded.min(qa_count);
        let dev: Vec<String> = (1..=dev_count).map(|i| format!("dev{}", i)).collect();
        let qa: Vec<String> = (1..=qa_count).map(|i| format!("qa{}", i)).collect();
        let config = rrc(&format!(
            "jiraDetails:\n  environments:\n    DEV: \"{}\"\n    QA: \"{}\"\n",
            dev.join(","),
            qa.join(",")
        ));
        let cd = CdInputs {
            check_env_map: dev
                .iter()
                .chain(qa.iter())
                .map(|env| (format!("kpo-{}", env), env.clone()))
                .collect(),
            ..Default::default()
        };
        let alias = |env: &str| format!("KPO-{}", env.to_uppercase());
        let plan = build_plan(&config, &cd);

        // Trailing QA environments were already deployed by an earlier run
        let mut deployed: Vec<String> = qa[qa_count - seeded..].to_vec();
        let mut reported: Vec<String> = deployed.iter().map(|env| alias(env)).collect();
        let mut env = dev[0].clone();
        let mut steps = 0;
        while !env.is_empty() {
            let progression = resolve_progression(&plan, &reported, &alias(&env), false, &cd).unwrap();
            prop_assert!(!progression.skip_deploy);
            prop_assert_ne!(&progression.next_env, &env);
            prop_assert!(!deployed.contains(&progression.next_env));
            for tier in progression.remaining.tiers() {
                prop_assert!(!tier.envs.contains(&env));
                prop_assert!(tier.envs.iter().all(|e| !deployed.contains(e)));
            }
            prop_assert_eq!(progression.last_lower_env, progression.next_env.is_empty());

            reported.push(alias(&env));
            deployed.push(env);
            env = progression.next_env;
            steps += 1;
        }
        prop_assert_eq!(steps, dev_count + qa_count - seeded);
    }
}
