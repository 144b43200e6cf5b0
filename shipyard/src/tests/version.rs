use std::sync::Arc;

use super::mock::*;
use crate::{
    errors::DistError,
    version::{normalize_tag, resolve_version, UNKNOWN},
};

#[test]
fn tags_normalize() {
    assert_eq!(normalize_tag("v1.8.0"), "1.8.0");
    assert_eq!(normalize_tag("1.8.0"), "1.8.0");
    assert_eq!(normalize_tag("v1.8.0-beta_2"), "1.8.0~beta~2");
    // only one leading v goes
    assert_eq!(normalize_tag("vv1"), "v1");
}

#[test]
fn normalizing_twice() {
    for tag in ["v1.8.0", "1.8.0", " v2.0.0-rc_1 ", "v1.0~beta", "version-2", ""] {
        let once = normalize_tag(tag);
        assert_eq!(normalize_tag(&once), once, "{tag:?}");
    }
    // a doubled v is peeled one layer per pass
    assert_eq!(normalize_tag("vv1.0"), "v1.0");
    assert_eq!(normalize_tag(&normalize_tag("vv1.0")), "1.0");
}

#[test]
fn tagged_head() {
    let checkout = Checkout::new();
    let cfg = mock_config(&checkout);
    let tools = mock_tools(Arc::new(FakeRunner::new()));
    let v = resolve_version(&cfg, &tools).unwrap();
    assert_eq!(v.version, APP_VER);
    assert_eq!(v.iteration, "1");
    assert_eq!(v.branch, APP_BRANCH);
    assert_eq!(v.commit, APP_COMMIT);
    assert!(!v.prerelease);
}

#[test]
fn untagged_head() {
    let checkout = Checkout::new();
    let cfg = mock_config(&checkout);
    let runner = FakeRunner {
        tag: None,
        ..FakeRunner::new()
    };
    let tools = mock_tools(Arc::new(runner));
    let v = resolve_version(&cfg, &tools).unwrap();
    assert_eq!(v.version, format!("0.0.0~{APP_SHORT_COMMIT}"));
    assert!(v.prerelease);
}

#[test]
fn untagged_release_is_refused() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.version.release = true;
    let runner = FakeRunner {
        tag: None,
        ..FakeRunner::new()
    };
    let tools = mock_tools(Arc::new(runner));
    let err = resolve_version(&cfg, &tools).unwrap_err();
    assert!(matches!(err, DistError::ReleaseWithoutTag { ref commit } if commit == APP_SHORT_COMMIT));
}

#[test]
fn explicit_values_win() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.version.version = Some("2.0.0".to_owned());
    cfg.version.branch = Some("release-2".to_owned());
    cfg.version.iteration = Some("7".to_owned());
    let tools = mock_tools(Arc::new(FakeRunner::new()));
    let v = resolve_version(&cfg, &tools).unwrap();
    assert_eq!(v.version, "2.0.0");
    assert_eq!(v.branch, "release-2");
    assert_eq!(v.commit, APP_COMMIT);
    assert_eq!(v.iteration, "7");
}

#[test]
fn release_candidate() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.version.rc = Some(2);
    let tools = mock_tools(Arc::new(FakeRunner::new()));
    let v = resolve_version(&cfg, &tools).unwrap();
    assert_eq!(v.version, "1.8.0rc2");
    assert_eq!(v.iteration, "0.rc2");
}

#[test]
fn nightly() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.version.nightly = true;
    let tools = mock_tools(Arc::new(FakeRunner::new()));
    let v = resolve_version(&cfg, &tools).unwrap();
    assert!(v.version.starts_with("1.8.0.n"), "{}", v.version);
    let stamp = v.version.trim_start_matches("1.8.0.n");
    assert!(stamp.parse::<u64>().is_ok(), "{stamp}");
    assert_eq!(v.iteration, "0");
}

#[test]
fn no_git() {
    let checkout = Checkout::new();
    let cfg = mock_config(&checkout);
    let runner = FakeRunner {
        missing: vec!["git"],
        ..FakeRunner::new()
    };
    let tools = mock_tools(Arc::new(runner));
    assert!(tools.git.is_none());
    let v = resolve_version(&cfg, &tools).unwrap();
    assert_eq!(v.branch, UNKNOWN);
    assert_eq!(v.commit, UNKNOWN);
    assert_eq!(v.version, format!("0.0.0~{UNKNOWN}"));
}

#[test]
fn conflicting_flags() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.version.nightly = true;
    cfg.version.release = true;
    assert!(matches!(
        cfg.validate().unwrap_err(),
        DistError::ConflictingFlags {
            first: "nightly",
            second: "release"
        }
    ));

    let mut cfg = mock_config(&checkout);
    cfg.version.branch = Some("main".to_owned());
    cfg.version.commit = Some("abc".to_owned());
    assert!(matches!(
        cfg.validate().unwrap_err(),
        DistError::ConflictingFlags {
            first: "branch",
            second: "commit"
        }
    ));
}
