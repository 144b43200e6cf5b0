use super::mock::*;
use crate::{
    config::{load_shipyard_toml, split_destination, ProjectConfig, DEFAULT_RPM_DEPENDS},
    errors::DistError,
};

#[test]
fn missing_default_file_is_fine() {
    let checkout = Checkout::new();
    let toml = load_shipyard_toml(&checkout.root, None).unwrap();
    assert!(toml.name.is_none());
}

#[test]
fn missing_explicit_file_is_an_error() {
    let checkout = Checkout::new();
    let path = checkout.root.join("nope.toml");
    let err = load_shipyard_toml(&checkout.root, Some(path.as_path())).unwrap_err();
    assert!(matches!(err, DistError::ConfigParse { .. }));
}

#[test]
fn parse_full_config() {
    let checkout = Checkout::new();
    checkout.write(
        "shipyard.toml",
        r#"
name = "influx"
description = "a time series database"
vendor = "Influx Org"
license = "MIT"
next-version = "2.1.0"
ldflags-package = "main"
bucket = "dl.example.com/releases"
rpm-depends = ["coreutils"]

[targets]
influxd = "./cmd/influxd"
influx = "./cmd/influx"

[templates]
config = "etc/sample.conf"
"#,
    );
    let toml = load_shipyard_toml(&checkout.root, None).unwrap();
    let project = ProjectConfig::resolve(toml, None, "fallback");
    assert_eq!(project.name, "influx");
    assert_eq!(project.next_version, "2.1.0");
    assert_eq!(project.bucket.as_deref(), Some("dl.example.com/releases"));
    assert_eq!(project.rpm_depends, vec!["coreutils"]);
    // targets come out in name order
    let names = project.targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["influx", "influxd"]);
    assert_eq!(project.targets[1].source, "./cmd/influxd");
    assert_eq!(project.templates.config, "etc/sample.conf");
    assert_eq!(project.templates.systemd_unit, "scripts/influx.service");
}

#[test]
fn bad_config_is_an_error() {
    let checkout = Checkout::new();
    checkout.write("shipyard.toml", "name = [1, 2\n");
    let err = load_shipyard_toml(&checkout.root, None).unwrap_err();
    assert!(matches!(err, DistError::ConfigParse { .. }));
}

#[test]
fn defaults() {
    let project = ProjectConfig::resolve(Default::default(), None, "mytool");
    assert_eq!(project.name, "mytool");
    assert_eq!(project.targets.len(), 1);
    assert_eq!(project.targets[0].name, "mytool");
    assert_eq!(project.targets[0].source, "./cmd/mytool");
    assert_eq!(project.next_version, "0.0.0");
    assert_eq!(project.ldflags_package, "main");
    assert_eq!(project.rpm_depends, DEFAULT_RPM_DEPENDS);
}

#[test]
fn name_flag_only_renames_the_package() {
    let checkout = Checkout::new();
    checkout.write("shipyard.toml", "name = \"influx\"\n");
    let path = checkout.root.join("shipyard.toml");
    let toml = load_shipyard_toml(&checkout.root, Some(path.as_path())).unwrap();
    let project = ProjectConfig::resolve(toml, Some("influx-nightly"), "fallback");
    assert_eq!(project.name, "influx-nightly");
    assert_eq!(project.targets[0].name, "influx");
}

#[test]
fn destinations() {
    assert_eq!(split_destination("bucket"), ("bucket", None));
    assert_eq!(split_destination("bucket/a/b"), ("bucket", Some("a/b")));
    assert_eq!(split_destination("/bucket/a/"), ("bucket", Some("a")));
    assert_eq!(split_destination("bucket/"), ("bucket", None));
}

#[test]
fn empty_bucket_is_rejected() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.upload = Some(crate::config::UploadSettings {
        destination: "".to_owned(),
        overwrite: false,
    });
    assert!(matches!(
        cfg.validate().unwrap_err(),
        DistError::InvalidConfigValue { key: "bucket", .. }
    ));
}

#[test]
fn nightly_always_overwrites() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.upload = Some(crate::config::UploadSettings {
        destination: "b".to_owned(),
        overwrite: false,
    });
    assert!(!cfg.overwrite_uploads());
    cfg.version.nightly = true;
    assert!(cfg.overwrite_uploads());
}
