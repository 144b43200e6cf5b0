use std::process::{Command, Output, Stdio};

static BIN: &str = env!("CARGO_BIN_EXE_shipyard");

fn run(args: &[&str]) -> Output {
    Command::new(BIN)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap()
}

fn format_outputs(output: &Output) -> String {
    let stdout = std::str::from_utf8(&output.stdout).unwrap();
    let stderr = std::str::from_utf8(&output.stderr).unwrap();
    format!("stdout:\n{stdout}\nstderr:\n{stderr}")
}

/// An empty directory standing in for a checkout, and its path as a str
fn empty_checkout() -> (temp_dir::TempDir, String) {
    let dir = temp_dir::TempDir::new().unwrap();
    let path = dir.path().to_str().unwrap().to_owned();
    (dir, path)
}

#[test]
fn test_version() {
    let output = run(&["-V"]);
    let stdout = String::from_utf8(output.stdout).unwrap();
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(output.status.success(), "{}", stderr);
    assert_eq!(stderr, "");

    let (name, ver) = stdout.split_once(' ').unwrap();
    assert_eq!(name, "shipyard");
    let mut ver_parts = ver.trim().split('.');
    ver_parts.next().unwrap().parse::<u8>().unwrap();
    ver_parts.next().unwrap().parse::<u8>().unwrap();
    let last = ver_parts.next().unwrap();
    if let Some((last, _prerelease)) = last.split_once('-') {
        last.parse::<u8>().unwrap();
    } else {
        last.parse::<u8>().unwrap();
    }
    assert!(ver_parts.next().is_none());
}

#[test]
fn test_long_help() {
    let output = run(&["--help"]);
    assert!(output.status.success(), "{}", format_outputs(&output));
    let stdout = String::from_utf8(output.stdout).unwrap();
    for sub in ["build", "plan", "manifest-schema"] {
        assert!(stdout.contains(sub), "help is missing {sub}:\n{stdout}");
    }
    assert!(stdout.contains("GLOBAL OPTIONS"), "{stdout}");
}

#[test]
fn test_build_help() {
    let output = run(&["help", "build"]);
    assert!(output.status.success(), "{}", format_outputs(&output));
    let stdout = String::from_utf8(output.stdout).unwrap();
    for flag in ["--package-format", "--nightly", "--sign-required", "--bucket", "--static"] {
        assert!(stdout.contains(flag), "build help is missing {flag}:\n{stdout}");
    }
}

#[test]
fn test_manifest_schema() {
    let output = run(&["manifest-schema"]);
    assert!(output.status.success(), "{}", format_outputs(&output));
    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(schema["title"], "DistReport");
    assert!(schema["properties"]["artifacts"].is_object());
}

#[test]
fn test_conflicting_flags() {
    for args in [
        &["build", "--nightly", "--release"][..],
        &["build", "--nightly", "--rc", "1"],
        &["build", "--branch", "main", "--commit", "abc"],
        &["plan", "--update", "--no-get"],
    ] {
        let output = run(args);
        assert_eq!(output.status.code(), Some(1), "{args:?} should fail");
        let stderr = String::from_utf8(output.stderr).unwrap();
        assert!(stderr.contains("cannot be used with"), "{args:?}:\n{stderr}");
    }
}

#[test]
fn test_unknown_format() {
    let output = run(&["build", "--package-format", "msi"]);
    assert_eq!(output.status.code(), Some(1), "{}", format_outputs(&output));
}

#[test]
fn test_plan_json() {
    let (_dir, checkout) = empty_checkout();
    let output = run(&[
        "plan",
        "--checkout",
        &checkout,
        "--name",
        "mytool",
        "--platform",
        "linux",
        "--arch",
        "all",
        "--version",
        "2.0.0",
        "--branch",
        "release-2",
        "-o",
        "json",
    ]);
    assert!(output.status.success(), "{}", format_outputs(&output));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["app_name"], "mytool");
    assert_eq!(report["version"], "2.0.0");
    assert_eq!(report["iteration"], "1");
    assert_eq!(report["branch"], "release-2");
    let archs = report["matrix"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["arch"].as_str().unwrap().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(archs, vec!["amd64", "386", "armel", "armhf", "arm64"]);
    // planning never builds anything
    assert!(!std::path::Path::new(&checkout).join("build").exists());
}

#[test]
fn test_plan_unsupported_platform() {
    let (_dir, checkout) = empty_checkout();
    let output = run(&[
        "plan",
        "--checkout",
        &checkout,
        "--platform",
        "plan9",
        "--version",
        "1.0.0",
        "-o",
        "json",
    ]);
    assert_eq!(output.status.code(), Some(1), "{}", format_outputs(&output));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("unsupported platform: plan9"), "{stdout}");
}

#[test]
fn test_missing_config_file() {
    let (_dir, checkout) = empty_checkout();
    let output = run(&[
        "plan",
        "--checkout",
        &checkout,
        "--config",
        "nope.toml",
    ]);
    assert_eq!(output.status.code(), Some(1), "{}", format_outputs(&output));
}
