//! Mock testing utils, mostly you want [`FakeRunner`][] and the `mock_*` functions,
//! but other functions/consts will help you assert the results

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use axoasset::LocalAsset;
use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    build::fake::build_fake_binary,
    config::{Config, ProjectConfig, ShipyardToml},
    errors::{DistError, DistResult},
    host::ObjectStore,
    process::{ToolCommand, ToolOutput, ToolRunner, Tools},
};

pub const APP_NAME: &str = "mytool";
pub const APP_TAG: &str = "v1.8.0";
pub const APP_VER: &str = "1.8.0";
pub const APP_BRANCH: &str = "main";
pub const APP_COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";
pub const APP_SHORT_COMMIT: &str = "0123456";

/// Pretends to be go, git, fpm, gpg and the aws cli
#[derive(Default)]
pub struct FakeRunner {
    /// every command we were asked to run (including version checks)
    pub calls: Mutex<Vec<ToolCommand>>,
    /// tools that "aren't installed"
    pub missing: Vec<&'static str>,
    /// the tag on HEAD
    pub tag: Option<String>,
    /// exit with failure when `go build` targets this GOOS/GOARCH
    pub fail_build: Option<(&'static str, &'static str)>,
    /// fpm works but doesn't say where it put the package
    pub fpm_quiet: bool,
    /// gpg exits with failure
    pub gpg_fails: bool,
    /// every invocation of this tool (apart from version checks) times out
    pub times_out: Option<&'static str>,
    /// `head-object` is refused with a 403
    pub head_denied: bool,
    /// contents of the fake bucket, keyed by `bucket/key`
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// objects that were made public
    pub public: Mutex<BTreeSet<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            tag: Some(APP_TAG.to_owned()),
            ..Self::default()
        }
    }

    /// Calls to `program`, minus the version check
    pub fn calls_to(&self, program: &str) -> Vec<ToolCommand> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == program && !is_version_check(c))
            .cloned()
            .collect()
    }

    fn ok(stdout: impl Into<String>) -> DistResult<ToolOutput> {
        Ok(ToolOutput {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        })
    }

    fn fail(code: i32, stderr: impl Into<String>) -> DistResult<ToolOutput> {
        Ok(ToolOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        })
    }

    fn go(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        match cmd.args.first().map(|s| s.as_str()) {
            Some("version") => Self::ok("go version go1.22.1 linux/amd64\n"),
            Some("build") => {
                let goos = cmd.env_value("GOOS").unwrap_or_default();
                let goarch = cmd.env_value("GOARCH").unwrap_or_default();
                if let Some((os, arch)) = self.fail_build {
                    if os == goos && arch == goarch {
                        return Self::fail(2, "# command-line-arguments\n./main.go:3:1: syntax error");
                    }
                }
                build_fake_binary(cmd)?;
                Self::ok("")
            }
            _ => Self::ok(""),
        }
    }

    fn git(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        let args = cmd.args.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        match args.as_slice() {
            ["--version"] => Self::ok("git version 2.43.0\n"),
            ["describe", ..] => match &self.tag {
                Some(tag) => Self::ok(format!("{tag}\n")),
                None => Self::fail(128, "fatal: no tag exactly matches"),
            },
            ["rev-parse", "--abbrev-ref", "HEAD"] => Self::ok(format!("{APP_BRANCH}\n")),
            ["rev-parse", "--short", "HEAD"] => Self::ok(format!("{APP_SHORT_COMMIT}\n")),
            ["rev-parse", "HEAD"] => Self::ok(format!("{APP_COMMIT}\n")),
            _ => Self::fail(1, "unexpected git invocation"),
        }
    }

    fn fpm(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        if cmd.args.first().map(|s| s.as_str()) == Some("--version") {
            return Self::ok("1.15.1\n");
        }
        let get = |flag: &str| cmd.flag_value(flag).unwrap_or_default().to_owned();
        let (name, arch, kind) = (get("--name"), get("-a"), get("-t"));
        let (version, iteration) = (get("--version"), get("--iteration"));
        let file = match kind.as_str() {
            "deb" => format!("{name}_{version}-{iteration}_{arch}.deb"),
            _ => format!("{name}-{version}-{iteration}.{arch}.rpm"),
        };
        let dest = Utf8PathBuf::from(get("-p")).join(file);
        LocalAsset::write_new_all(&format!("fake {kind} of {}\n", get("-C")), &dest)?;
        if self.fpm_quiet {
            return Self::ok("");
        }
        Self::ok(format!(
            "{{:timestamp=>\"2024-01-01T00:00:00.000000+0000\", :message=>\"Created package\", :path=>\"{dest}\"}}\n"
        ))
    }

    fn gpg(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        if cmd.args.first().map(|s| s.as_str()) == Some("--version") {
            return Self::ok("gpg (GnuPG) 2.4.4\n");
        }
        if self.gpg_fails {
            return Self::fail(2, "gpg: signing failed: No secret key");
        }
        let Some(dest) = cmd.flag_value("--output") else {
            return Self::fail(2, "gpg: no output");
        };
        LocalAsset::write_new_all(
            "-----BEGIN PGP SIGNATURE-----\n\n-----END PGP SIGNATURE-----\n",
            Utf8Path::new(dest),
        )?;
        Self::ok("")
    }

    fn aws(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        let args = cmd.args.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        match args.as_slice() {
            ["--version"] => Self::ok("aws-cli/2.15.0\n"),
            ["s3api", "head-object", "--bucket", bucket, "--key", key] => {
                if self.head_denied {
                    Self::fail(254, "An error occurred (403) when calling the HeadObject operation: Forbidden")
                } else if self.objects.lock().unwrap().contains_key(&format!("{bucket}/{key}")) {
                    Self::ok("{}")
                } else {
                    Self::fail(254, "An error occurred (404) when calling the HeadObject operation")
                }
            }
            ["s3", "cp", file, url] => {
                let contents = LocalAsset::load_bytes(*file)?;
                let object = url.trim_start_matches("s3://").to_owned();
                self.objects.lock().unwrap().insert(object, contents);
                Self::ok("")
            }
            ["s3api", "put-object-acl", "--bucket", bucket, "--key", key, "--acl", "public-read"] => {
                self.public.lock().unwrap().insert(format!("{bucket}/{key}"));
                Self::ok("")
            }
            _ => Self::fail(252, "unexpected aws invocation"),
        }
    }
}

fn is_version_check(cmd: &ToolCommand) -> bool {
    matches!(
        cmd.args.as_slice(),
        [arg] if arg == "--version" || arg == "version"
    )
}

impl ToolRunner for FakeRunner {
    fn execute(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        if self.missing.contains(&cmd.program.as_str()) {
            return Err(DistError::Cmd(axoprocess::AxoprocessError::Exec {
                summary: cmd.summary.clone(),
                cause: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }));
        }
        if self.times_out == Some(cmd.program.as_str()) && !is_version_check(cmd) {
            return Err(DistError::Timeout {
                summary: cmd.summary.clone(),
                seconds: 1,
            });
        }
        match cmd.program.as_str() {
            "go" => self.go(cmd),
            "git" => self.git(cmd),
            "fpm" => self.fpm(cmd),
            "gpg" => self.gpg(cmd),
            "aws" => self.aws(cmd),
            _ => Self::fail(127, "unknown program"),
        }
    }
}

/// An in-memory bucket
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    pub public: Mutex<BTreeSet<String>>,
    /// puts to keys ending with this fail
    pub fail_put: Option<&'static str>,
    /// puts to keys ending with this time out
    pub timeout_put: Option<&'static str>,
}

impl ObjectStore for MemoryStore {
    fn exists(&self, bucket: &str, key: &str) -> DistResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(&format!("{bucket}/{key}")))
    }

    fn put(&self, file: &Utf8Path, bucket: &str, key: &str) -> DistResult<()> {
        if self.timeout_put.is_some_and(|s| key.ends_with(s)) {
            return Err(DistError::Timeout {
                summary: format!("upload {key}"),
                seconds: 1,
            });
        }
        if self.fail_put.is_some_and(|s| key.ends_with(s)) {
            return Err(DistError::ToolStatus {
                summary: format!("upload {key}"),
                status: "exit status: 1".to_owned(),
                stderr: "connection reset".to_owned(),
            });
        }
        let contents = LocalAsset::load_bytes(file)?;
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{bucket}/{key}"), contents);
        Ok(())
    }

    fn make_public(&self, bucket: &str, key: &str) -> DistResult<()> {
        self.public.lock().unwrap().insert(format!("{bucket}/{key}"));
        Ok(())
    }
}

/// A temp dir standing in for a source checkout
pub struct Checkout {
    _dir: temp_dir::TempDir,
    pub root: Utf8PathBuf,
}

impl Checkout {
    pub fn new() -> Self {
        let dir = temp_dir::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
        Self { _dir: dir, root }
    }

    pub fn write(&self, rel: &str, contents: &str) {
        LocalAsset::write_new_all(contents, self.root.join(rel)).unwrap();
    }
}

pub fn mock_tools(runner: Arc<FakeRunner>) -> Tools {
    Tools::discover(runner)
}

pub fn mock_project() -> ProjectConfig {
    let toml = ShipyardToml {
        name: Some(APP_NAME.to_owned()),
        description: Some("a tool for testing".to_owned()),
        vendor: Some("Shipyard Testers".to_owned()),
        url: Some("https://example.com/mytool".to_owned()),
        license: Some("MIT".to_owned()),
        maintainer: Some("Testers <testers@example.com>".to_owned()),
        ..ShipyardToml::default()
    };
    ProjectConfig::resolve(toml, None, "fallback")
}

/// linux/amd64, no packaging, output under the checkout
pub fn mock_config(checkout: &Checkout) -> Config {
    let mut cfg = Config::new(
        checkout.root.clone(),
        checkout.root.join("build"),
        mock_project(),
    );
    cfg.selection.platform = "linux".to_owned();
    cfg.selection.arch = "amd64".to_owned();
    cfg.jobs = 2;
    cfg
}

/// Run `f` the way main does: inside a multi-threaded runtime, outside async code
pub fn with_runtime<T>(f: impl FnOnce() -> T) -> T {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let _guard = rt.enter();
    f()
}
