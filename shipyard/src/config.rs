//! Config types
//!
//! There are two layers: [`ShipyardToml`][] is the raw `shipyard.toml` checked into the
//! project, and [`Config`][] is the fully resolved settings for a single run, built once
//! from that file plus command line flags and then passed by reference everywhere.

use std::time::Duration;

use axoasset::SourceFile;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use shipyard_schema::PackageFormat;
use tracing::info;

use crate::errors::{DistError, DistResult};

/// Name of the config file we look for in the checkout
pub const CONFIG_FILE_NAME: &str = "shipyard.toml";
/// Version used for untagged builds when nothing else is configured
pub const DEFAULT_NEXT_VERSION: &str = "0.0.0";
/// Package whose string variables receive version/branch/commit at link time
pub const DEFAULT_LDFLAGS_PACKAGE: &str = "main";
/// Runtime dependencies every rpm declares
pub const DEFAULT_RPM_DEPENDS: &[&str] = &["coreutils", "shadow-utils"];

/// Contents of `shipyard.toml`
///
/// Every field is optional, anything missing gets a default derived from the package name.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ShipyardToml {
    /// Package name (also the default binary name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// One-line description handed to OS packages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Package vendor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Project homepage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// License identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Package maintainer (`Name <email>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    /// Version to use (with the short commit) when HEAD isn't tagged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_version: Option<String>,
    /// Go package whose `version`/`branch`/`commit` vars get set via -ldflags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldflags_package: Option<String>,
    /// Default upload destination (`bucket[/prefix]`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Runtime dependencies declared by rpm packages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_depends: Option<Vec<String>>,
    /// Logical binary name => source path to build it from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<std::collections::BTreeMap<String, String>>,
    /// Where to find packaging templates in the checkout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplatesToml>,
}

/// `[templates]` in `shipyard.toml`
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TemplatesToml {
    /// SysV init script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_script: Option<Utf8PathBuf>,
    /// systemd unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systemd_unit: Option<Utf8PathBuf>,
    /// logrotate rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logrotate: Option<Utf8PathBuf>,
    /// sample config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Utf8PathBuf>,
    /// sample config for windows archives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_config: Option<Utf8PathBuf>,
    /// package hook run before install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_install: Option<Utf8PathBuf>,
    /// package hook run after install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_install: Option<Utf8PathBuf>,
    /// package hook run before removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_remove: Option<Utf8PathBuf>,
    /// package hook run after removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_remove: Option<Utf8PathBuf>,
}

/// Load `shipyard.toml`
///
/// If `path` is None we look for [`CONFIG_FILE_NAME`][] in the checkout and quietly fall back to
/// defaults if it isn't there. An explicitly requested file has to exist.
pub fn load_shipyard_toml(checkout: &Utf8Path, path: Option<&Utf8Path>) -> DistResult<ShipyardToml> {
    let (path, required) = match path {
        Some(path) => (path.to_owned(), true),
        None => (checkout.join(CONFIG_FILE_NAME), false),
    };
    if !required && !path.exists() {
        info!("no {CONFIG_FILE_NAME} found, using defaults");
        return Ok(ShipyardToml::default());
    }
    let src = SourceFile::load_local(&path).map_err(|details| DistError::ConfigParse {
        path: path.clone(),
        details,
    })?;
    src.deserialize_toml()
        .map_err(|details| DistError::ConfigParse { path, details })
}

/// A binary to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDecl {
    /// logical name, also the output file stem
    pub name: String,
    /// what to hand to `go build` (e.g. `./cmd/mytool`)
    pub source: String,
}

/// Paths (relative to the checkout) of packaging templates
///
/// When a path doesn't exist we use the builtin template instead.
#[derive(Debug, Clone)]
pub struct TemplatePaths {
    /// SysV init script
    pub init_script: Utf8PathBuf,
    /// systemd unit
    pub systemd_unit: Utf8PathBuf,
    /// logrotate rule
    pub logrotate: Utf8PathBuf,
    /// sample config
    pub config: Utf8PathBuf,
    /// sample config for windows archives
    pub windows_config: Utf8PathBuf,
    /// hook: before install
    pub pre_install: Utf8PathBuf,
    /// hook: after install
    pub post_install: Utf8PathBuf,
    /// hook: before removal
    pub pre_remove: Utf8PathBuf,
    /// hook: after removal
    pub post_remove: Utf8PathBuf,
}

impl TemplatePaths {
    /// The conventional locations for a package called `name`
    pub fn defaults(name: &str) -> Self {
        Self {
            init_script: "scripts/init.sh".into(),
            systemd_unit: format!("scripts/{name}.service").into(),
            logrotate: format!("etc/logrotate.d/{name}").into(),
            config: format!("etc/{name}.conf").into(),
            windows_config: format!("etc/{name}_windows.conf").into(),
            pre_install: "scripts/pre-install.sh".into(),
            post_install: "scripts/post-install.sh".into(),
            pre_remove: "scripts/pre-remove.sh".into(),
            post_remove: "scripts/post-remove.sh".into(),
        }
    }

    fn with_overrides(mut self, toml: TemplatesToml) -> Self {
        let TemplatesToml {
            init_script,
            systemd_unit,
            logrotate,
            config,
            windows_config,
            pre_install,
            post_install,
            pre_remove,
            post_remove,
        } = toml;
        let set = |slot: &mut Utf8PathBuf, val: Option<Utf8PathBuf>| {
            if let Some(val) = val {
                *slot = val;
            }
        };
        set(&mut self.init_script, init_script);
        set(&mut self.systemd_unit, systemd_unit);
        set(&mut self.logrotate, logrotate);
        set(&mut self.config, config);
        set(&mut self.windows_config, windows_config);
        set(&mut self.pre_install, pre_install);
        set(&mut self.post_install, post_install);
        set(&mut self.pre_remove, pre_remove);
        set(&mut self.post_remove, post_remove);
        self
    }
}

/// Resolved project metadata (config file merged with defaults)
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// package name
    pub name: String,
    /// package description
    pub description: String,
    /// package vendor
    pub vendor: String,
    /// homepage
    pub url: String,
    /// license
    pub license: String,
    /// maintainer
    pub maintainer: String,
    /// version to use for untagged builds
    pub next_version: String,
    /// go package receiving -X flags
    pub ldflags_package: String,
    /// default upload destination
    pub bucket: Option<String>,
    /// rpm runtime dependencies
    pub rpm_depends: Vec<String>,
    /// binaries to build, in name order
    pub targets: Vec<TargetDecl>,
    /// packaging templates
    pub templates: TemplatePaths,
}

impl ProjectConfig {
    /// Merge the file with defaults
    ///
    /// `name_override` is the `--name` flag; `fallback_name` is used if neither the flag
    /// nor the file set a name (usually the checkout's directory name).
    pub fn resolve(toml: ShipyardToml, name_override: Option<&str>, fallback_name: &str) -> Self {
        let ShipyardToml {
            name,
            description,
            vendor,
            url,
            license,
            maintainer,
            next_version,
            ldflags_package,
            bucket,
            rpm_depends,
            targets,
            templates,
        } = toml;
        let file_name = name;
        let name = name_override
            .map(ToOwned::to_owned)
            .or_else(|| file_name.clone())
            .unwrap_or_else(|| fallback_name.to_owned());
        // binaries keep the name from the file, --name only renames the package
        let bin_name = file_name.unwrap_or_else(|| name.clone());
        let targets = match targets {
            Some(targets) if !targets.is_empty() => targets
                .into_iter()
                .map(|(name, source)| TargetDecl { name, source })
                .collect(),
            _ => vec![TargetDecl {
                source: format!("./cmd/{bin_name}"),
                name: bin_name.clone(),
            }],
        };
        let templates = TemplatePaths::defaults(&bin_name).with_overrides(templates.unwrap_or_default());

        Self {
            description: description.unwrap_or_else(|| format!("{name} release build")),
            vendor: vendor.unwrap_or_else(|| name.clone()),
            url: url.unwrap_or_default(),
            license: license.unwrap_or_else(|| "unknown".to_owned()),
            maintainer: maintainer.unwrap_or_else(|| format!("{name} maintainers")),
            next_version: next_version.unwrap_or_else(|| DEFAULT_NEXT_VERSION.to_owned()),
            ldflags_package: ldflags_package.unwrap_or_else(|| DEFAULT_LDFLAGS_PACKAGE.to_owned()),
            bucket,
            rpm_depends: rpm_depends
                .unwrap_or_else(|| DEFAULT_RPM_DEPENDS.iter().map(|s| s.to_string()).collect()),
            targets,
            templates,
            name,
        }
    }
}

/// Which hash to compute for artifacts
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChecksumStyle {
    /// sha256sum (using the sha2 crate)
    #[default]
    #[serde(rename = "sha256")]
    Sha256,
    /// sha512sum (using the sha2 crate)
    #[serde(rename = "sha512")]
    Sha512,
}

impl ChecksumStyle {
    /// Get the name of a checksum
    pub fn ext(self) -> &'static str {
        match self {
            ChecksumStyle::Sha256 => "sha256",
            ChecksumStyle::Sha512 => "sha512",
        }
    }
}

/// Which slice of the support table to build
#[derive(Debug, Clone)]
pub struct MatrixSelection {
    /// platform selector (a name or "all")
    pub platform: String,
    /// arch selector (a name, "all", optionally prefixed with `static_`)
    pub arch: String,
    /// formats to produce; empty means "everything the platform supports"
    pub formats: Vec<PackageFormat>,
    /// build every cell statically
    pub static_all: bool,
}

/// Inputs to version resolution
#[derive(Debug, Clone, Default)]
pub struct VersionSettings {
    /// explicit version, used verbatim
    pub version: Option<String>,
    /// explicit branch
    pub branch: Option<String>,
    /// explicit commit
    pub commit: Option<String>,
    /// explicit package iteration
    pub iteration: Option<String>,
    /// release candidate number
    pub rc: Option<u32>,
    /// nightly build
    pub nightly: bool,
    /// release build (HEAD must be tagged)
    pub release: bool,
}

/// Toolchain options
#[derive(Debug, Clone, Default)]
pub struct BuildSettings {
    /// enable the race detector
    pub race: bool,
    /// wipe each output dir before building
    pub clean: bool,
    /// update dependencies before building
    pub update: bool,
    /// don't fetch dependencies at all
    pub no_get: bool,
    /// build tags, in the order given
    pub tags: Vec<String>,
}

/// Options for `--test` runs
#[derive(Debug, Clone, Default)]
pub struct TestSettings {
    /// run `go vet` first
    pub vet: bool,
    /// `-parallel` for `go test`
    pub parallel: Option<u32>,
    /// `-timeout` for `go test` (go duration syntax, e.g. `10m`)
    pub timeout: Option<String>,
}

/// Options for signing
#[derive(Debug, Clone, Default)]
pub struct SignSettings {
    /// a failure to sign fails the run
    pub required: bool,
    /// key to sign with (gpg's default key otherwise)
    pub key: Option<String>,
}

/// Options for uploading
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// `bucket[/prefix]`
    pub destination: String,
    /// replace objects that already exist
    pub overwrite: bool,
}

/// Global config for commands
#[derive(Debug, Clone)]
pub struct Config {
    /// root of the source checkout
    pub checkout: Utf8PathBuf,
    /// where binaries and packages go
    pub outdir: Utf8PathBuf,
    /// project metadata
    pub project: ProjectConfig,
    /// matrix selection
    pub selection: MatrixSelection,
    /// version resolution inputs
    pub version: VersionSettings,
    /// toolchain options
    pub build: BuildSettings,
    /// run tests instead of building
    pub test: Option<TestSettings>,
    /// produce packages after building
    pub package: bool,
    /// override the arch name OS packages are labeled with
    pub package_arch: Option<String>,
    /// sign artifacts
    pub sign: Option<SignSettings>,
    /// upload artifacts
    pub upload: Option<UploadSettings>,
    /// how many matrix cells to work on at once
    pub jobs: usize,
    /// limit on every external tool invocation
    pub timeout: Option<Duration>,
    /// hash to report for artifacts
    pub checksum: ChecksumStyle,
}

impl Config {
    /// A config that builds the host platform with no packaging
    pub fn new(checkout: Utf8PathBuf, outdir: Utf8PathBuf, project: ProjectConfig) -> Self {
        Self {
            checkout,
            outdir,
            project,
            selection: MatrixSelection {
                platform: crate::platform::host_platform(),
                arch: crate::platform::host_arch(),
                formats: vec![],
                static_all: false,
            },
            version: VersionSettings::default(),
            build: BuildSettings::default(),
            test: None,
            package: false,
            package_arch: None,
            sign: None,
            upload: None,
            jobs: default_jobs(),
            timeout: None,
            checksum: ChecksumStyle::Sha256,
        }
    }

    /// Reject combinations of settings that can't work
    ///
    /// The CLI already rejects most of these, but the library can be driven directly.
    pub fn validate(&self) -> DistResult<()> {
        let v = &self.version;
        if v.nightly && v.release {
            return Err(DistError::ConflictingFlags {
                first: "nightly",
                second: "release",
            });
        }
        if v.nightly && v.rc.is_some() {
            return Err(DistError::ConflictingFlags {
                first: "nightly",
                second: "rc",
            });
        }
        if v.branch.is_some() && v.commit.is_some() {
            return Err(DistError::ConflictingFlags {
                first: "branch",
                second: "commit",
            });
        }
        if self.build.update && self.build.no_get {
            return Err(DistError::ConflictingFlags {
                first: "update",
                second: "no-get",
            });
        }
        if self.jobs == 0 {
            return Err(DistError::InvalidConfigValue {
                key: "jobs",
                value: "0".to_owned(),
            });
        }
        if let Some(upload) = &self.upload {
            if split_destination(&upload.destination).0.is_empty() {
                return Err(DistError::InvalidConfigValue {
                    key: "bucket",
                    value: upload.destination.clone(),
                });
            }
        }
        Ok(())
    }

    /// Whether objects that already exist should be replaced
    pub fn overwrite_uploads(&self) -> bool {
        self.version.nightly || self.upload.as_ref().map(|u| u.overwrite).unwrap_or(false)
    }
}

/// Split `bucket/some/prefix` into (`bucket`, Some(`some/prefix`))
pub fn split_destination(destination: &str) -> (&str, Option<&str>) {
    let destination = destination.trim_matches('/');
    match destination.split_once('/') {
        Some((bucket, prefix)) => {
            let prefix = prefix.trim_matches('/');
            (bucket, (!prefix.is_empty()).then_some(prefix))
        }
        None => (destination, None),
    }
}

/// Number of cells to run at once by default
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
