#![deny(missing_docs)]

//! # shipyard-schema
//!
//! This crate exists to serialize and deserialize the run report printed by
//! `shipyard --output-format=json`. Ideally it should be reasonably forward and
//! backward compatible with different versions of this format.
//!
//! The root type of the schema is [`DistReport`][].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A local system path on the machine shipyard was run.
///
/// This is a String because when deserializing this may be a path format from a different OS!
pub type LocalPath = String;

/// A report of everything a single shipyard invocation built, packaged, signed and uploaded
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DistReport {
    /// The version of shipyard that generated this
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_version: Option<String>,
    /// The name of the package being built
    pub app_name: String,
    /// The resolved version string, as embedded in the binaries
    pub version: String,
    /// The package iteration (release number) handed to OS packages
    pub iteration: String,
    /// The branch the binaries were built from
    pub branch: String,
    /// The commit the binaries were built from
    pub commit: String,
    /// Whether the version came from the "next planned version" fallback
    #[serde(default)]
    pub prerelease: bool,
    /// Whether this was a nightly build
    #[serde(default)]
    pub nightly: bool,
    /// Every (platform, arch) cell that was planned
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matrix: Vec<MatrixCell>,
    /// Binaries the toolchain produced
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub binaries: Vec<Binary>,
    /// Packages that were produced
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    /// Outcome of signing each artifact
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<Signature>,
    /// Outcome of uploading each artifact (and signature)
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uploads: Vec<Upload>,
}

/// One (platform, arch) cell of the build matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MatrixCell {
    /// Target platform (`linux`, `darwin`, ...)
    pub platform: String,
    /// Target architecture, without any `static_` prefix
    pub arch: String,
    /// Whether the binaries are statically linked
    #[serde(default)]
    pub static_build: bool,
    /// Where this cell's binaries and packages are written
    pub output_dir: LocalPath,
    /// Package formats requested for this cell
    #[serde(default)]
    pub formats: Vec<PackageFormat>,
}

/// A compiled binary
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Binary {
    /// Logical name of the target
    pub name: String,
    /// Location on disk
    pub path: LocalPath,
    /// Target platform
    pub platform: String,
    /// Target architecture
    pub arch: String,
}

/// A package artifact
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    /// The file name of the artifact (e.g. `mytool-1.8.0_linux_amd64.tar.gz`)
    pub name: String,
    /// Location on disk
    pub path: LocalPath,
    /// Package format
    pub format: PackageFormat,
    /// Target platform
    pub platform: String,
    /// Target architecture
    pub arch: String,
    /// Version string the package was built with
    pub version: String,
    /// Content hash of the file
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
}

/// Package formats
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// gzipped tarball
    Tar,
    /// zip archive
    Zip,
    /// Debian package
    Deb,
    /// RPM package
    Rpm,
}

impl PackageFormat {
    /// All the formats, in the order they're listed in help output
    pub const ALL: [PackageFormat; 4] = [
        PackageFormat::Deb,
        PackageFormat::Rpm,
        PackageFormat::Tar,
        PackageFormat::Zip,
    ];

    /// Name of the format as it appears on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageFormat::Tar => "tar",
            PackageFormat::Zip => "zip",
            PackageFormat::Deb => "deb",
            PackageFormat::Rpm => "rpm",
        }
    }

    /// Whether this is an OS package built by the external packaging tool
    pub fn is_os_package(&self) -> bool {
        matches!(self, PackageFormat::Deb | PackageFormat::Rpm)
    }
}

impl std::fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PackageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tar" | "tar.gz" | "tgz" => Ok(PackageFormat::Tar),
            "zip" => Ok(PackageFormat::Zip),
            "deb" => Ok(PackageFormat::Deb),
            "rpm" => Ok(PackageFormat::Rpm),
            other => Err(other.to_owned()),
        }
    }
}

/// A content hash
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Checksum {
    /// The hash algorithm (`sha256` or `sha512`)
    pub style: String,
    /// Lowercase hex digest
    pub value: String,
}

/// What happened when signing an artifact
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Signature {
    /// The artifact's file name
    pub artifact: String,
    /// The detached signature, if one was produced
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<LocalPath>,
    /// The outcome
    pub status: StepStatus,
}

/// What happened when uploading a file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Upload {
    /// The uploaded file's name
    pub file: String,
    /// The bucket the file was sent to
    pub bucket: String,
    /// The object key within the bucket
    pub key: String,
    /// The outcome
    pub status: StepStatus,
}

/// Outcome of an optional per-artifact step
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// The step ran and succeeded
    Done,
    /// The step was not needed (e.g. the object already exists)
    Skipped,
    /// The step ran out of time
    TimedOut,
    /// The step failed but wasn't required
    Failed,
}

impl DistReport {
    /// Get the JSON Schema for a DistReport
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DistReport)
    }

    /// Find an artifact by file name
    pub fn artifact_by_name(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

#[test]
fn emit() {
    let schema = DistReport::json_schema();
    let json_schema = serde_json::to_value(&schema).unwrap();
    let props = json_schema["properties"].as_object().unwrap();
    for key in ["app_name", "version", "artifacts", "signatures", "uploads"] {
        assert!(props.contains_key(key), "schema is missing {key}");
    }
    let required = json_schema["required"].as_array().unwrap();
    assert!(required.iter().any(|v| v == "commit"));
}

#[test]
fn formats_parse() {
    assert_eq!("tar".parse::<PackageFormat>(), Ok(PackageFormat::Tar));
    assert_eq!("tgz".parse::<PackageFormat>(), Ok(PackageFormat::Tar));
    assert_eq!("rpm".parse::<PackageFormat>(), Ok(PackageFormat::Rpm));
    assert_eq!("msi".parse::<PackageFormat>(), Err("msi".to_owned()));
}

#[test]
fn report_round_trips_status() {
    let upload = Upload {
        file: "tool.deb".to_owned(),
        bucket: "dl".to_owned(),
        key: "nightlies/tool.deb".to_owned(),
        status: StepStatus::TimedOut,
    };
    let json = serde_json::to_string(&upload).unwrap();
    insta::assert_snapshot!(json, @r###"{"file":"tool.deb","bucket":"dl","key":"nightlies/tool.deb","status":"timed-out"}"###);
}
