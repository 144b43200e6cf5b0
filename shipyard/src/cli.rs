//! All the clap stuff for parsing/documenting the cli

use camino::Utf8PathBuf;
use clap::{
    builder::{PossibleValuesParser, TypedValueParser},
    Args, Parser, Subcommand, ValueEnum,
};
use shipyard_schema::PackageFormat;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Clone, Debug)]
#[clap(version, about, long_about = None)]
#[clap(args_conflicts_with_subcommands = true)]
/// Cross-compile a Go project and package it for release.
///
/// When run without a subcommand, `shipyard` will invoke the `build`
/// subcommand. See `shipyard help build` for more details.
pub struct Cli {
    /// Subcommands ("no subcommand" defaults to `build`)
    #[clap(subcommand)]
    pub command: Option<Commands>,

    /// How verbose logging should be (log level)
    #[clap(long, short)]
    #[clap(default_value_t = LevelFilter::WARN)]
    #[clap(value_parser = PossibleValuesParser::new(["off", "error", "warn", "info", "debug", "trace"]).map(|s| s.parse::<LevelFilter>().expect("possible values are valid")))]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub verbose: LevelFilter,

    /// The format of the output
    #[clap(long, short, value_enum)]
    #[clap(default_value_t = OutputFormat::Human)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub output_format: OutputFormat,

    /// Path to the config file (defaults to shipyard.toml in the checkout)
    #[clap(long)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub config: Option<Utf8PathBuf>,

    /// The source checkout to build
    #[clap(long, default_value = ".")]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub checkout: Utf8PathBuf,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Build binaries and packages
    #[clap(disable_version_flag = true)]
    Build(BuildArgs),
    /// Resolve the version and print the build matrix without building anything
    #[clap(disable_version_flag = true)]
    Plan(BuildArgs),
    /// Print the JSON schema of the run report
    #[clap(disable_version_flag = true)]
    ManifestSchema,
}

#[derive(Args, Clone, Debug)]
pub struct BuildArgs {
    /// Where binaries and packages are written
    #[clap(long, default_value = "build")]
    pub outdir: Utf8PathBuf,

    /// Package name (defaults to the config file, then the checkout's directory name)
    #[clap(long)]
    pub name: Option<String>,

    /// Architecture to build: a name, "all", or "static_<name>"
    #[clap(long)]
    pub arch: Option<String>,

    /// Platform to build: a name or "all"
    #[clap(long)]
    pub platform: Option<String>,

    /// Package formats to produce (implies --package)
    #[clap(long, value_delimiter = ',')]
    #[clap(value_parser = PossibleValuesParser::new(["tar", "zip", "deb", "rpm"]).map(|s| s.parse::<PackageFormat>().expect("possible values are valid")))]
    pub package_format: Vec<PackageFormat>,

    /// Branch to embed instead of asking git
    #[clap(long, conflicts_with = "commit")]
    pub branch: Option<String>,

    /// Commit to embed instead of asking git
    #[clap(long)]
    pub commit: Option<String>,

    /// Version to use instead of the one derived from git tags
    #[clap(long)]
    pub version: Option<String>,

    /// Package iteration (release number)
    #[clap(long)]
    pub iteration: Option<String>,

    /// Release candidate number
    #[clap(long)]
    pub rc: Option<u32>,

    /// Nightly build: date-stamped version, "nightly" file names, uploads overwrite
    #[clap(long, conflicts_with_all = ["release", "rc"])]
    pub nightly: bool,

    /// Release build: HEAD must be tagged
    #[clap(long)]
    pub release: bool,

    /// Enable the race detector
    #[clap(long)]
    pub race: bool,

    /// Wipe each output directory before building
    #[clap(long)]
    pub clean: bool,

    /// Update dependencies before building
    #[clap(long, conflicts_with = "no_get")]
    pub update: bool,

    /// Don't fetch dependencies
    #[clap(long)]
    pub no_get: bool,

    /// Run the test suite instead of building
    #[clap(long)]
    pub test: bool,

    /// Skip `go vet` when testing
    #[clap(long)]
    pub no_vet: bool,

    /// How many tests to run in parallel
    #[clap(long)]
    pub parallel: Option<u32>,

    /// Timeout for the test suite (e.g. 10m)
    #[clap(long)]
    pub test_timeout: Option<String>,

    /// Build tags
    #[clap(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Build static binaries
    #[clap(long = "static")]
    pub static_build: bool,

    /// Produce packages
    #[clap(long)]
    pub package: bool,

    /// Arch name to label OS packages with
    #[clap(long)]
    pub package_arch: Option<String>,

    /// Sign packages with gpg
    #[clap(long)]
    pub sign: bool,

    /// Fail if a package can't be signed (implies --sign)
    #[clap(long)]
    pub sign_required: bool,

    /// Key to sign with
    #[clap(long)]
    pub sign_key: Option<String>,

    /// Upload packages (and signatures)
    #[clap(long)]
    pub upload: bool,

    /// Replace objects that already exist
    #[clap(long)]
    pub overwrite: bool,

    /// Where to upload: bucket[/prefix]
    #[clap(long)]
    pub bucket: Option<String>,

    /// How many cells to build at once
    #[clap(long)]
    pub jobs: Option<usize>,

    /// Limit in seconds on every external tool invocation
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Hash to report for each package
    #[clap(long, value_enum, default_value_t = ChecksumArg::Sha256)]
    pub checksum: ChecksumArg,
}

impl Default for BuildArgs {
    fn default() -> Self {
        Self {
            outdir: Utf8PathBuf::from("build"),
            name: None,
            arch: None,
            platform: None,
            package_format: vec![],
            branch: None,
            commit: None,
            version: None,
            iteration: None,
            rc: None,
            nightly: false,
            release: false,
            race: false,
            clean: false,
            update: false,
            no_get: false,
            test: false,
            no_vet: false,
            parallel: None,
            test_timeout: None,
            tags: vec![],
            static_build: false,
            package: false,
            package_arch: None,
            sign: false,
            sign_required: false,
            sign_key: None,
            upload: false,
            overwrite: false,
            bucket: None,
            jobs: None,
            timeout: None,
            checksum: ChecksumArg::Sha256,
        }
    }
}

/// Style of output we should produce
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// Machine-readable JSON output
    Json,
}

/// Checksum style, as accepted on the command line
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ChecksumArg {
    /// sha256
    #[default]
    Sha256,
    /// sha512
    Sha512,
}

impl ChecksumArg {
    /// Convert the application version of this enum to the library version
    pub fn to_lib(self) -> shipyard::config::ChecksumStyle {
        match self {
            ChecksumArg::Sha256 => shipyard::config::ChecksumStyle::Sha256,
            ChecksumArg::Sha512 => shipyard::config::ChecksumStyle::Sha512,
        }
    }
}
