//! Errors!

use camino::Utf8PathBuf;
use miette::Diagnostic;
use shipyard_schema::PackageFormat;
use thiserror::Error;

/// An alias for the common Result type for this crate
pub type DistResult<T> = std::result::Result<T, DistError>;

/// Errors shipyard can have
#[derive(Debug, Error, Diagnostic)]
pub enum DistError {
    /// random i/o error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// random axoasset error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Asset(#[from] axoasset::AxoassetError),

    /// random axoprocess error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cmd(#[from] axoprocess::AxoprocessError),

    /// random minijinja error
    #[error(transparent)]
    Jinja(#[from] minijinja::Error),

    /// A task panicked or was torn down by the runtime
    #[error("a build task died unexpectedly")]
    Join(#[from] tokio::task::JoinError),

    /// The platform isn't in the support table
    #[error("unsupported platform: {platform}")]
    #[diagnostic(help("supported platforms are: {supported}"))]
    UnsupportedPlatform {
        /// the requested platform
        platform: String,
        /// comma-separated list of what we do support
        supported: String,
    },

    /// The architecture isn't supported for the selected platform(s)
    #[error("unsupported architecture {arch} for {platform}")]
    #[diagnostic(help("{platform} supports: {supported}"))]
    UnsupportedArch {
        /// the platform selector the arch was paired with
        platform: String,
        /// the (normalized) architecture
        arch: String,
        /// comma-separated list of what we do support
        supported: String,
    },

    /// A package format was requested that none of the selected platforms can produce
    #[error("package format {format} isn't supported for {platform}")]
    UnsupportedFormat {
        /// the platform selector
        platform: String,
        /// the requested format
        format: PackageFormat,
    },

    /// Two flags that can't be used together
    #[error("--{first} and --{second} can't be used together")]
    ConflictingFlags {
        /// one flag
        first: &'static str,
        /// the other flag
        second: &'static str,
    },

    /// A release build was requested but HEAD isn't tagged
    #[error("refusing to make a release build of an untagged commit ({commit})")]
    #[diagnostic(help("tag the commit, pass --version explicitly, or drop --release"))]
    ReleaseWithoutTag {
        /// short commit hash of HEAD
        commit: String,
    },

    /// The config file couldn't be parsed
    #[error("couldn't load config from {path}")]
    #[diagnostic(help("see `shipyard help` for the supported keys"))]
    ConfigParse {
        /// path to the config file
        path: Utf8PathBuf,
        /// underlying error
        #[source]
        details: axoasset::AxoassetError,
    },

    /// A config value didn't make sense
    #[error("invalid value for {key}: {value}")]
    InvalidConfigValue {
        /// the config key or flag
        key: &'static str,
        /// what was given
        value: String,
    },

    /// A tool we can't work without isn't installed
    #[error("{tool} is required but couldn't be found")]
    #[diagnostic(help("{help}"))]
    ToolMissing {
        /// the tool's command name
        tool: String,
        /// how to get it
        help: String,
    },

    /// A tool exited with a failure code
    #[error("failed to {summary} ({status})")]
    #[diagnostic(help("{stderr}"))]
    ToolStatus {
        /// what we were trying to do
        summary: String,
        /// human readable exit status
        status: String,
        /// the tail of the tool's stderr
        stderr: String,
    },

    /// A tool ran longer than --timeout allows
    #[error("timed out after {seconds}s trying to {summary}")]
    #[diagnostic(help("raise --timeout if the tool is just slow"))]
    Timeout {
        /// what we were trying to do
        summary: String,
        /// the configured limit
        seconds: u64,
    },

    /// The run was interrupted
    #[error("interrupted")]
    Cancelled,

    /// The pipeline was driven without a tokio runtime
    #[error("no async runtime is available to run the build matrix")]
    #[diagnostic(help("enter a multi-threaded tokio runtime before calling do_build"))]
    NoRuntime,

    /// The build finished but didn't produce the binary we asked for
    #[error("building {name} succeeded but {path} doesn't exist")]
    MissingBinary {
        /// logical target name
        name: String,
        /// where we expected it
        path: Utf8PathBuf,
    },

    /// We refuse to wipe this directory when cleaning
    #[error("refusing to clean {path}")]
    #[diagnostic(help("pass an --outdir that isn't the filesystem root or the working directory"))]
    UnsafeClean {
        /// the directory
        path: Utf8PathBuf,
    },

    /// Signing was required and didn't happen
    #[error("couldn't sign {artifact}")]
    #[diagnostic(help("signing is mandatory because --sign-required was passed"))]
    SigningFailed {
        /// the artifact
        artifact: String,
        /// underlying error
        #[source]
        details: Box<DistError>,
    },

    /// An upload was attempted and failed
    #[error("couldn't upload {file} to {bucket}/{key}")]
    UploadFailed {
        /// file being uploaded
        file: String,
        /// destination bucket
        bucket: String,
        /// destination key
        key: String,
        /// underlying error
        #[source]
        details: Box<DistError>,
    },

    /// A path wasn't utf8
    #[error("non-utf8 path: {}", path.display())]
    NonUtf8Path {
        /// the path
        path: std::path::PathBuf,
    },
}
