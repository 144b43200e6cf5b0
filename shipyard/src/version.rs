//! Working out what version we're building
//!
//! Precedence is: an explicit `--version`, then an exact tag on HEAD, then the configured
//! "next version" plus the short commit. Git failing is never fatal, it just pushes us
//! down to the fallback.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::{
    config::Config,
    errors::{DistError, DistResult},
    process::{Tools, ToolCommand},
};

/// Placeholder when git can't tell us something
pub const UNKNOWN: &str = "unknown";

/// The version/branch/commit a build will embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// version string (already normalized, with any rc/nightly suffix)
    pub version: String,
    /// package iteration
    pub iteration: String,
    /// branch name
    pub branch: String,
    /// full commit hash
    pub commit: String,
    /// whether this came from the untagged fallback
    pub prerelease: bool,
}

/// Normalize a tag into a package version
///
/// Strips one leading `v` and turns `-`/`_` into `~` so package managers sort
/// pre-releases before the release. Running it on its own output changes nothing, unless
/// the tag started with `vv`: only the first `v` goes each time.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    let tag = tag.strip_prefix('v').unwrap_or(tag);
    tag.replace(['-', '_'], "~")
}

/// Queries git
pub struct GitQuery<'a> {
    tools: &'a Tools,
    checkout: &'a camino::Utf8Path,
}

impl<'a> GitQuery<'a> {
    /// Query the checkout with whatever git we found
    pub fn new(tools: &'a Tools, checkout: &'a camino::Utf8Path) -> Self {
        Self { tools, checkout }
    }

    fn run(&self, summary: &str, args: &[&str]) -> Option<String> {
        let git = self.tools.git.as_ref()?;
        let cmd = ToolCommand::new(&git.cmd, summary)
            .args(args.iter().copied())
            .current_dir(self.checkout)
            .check(false)
            .log(false);
        match self.tools.runner.execute(&cmd) {
            Ok(output) if output.success() => {
                let line = output.stdout.lines().next().unwrap_or_default().trim();
                (!line.is_empty()).then(|| line.to_owned())
            }
            Ok(_) => None,
            Err(e) => {
                warn!("couldn't {summary}: {e}");
                None
            }
        }
    }

    /// The tag pointing exactly at HEAD, if there is one
    pub fn exact_tag(&self) -> Option<String> {
        self.run(
            "look for a tag on HEAD",
            &["describe", "--exact-match", "--tags", "HEAD"],
        )
    }

    /// Current branch name
    pub fn branch(&self) -> Option<String> {
        self.run(
            "get the current branch",
            &["rev-parse", "--abbrev-ref", "HEAD"],
        )
    }

    /// Full commit hash of HEAD
    pub fn commit(&self) -> Option<String> {
        self.run("get the current commit", &["rev-parse", "HEAD"])
    }

    /// Short commit hash of HEAD
    pub fn short_commit(&self) -> Option<String> {
        self.run("get the short commit", &["rev-parse", "--short", "HEAD"])
    }
}

/// Resolve the version, branch and commit for this run
pub fn resolve_version(cfg: &Config, tools: &Tools) -> DistResult<ResolvedVersion> {
    if tools.git.is_none() {
        warn!("git not found, version/branch/commit will fall back to defaults");
    }
    let git = GitQuery::new(tools, &cfg.checkout);
    let settings = &cfg.version;

    let branch = settings
        .branch
        .clone()
        .or_else(|| git.branch())
        .unwrap_or_else(|| UNKNOWN.to_owned());
    let commit = settings
        .commit
        .clone()
        .or_else(|| git.commit())
        .unwrap_or_else(|| UNKNOWN.to_owned());

    let (mut version, prerelease) = if let Some(version) = &settings.version {
        info!("using explicit version {version}");
        (version.clone(), false)
    } else if let Some(tag) = git.exact_tag() {
        let version = normalize_tag(&tag);
        info!("HEAD is tagged {tag}, building version {version}");
        (version, false)
    } else {
        let short = settings
            .commit
            .as_deref()
            .map(|c| c.chars().take(7).collect())
            .or_else(|| git.short_commit())
            .unwrap_or_else(|| UNKNOWN.to_owned());
        if settings.release {
            return Err(DistError::ReleaseWithoutTag { commit: short });
        }
        let version = format!("{}~{short}", cfg.project.next_version);
        info!("HEAD isn't tagged, building pre-release version {version}");
        (version, true)
    };

    let mut iteration = "1".to_owned();
    if let Some(rc) = settings.rc {
        version = format!("{version}rc{rc}");
        iteration = format!("0.rc{rc}");
    }
    if settings.nightly {
        version = format!("{version}.n{}", build_epoch());
        iteration = "0".to_owned();
    }
    if let Some(explicit) = &settings.iteration {
        iteration = explicit.clone();
    }

    Ok(ResolvedVersion {
        version,
        iteration,
        branch,
        commit,
        prerelease,
    })
}

/// Seconds since the epoch for nightly versions
///
/// `SOURCE_DATE_EPOCH` wins so reproducible builds get reproducible versions.
pub fn build_epoch() -> u64 {
    if let Some(epoch) = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|e| e.trim().parse().ok())
    {
        return epoch;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
