//! Code to compute the tasks shipyard should do
//!
//! This is the heart and soul of shipyard, and ideally the [`gather_work`][] function
//! should compute every minute detail shipyard will perform ahead of time. This is done
//! with the [`BuildSpec`][] (the resolved inputs) and the list of [`BuildMatrixEntry`][]
//! cells it expands to.
//!
//! Everything in here is computed before a single toolchain process is spawned, so any
//! configuration error surfaces before anything gets built.

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use shipyard_schema::{MatrixCell, PackageFormat};
use tracing::{info, warn};

use crate::{
    config::Config,
    errors::{DistError, DistResult},
    platform::{ArchSelector, SupportTable, SELECT_ALL},
    process::Tools,
    version::{resolve_version, ResolvedVersion},
};

/// The fully resolved inputs of a run
///
/// Built exactly once per invocation and never mutated after that.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    /// version embedded in binaries and used for package names
    pub version: String,
    /// package iteration / release number
    pub iteration: String,
    /// branch embedded in binaries
    pub branch: String,
    /// commit embedded in binaries
    pub commit: String,
    /// whether the version came from the untagged fallback
    pub prerelease: bool,
    /// platform selector, normalized
    pub platform_selector: String,
    /// arch selector, normalized (static prefix removed)
    pub arch_selector: ArchSelector,
    /// race detector
    pub race: bool,
    /// statically link everything
    pub static_build: bool,
    /// build tags, deduplicated, in the order given
    pub tags: Vec<String>,
    /// clean output dirs first
    pub clean: bool,
    /// nightly build
    pub nightly: bool,
    /// release candidate number
    pub rc: Option<u32>,
}

impl BuildSpec {
    /// Combine the config with a resolved version
    pub fn new(cfg: &Config, version: ResolvedVersion) -> Self {
        let ResolvedVersion {
            version,
            iteration,
            branch,
            commit,
            prerelease,
        } = version;
        let MatrixSelection {
            platform_selector,
            arch_selector,
            static_build,
        } = MatrixSelection::new(cfg);
        Self {
            version,
            iteration,
            branch,
            commit,
            prerelease,
            platform_selector,
            static_build,
            arch_selector,
            race: cfg.build.race,
            tags: cfg
                .build
                .tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .unique()
                .map(ToOwned::to_owned)
                .collect(),
            clean: cfg.build.clean,
            nightly: cfg.version.nightly,
            rc: cfg.version.rc,
        }
    }

    /// The selectors this build was planned from
    pub fn selection(&self) -> MatrixSelection {
        MatrixSelection {
            platform_selector: self.platform_selector.clone(),
            arch_selector: self.arch_selector.clone(),
            static_build: self.static_build,
        }
    }
}

/// The platform/arch selectors of a run
///
/// Only needs the config, so the matrix can be checked before git is ever asked anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixSelection {
    /// platform selector, normalized
    pub platform_selector: String,
    /// arch selector, normalized (static prefix removed)
    pub arch_selector: ArchSelector,
    /// statically link everything
    pub static_build: bool,
}

impl MatrixSelection {
    /// Read the selectors out of the config
    pub fn new(cfg: &Config) -> Self {
        let arch_selector = ArchSelector::parse(&cfg.selection.arch);
        Self {
            platform_selector: crate::platform::normalize_platform(&cfg.selection.platform),
            static_build: cfg.selection.static_all || arch_selector.static_build,
            arch_selector,
        }
    }
}

/// One (platform, arch) cell of the build matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMatrixEntry {
    /// platform name
    pub platform: String,
    /// normalized arch name (never carries the static prefix)
    pub arch: String,
    /// statically linked
    pub static_build: bool,
    /// `<outdir>/<platform>/<arch>`, unique per cell
    pub output_dir: Utf8PathBuf,
    /// formats to package this cell as
    pub formats: Vec<PackageFormat>,
}

impl BuildMatrixEntry {
    /// Short name for logs (`linux/amd64`, `linux/static_amd64`)
    pub fn label(&self) -> String {
        if self.static_build {
            format!("{}/static_{}", self.platform, self.arch)
        } else {
            format!("{}/{}", self.platform, self.arch)
        }
    }

    /// Convert to the report form
    pub fn to_report(&self) -> MatrixCell {
        MatrixCell {
            platform: self.platform.clone(),
            arch: self.arch.clone(),
            static_build: self.static_build,
            output_dir: self.output_dir.to_string(),
            formats: self.formats.clone(),
        }
    }
}

/// Expand a [`MatrixSelection`][] against a support table
///
/// Cells come out in the table's declared order. Unknown platforms, architectures
/// and formats are errors.
pub fn plan_matrix(
    selection: &MatrixSelection,
    requested_formats: &[PackageFormat],
    outdir: &Utf8Path,
    table: &SupportTable,
) -> DistResult<Vec<BuildMatrixEntry>> {
    let platform_sel = selection.platform_selector.as_str();
    let arch_sel = &selection.arch_selector;

    let platforms = if platform_sel == SELECT_ALL {
        table.platforms().iter().collect::<Vec<_>>()
    } else {
        let Some(row) = table.platform(platform_sel) else {
            return Err(DistError::UnsupportedPlatform {
                platform: platform_sel.to_owned(),
                supported: table.platform_names(),
            });
        };
        vec![row]
    };

    let mut entries = vec![];
    for row in &platforms {
        let archs = if arch_sel.is_all() {
            row.archs.clone()
        } else if row.supports_arch(&arch_sel.arch) {
            vec![arch_sel.arch.clone()]
        } else if platform_sel == SELECT_ALL {
            // "all" platforms only means the ones that can build this arch
            continue;
        } else {
            return Err(DistError::UnsupportedArch {
                platform: row.name.clone(),
                arch: arch_sel.arch.clone(),
                supported: row.archs.join(", "),
            });
        };

        let formats = if requested_formats.is_empty() {
            row.formats.clone()
        } else {
            requested_formats
                .iter()
                .copied()
                .filter(|f| row.supports_format(*f))
                .collect()
        };
        if formats.is_empty() && !requested_formats.is_empty() && platform_sel != SELECT_ALL {
            return Err(DistError::UnsupportedFormat {
                platform: row.name.clone(),
                format: requested_formats[0],
            });
        }

        for arch in archs {
            entries.push(BuildMatrixEntry {
                output_dir: outdir.join(&row.name).join(&arch),
                platform: row.name.clone(),
                arch,
                static_build: selection.static_build,
                formats: formats.clone(),
            });
        }
    }

    if entries.is_empty() {
        return Err(DistError::UnsupportedArch {
            platform: platform_sel.to_owned(),
            arch: arch_sel.arch.clone(),
            supported: table
                .platforms()
                .iter()
                .flat_map(|p| p.archs.iter())
                .unique()
                .join(", "),
        });
    }

    // every explicitly requested format has to land somewhere
    for format in requested_formats {
        if !entries.iter().any(|e| e.formats.contains(format)) {
            return Err(DistError::UnsupportedFormat {
                platform: platform_sel.to_owned(),
                format: *format,
            });
        }
    }
    for entry in entries.iter().filter(|e| e.formats.is_empty()) {
        warn!("{} has none of the requested package formats", entry.label());
    }
    Ok(entries)
}

/// Validate the config and plan the matrix
///
/// Needs nothing but the config, so callers can reject a bad selection before any tool
/// (git included) is spawned.
pub fn plan_work(cfg: &Config) -> DistResult<Vec<BuildMatrixEntry>> {
    cfg.validate()?;
    let table = SupportTable::builtin();

    let requested: &[PackageFormat] = if cfg.package {
        &cfg.selection.formats
    } else {
        &[]
    };
    let mut matrix = plan_matrix(&MatrixSelection::new(cfg), requested, &cfg.outdir, &table)?;
    if !cfg.package {
        for entry in &mut matrix {
            entry.formats.clear();
        }
    }
    Ok(matrix)
}

/// Precompute all the work this invocation will need to do
///
/// Plans the matrix, then resolves the version. Nothing is built.
pub fn gather_work(cfg: &Config, tools: &Tools) -> DistResult<(BuildSpec, Vec<BuildMatrixEntry>)> {
    let matrix = plan_work(cfg)?;
    let version = resolve_version(cfg, tools)?;
    info!(
        "planned {} cells for {}: {}",
        matrix.len(),
        version.version,
        matrix.iter().map(|e| e.label()).join(", ")
    );
    Ok((BuildSpec::new(cfg, version), matrix))
}

/// Make sure every tool the plan can't do without is installed
pub fn check_tools(tools: &Tools, matrix: &[BuildMatrixEntry]) -> DistResult<()> {
    tools.go()?;
    if matrix
        .iter()
        .any(|e| e.formats.iter().any(|f| f.is_os_package()))
    {
        tools.fpm()?;
    }
    Ok(())
}
