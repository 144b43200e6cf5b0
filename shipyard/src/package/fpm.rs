//! deb/rpm packages via fpm
//!
//! fpm doesn't have a machine readable output mode, so the one fragile bit (finding the
//! path it wrote in its log line) is confined to [`parse_created_path`][].

use camino::{Utf8Path, Utf8PathBuf};
use shipyard_schema::PackageFormat;
use tracing::{info, warn};

use crate::{
    config::Config,
    errors::DistResult,
    platform::package_arch,
    process::{ToolCommand, Tools},
    tasks::{BuildMatrixEntry, BuildSpec},
};

use super::stage::{StagingCategory, StagingRoot};

const PATH_MARKER: &str = ":path=>\"";

/// The version string an OS package format will accept
///
/// rpm doesn't allow `-` in versions.
pub fn os_package_version(version: &str, format: PackageFormat) -> String {
    match format {
        PackageFormat::Rpm => version.replace('-', "_"),
        _ => version.to_owned(),
    }
}

/// Arguments for one fpm invocation
pub fn fpm_args(
    cfg: &Config,
    spec: &BuildSpec,
    entry: &BuildMatrixEntry,
    root: &StagingRoot,
    format: PackageFormat,
) -> Vec<String> {
    let project = &cfg.project;
    let mut args: Vec<String> = vec!["-f".into(), "-s".into(), "dir".into(), "--log".into(), "error".into()];
    let mut flag = |name: &str, val: &str| {
        args.push(name.to_owned());
        args.push(val.to_owned());
    };

    flag("--vendor", &project.vendor);
    if !project.url.is_empty() {
        flag("--url", &project.url);
    }
    flag("--license", &project.license);
    flag("--maintainer", &project.maintainer);
    flag("--description", &project.description);

    // only a real hierarchy has config files the package manager should preserve
    if root.category == StagingCategory::FilesystemHierarchy {
        for file in &root.config_files {
            flag("--config-files", file.as_str());
        }
    }
    let hooks = &root.hooks;
    if let Some(p) = &hooks.pre_install {
        flag("--before-install", p.as_str());
    }
    if let Some(p) = &hooks.post_install {
        flag("--after-install", p.as_str());
    }
    if let Some(p) = &hooks.pre_remove {
        flag("--before-remove", p.as_str());
    }
    if let Some(p) = &hooks.post_remove {
        flag("--after-remove", p.as_str());
    }

    if format == PackageFormat::Rpm {
        for dep in &project.rpm_depends {
            flag("--depends", dep);
        }
        if let Some(p) = &hooks.post_install {
            flag("--rpm-posttrans", p.as_str());
        }
    }

    let arch = cfg
        .package_arch
        .clone()
        .unwrap_or_else(|| package_arch(&entry.arch).to_owned());
    flag("--name", &project.name);
    flag("-a", &arch);
    flag("-t", format.as_str());
    flag("--version", &os_package_version(&spec.version, format));
    flag("--iteration", &spec.iteration);
    flag("-C", root.tree.as_str());
    // a trailing slash makes fpm pick its own file name inside the dir
    flag("-p", &format!("{}/", entry.output_dir));
    args
}

/// Pull the package path out of fpm's `Created package` log line
///
/// Returns None if fpm didn't print anything we recognize.
pub fn parse_created_path(output: &str) -> Option<Utf8PathBuf> {
    output.lines().rev().find_map(|line| {
        let start = line.find(PATH_MARKER)? + PATH_MARKER.len();
        let rest = &line[start..];
        let end = rest.find('"')?;
        let path = &rest[..end];
        (!path.is_empty()).then(|| Utf8PathBuf::from(path))
    })
}

/// The nightly name for a package file
///
/// `<version>-<iteration>` is only replaced where it sits right after the package name
/// (`name_1.0-1_amd64.deb`, `name-1.0-1.x86_64.rpm`), never elsewhere in the name.
/// Returns None if the file name doesn't have that shape.
pub fn nightly_file_name(file_name: &str, name: &str, version: &str, iteration: &str) -> Option<String> {
    let needle = format!("{version}-{iteration}");
    ['_', '-'].iter().find_map(|sep| {
        let prefix = format!("{name}{sep}");
        let rest = file_name.strip_prefix(&prefix)?;
        let tail = rest.strip_prefix(&needle)?;
        Some(format!("{prefix}nightly{tail}"))
    })
}

/// Build one deb/rpm
///
/// Ok(None) means fpm ran fine but we couldn't tell where it put the package.
pub fn build_os_package(
    cfg: &Config,
    tools: &Tools,
    spec: &BuildSpec,
    entry: &BuildMatrixEntry,
    root: &StagingRoot,
    format: PackageFormat,
) -> DistResult<Option<Utf8PathBuf>> {
    let fpm = tools.fpm()?;
    info!("packaging {} as {format}", entry.label());
    let cmd = ToolCommand::new(&fpm.cmd, format!("package {} as {format}", entry.label()))
        .args(fpm_args(cfg, spec, entry, root, format));
    let output = tools.runner.invoke(&cmd)?;

    let Some(path) = parse_created_path(&output.stdout).or_else(|| parse_created_path(&output.stderr))
    else {
        warn!(
            "fpm packaged {} as {format} but didn't say where it put it, leaving it out of the report",
            entry.label()
        );
        return Ok(None);
    };

    if !spec.nightly {
        return Ok(Some(path));
    }
    Ok(Some(rename_nightly(cfg, spec, &path, format)?))
}

fn rename_nightly(
    cfg: &Config,
    spec: &BuildSpec,
    path: &Utf8Path,
    format: PackageFormat,
) -> DistResult<Utf8PathBuf> {
    let Some(file_name) = path.file_name() else {
        return Ok(path.to_owned());
    };
    let version = os_package_version(&spec.version, format);
    let Some(renamed) = nightly_file_name(file_name, &cfg.project.name, &version, &spec.iteration)
    else {
        warn!("{}", unrenamed_warning(file_name, format));
        return Ok(path.to_owned());
    };
    let dest = path.with_file_name(renamed);
    std::fs::rename(path, &dest)?;
    info!("renamed {path} to {dest}");
    Ok(dest)
}

/// What we say when a nightly package keeps the name fpm gave it
pub fn unrenamed_warning(file_name: &str, format: PackageFormat) -> String {
    format!("{file_name} doesn't follow fpm's usual {format} naming, not renaming it")
}
