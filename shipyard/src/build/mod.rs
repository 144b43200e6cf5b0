//! Compiling Things
//!
//! One toolchain invocation per (target, cell). The Go toolchain gets the cell's
//! platform/arch through `GOOS`/`GOARCH`/`GOARM`, and the version metadata through
//! `-ldflags -X`.

use axoasset::LocalAsset;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::{
    config::{Config, TargetDecl},
    errors::{DistError, DistResult},
    platform::{exe_suffix, toolchain_arch, toolchain_arm_version},
    process::{ToolCommand, Tools},
    tasks::{BuildMatrixEntry, BuildSpec},
};

#[cfg(test)]
pub mod fake;

/// A binary the toolchain produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTarget {
    /// logical target name
    pub name: String,
    /// where it was written
    pub binary_path: Utf8PathBuf,
    /// platform it was built for
    pub platform: String,
    /// arch it was built for
    pub arch: String,
}

/// Where the binary for a target in a cell ends up
pub fn binary_path(entry: &BuildMatrixEntry, target: &TargetDecl) -> Utf8PathBuf {
    entry
        .output_dir
        .join(format!("{}{}", target.name, exe_suffix(&entry.platform)))
}

/// Build every configured target for one cell
pub fn build_cell(
    cfg: &Config,
    tools: &Tools,
    spec: &BuildSpec,
    entry: &BuildMatrixEntry,
) -> DistResult<Vec<CompiledTarget>> {
    prepare_output_dir(&entry.output_dir, spec.clean)?;

    let mut compiled = vec![];
    for target in &cfg.project.targets {
        compiled.push(build_target(cfg, tools, spec, entry, target)?);
    }
    Ok(compiled)
}

/// Build one target for one cell
pub fn build_target(
    cfg: &Config,
    tools: &Tools,
    spec: &BuildSpec,
    entry: &BuildMatrixEntry,
    target: &TargetDecl,
) -> DistResult<CompiledTarget> {
    let go = tools.go()?;
    let dest = binary_path(entry, target);
    info!("building {} for {}", target.name, entry.label());

    let cmd = ToolCommand::new(
        &go.cmd,
        format!("build {} for {}", target.name, entry.label()),
    )
    .current_dir(&cfg.checkout)
    .args(go_build_args(cfg, spec, entry, &dest, target))
    .envs(go_build_env(entry));
    tools.runner.invoke(&cmd)?;

    // a "successful" build that didn't write the file is still a failure
    if !dest.exists() {
        return Err(DistError::MissingBinary {
            name: target.name.clone(),
            path: dest,
        });
    }

    Ok(CompiledTarget {
        name: target.name.clone(),
        binary_path: dest,
        platform: entry.platform.clone(),
        arch: entry.arch.clone(),
    })
}

/// The arguments for `go build`
pub fn go_build_args(
    cfg: &Config,
    spec: &BuildSpec,
    entry: &BuildMatrixEntry,
    dest: &Utf8Path,
    target: &TargetDecl,
) -> Vec<String> {
    let mut args = vec!["build".to_owned(), "-o".to_owned(), dest.to_string()];
    if spec.race {
        args.push("-race".to_owned());
    }
    if !spec.tags.is_empty() {
        args.push("-tags".to_owned());
        args.push(spec.tags.join(","));
    }
    if entry.static_build {
        args.extend(["-a", "-installsuffix", "static"].map(String::from));
    }

    let pkg = &cfg.project.ldflags_package;
    let ldflags = format!(
        "-X {pkg}.version={} -X {pkg}.branch={} -X {pkg}.commit={}",
        spec.version, spec.branch, spec.commit
    );
    args.push("-ldflags".to_owned());
    args.push(ldflags);
    args.push(target.source.clone());
    args
}

/// The environment for `go build`
pub fn go_build_env(entry: &BuildMatrixEntry) -> Vec<(String, String)> {
    let mut env = vec![
        ("GOOS".to_owned(), entry.platform.clone()),
        ("GOARCH".to_owned(), toolchain_arch(&entry.arch).to_owned()),
    ];
    if let Some(goarm) = toolchain_arm_version(&entry.arch) {
        env.push(("GOARM".to_owned(), goarm.to_owned()));
    }
    if entry.static_build {
        env.push(("CGO_ENABLED".to_owned(), "0".to_owned()));
    }
    env
}

/// Create (or with `clean`, recreate) a cell's output directory
pub fn prepare_output_dir(dir: &Utf8Path, clean: bool) -> DistResult<()> {
    if clean && dir.exists() {
        check_safe_to_clean(dir)?;
        info!("cleaning {dir}");
        LocalAsset::remove_dir_all(dir)?;
    }
    if !dir.exists() {
        LocalAsset::create_dir_all(dir)?;
    }
    Ok(())
}

/// Refuse to wipe the filesystem root or the working directory
pub fn check_safe_to_clean(dir: &Utf8Path) -> DistResult<()> {
    let trimmed = dir.as_str().trim();
    let placeholder = matches!(trimmed, "" | "." | ".." | "./" | "/" | "~");
    let is_root = dir.parent().is_none() && dir.has_root();
    let is_cwd = match (dir.canonicalize(), std::env::current_dir()) {
        (Ok(dir), Ok(cwd)) => cwd.starts_with(&dir),
        _ => false,
    };
    if placeholder || is_root || is_cwd {
        return Err(DistError::UnsafeClean {
            path: dir.to_owned(),
        });
    }
    Ok(())
}

/// Fetch the module's dependencies before building
pub fn fetch_dependencies(cfg: &Config, tools: &Tools) -> DistResult<()> {
    if cfg.build.no_get {
        info!("skipping dependency fetch (--no-get)");
        return Ok(());
    }
    let go = tools.go()?;
    let cmd = if cfg.build.update {
        ToolCommand::new(&go.cmd, "update dependencies").args(["get", "-u", "./..."])
    } else {
        ToolCommand::new(&go.cmd, "download dependencies").args(["mod", "download"])
    };
    tools.runner.invoke(&cmd.current_dir(&cfg.checkout))?;
    Ok(())
}

/// `--test`: vet and test the module instead of building it
pub fn run_tests(cfg: &Config, tools: &Tools, spec: &BuildSpec) -> DistResult<()> {
    let go = tools.go()?;
    let settings = cfg.test.clone().unwrap_or_default();

    if settings.vet {
        let vet = ToolCommand::new(&go.cmd, "vet the module")
            .args(["vet", "./..."])
            .current_dir(&cfg.checkout);
        tools.runner.invoke(&vet)?;
    }

    let mut test = ToolCommand::new(&go.cmd, "run the test suite")
        .arg("test")
        .current_dir(&cfg.checkout);
    if spec.race {
        test = test.arg("-race");
    }
    if !spec.tags.is_empty() {
        test = test.arg("-tags").arg(spec.tags.join(","));
    }
    if let Some(parallel) = settings.parallel {
        test = test.arg("-parallel").arg(parallel.to_string());
    }
    if let Some(timeout) = &settings.timeout {
        test = test.arg("-timeout").arg(timeout);
    }
    tools.runner.invoke(&test.arg("./..."))?;
    Ok(())
}
