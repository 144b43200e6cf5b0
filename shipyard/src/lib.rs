#![deny(missing_docs)]
#![allow(clippy::result_large_err)]

//! # shipyard
//!
//! This is the library at the core of the `shipyard` CLI. It currently mostly exists
//! for the sake of internal documentation/testing, and isn't intended to be used by anyone else.
//!
//! A run goes: resolve the version, plan the (platform, arch) matrix, compile every cell,
//! stage and package each cell in its requested formats, then optionally sign and upload
//! the packages. Cells are independent and run on a bounded pool; everything after the
//! matrix runs on the calling thread.

use std::sync::Arc;

use camino::Utf8PathBuf;
use shipyard_schema::{Binary, DistReport, StepStatus};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use build::CompiledTarget;
use config::Config;
use errors::*;
use package::{PackageArtifact, Packager};
use process::Tools;
pub use tasks::*;
use templates::Templates;

pub mod build;
pub mod config;
pub mod errors;
pub mod host;
pub mod package;
pub mod platform;
pub mod process;
pub mod sign;
pub mod summary;
pub mod tasks;
pub mod templates;
#[cfg(test)]
mod tests;
pub mod version;

/// shipyard build -- actually build binaries and packages!
///
/// Must be called with a multi-threaded tokio runtime entered, but not from inside async code.
pub fn do_build(cfg: &Config, tools: &Tools, cancel: &CancellationToken) -> DistResult<DistReport> {
    let (spec, matrix) = gather_work(cfg, tools)?;
    check_tools(tools, &matrix)?;
    build::fetch_dependencies(cfg, tools)?;

    if cfg.test.is_some() {
        build::run_tests(cfg, tools, &spec)?;
        return build_report(cfg, &spec, &matrix, &[], vec![], vec![]);
    }

    let handle = tokio::runtime::Handle::try_current().map_err(|_| DistError::NoRuntime)?;
    let ctx = Arc::new(CellContext {
        cfg: cfg.clone(),
        tools: tools.clone(),
        spec: spec.clone(),
        templates: Templates::new()?,
    });
    let cells = handle.block_on(run_matrix(ctx, matrix.clone(), cancel.clone()))?;

    let mut signatures = vec![];
    let mut upload_files = vec![];
    let artifacts = cells.iter().flat_map(|c| c.artifacts.iter()).collect::<Vec<_>>();
    if let Some(settings) = &cfg.sign {
        let signing = sign::Signing::new(tools, settings)?;
        for artifact in &artifacts {
            let signature = signing.sign(tools, artifact)?;
            upload_files.push(artifact.path.clone());
            if let Some(path) = &signature.path {
                upload_files.push(Utf8PathBuf::from(path));
            }
            signatures.push(signature);
        }
    } else {
        upload_files.extend(artifacts.iter().map(|a| a.path.clone()));
    }

    let uploads = host::do_upload(cfg, tools, &upload_files)?;
    report_skipped_uploads(&uploads);

    build_report(cfg, &spec, &matrix, &cells, signatures, uploads)
}

/// Just compute the plan (version and matrix) without building anything
pub fn do_plan(cfg: &Config, tools: &Tools) -> DistResult<DistReport> {
    let (spec, matrix) = gather_work(cfg, tools)?;
    build_report(cfg, &spec, &matrix, &[], vec![], vec![])
}

/// What one matrix cell produced
#[derive(Debug)]
pub struct CellOutput {
    /// compiled binaries
    pub binaries: Vec<CompiledTarget>,
    /// packages
    pub artifacts: Vec<PackageArtifact>,
}

/// Everything a cell needs, shared by all the workers
struct CellContext {
    cfg: Config,
    tools: Tools,
    spec: BuildSpec,
    templates: Templates,
}

/// Compile, stage and package a single cell
fn run_cell(ctx: &CellContext, entry: &BuildMatrixEntry) -> DistResult<CellOutput> {
    let binaries = build::build_cell(&ctx.cfg, &ctx.tools, &ctx.spec, entry)?;
    let artifacts = if ctx.cfg.package {
        Packager::new(&ctx.cfg, &ctx.tools, &ctx.spec, &ctx.templates)
            .package_cell(entry, &binaries)?
    } else {
        vec![]
    };
    Ok(CellOutput {
        binaries,
        artifacts,
    })
}

/// Run every cell, at most `jobs` at a time
///
/// The first failure cancels the run: no new cells start and tools that are still running
/// get killed. Results come back in matrix order.
async fn run_matrix(
    ctx: Arc<CellContext>,
    matrix: Vec<BuildMatrixEntry>,
    cancel: CancellationToken,
) -> DistResult<Vec<CellOutput>> {
    let permits = Arc::new(Semaphore::new(ctx.cfg.jobs));
    let mut set = JoinSet::new();
    for (idx, entry) in matrix.into_iter().enumerate() {
        let ctx = ctx.clone();
        let permits = permits.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let permit = tokio::select! {
                permit = permits.acquire_owned() => permit.ok(),
                _ = cancel.cancelled() => None,
            };
            let Some(permit) = permit else {
                return (idx, Err(DistError::Cancelled));
            };
            if cancel.is_cancelled() {
                return (idx, Err(DistError::Cancelled));
            }
            let res = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                run_cell(&ctx, &entry)
            })
            .await;
            (idx, res.map_err(DistError::from).and_then(|r| r))
        });
    }

    let mut outputs = vec![];
    let mut failure: Option<DistError> = None;
    while let Some(joined) = set.join_next().await {
        let res = match joined {
            Ok((idx, res)) => res.map(|out| (idx, out)),
            Err(e) => Err(DistError::from(e)),
        };
        match res {
            Ok(out) => outputs.push(out),
            Err(e) => {
                cancel.cancel();
                // keep the error that started it, not the cancellations it caused
                let replace = match &failure {
                    None => true,
                    Some(DistError::Cancelled) => !matches!(e, DistError::Cancelled),
                    Some(_) => false,
                };
                if replace {
                    failure = Some(e);
                }
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    outputs.sort_by_key(|(idx, _)| *idx);
    Ok(outputs.into_iter().map(|(_, out)| out).collect())
}

fn report_skipped_uploads(uploads: &[shipyard_schema::Upload]) {
    let timed_out = uploads
        .iter()
        .filter(|u| u.status == StepStatus::TimedOut)
        .count();
    if timed_out > 0 {
        warn!("{timed_out} uploads timed out");
    }
}

fn build_report(
    cfg: &Config,
    spec: &BuildSpec,
    matrix: &[BuildMatrixEntry],
    cells: &[CellOutput],
    signatures: Vec<shipyard_schema::Signature>,
    uploads: Vec<shipyard_schema::Upload>,
) -> DistResult<DistReport> {
    let binaries = cells
        .iter()
        .flat_map(|c| c.binaries.iter())
        .map(|b| Binary {
            name: b.name.clone(),
            path: b.binary_path.to_string(),
            platform: b.platform.clone(),
            arch: b.arch.clone(),
        })
        .collect();
    let mut artifacts = vec![];
    for artifact in cells.iter().flat_map(|c| c.artifacts.iter()) {
        artifacts.push(artifact.to_report(cfg.checksum)?);
    }
    info!("{} binaries, {} packages", cells.iter().map(|c| c.binaries.len()).sum::<usize>(), artifacts.len());

    Ok(DistReport {
        dist_version: Some(env!("CARGO_PKG_VERSION").to_owned()),
        app_name: cfg.project.name.clone(),
        version: spec.version.clone(),
        iteration: spec.iteration.clone(),
        branch: spec.branch.clone(),
        commit: spec.commit.clone(),
        prerelease: spec.prerelease,
        nightly: spec.nightly,
        matrix: matrix.iter().map(|e| e.to_report()).collect(),
        binaries,
        artifacts,
        signatures,
        uploads,
    })
}
