//! tarballs and zips, built in-process

use axoasset::LocalAsset;
use camino::{Utf8Path, Utf8PathBuf};
use shipyard_schema::PackageFormat;
use tracing::info;

use crate::errors::DistResult;

use super::stage::StagingRoot;

/// File name (without extension) of an archive
///
/// `<name>-<version>[-static]_<platform>_<arch>`, with `nightly` standing in for the
/// version on nightly builds.
pub fn archive_stem(
    name: &str,
    version: &str,
    nightly: bool,
    static_build: bool,
    platform: &str,
    arch: &str,
) -> String {
    let version = if nightly { "nightly" } else { version };
    let static_infix = if static_build { "-static" } else { "" };
    format!("{name}-{version}{static_infix}_{platform}_{arch}")
}

/// Extension for an archive format
pub fn archive_extension(format: PackageFormat) -> &'static str {
    match format {
        PackageFormat::Zip => ".zip",
        _ => ".tar.gz",
    }
}

/// Pack the staged tree into `dest_dir/<stem><ext>`
///
/// Everything in the archive lives under a single folder named after the staging root.
/// Any previous archive with the same name is replaced.
pub fn build_archive(
    root: &StagingRoot,
    format: PackageFormat,
    dest_dir: &Utf8Path,
    stem: &str,
) -> DistResult<Utf8PathBuf> {
    let dest = dest_dir.join(format!("{stem}{}", archive_extension(format)));
    if dest.exists() {
        LocalAsset::remove_file(&dest)?;
    }
    info!("archiving {} as {dest}", root.root_name);
    let with_root = Some(Utf8Path::new(&root.root_name));
    match format {
        PackageFormat::Zip => LocalAsset::zip_dir(&root.tree, &dest, with_root)?,
        _ => LocalAsset::tar_gz_dir(&root.tree, &dest, with_root)?,
    }
    Ok(dest)
}
