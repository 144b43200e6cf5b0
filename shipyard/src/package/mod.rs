//! Turning compiled binaries into distributable packages
//!
//! Each cell gets staged once ([`stage`][]), and then every format the cell asks for is
//! produced from that one staging root: tarballs and zips in-process ([`archive`][]),
//! debs and rpms through fpm ([`fpm`][]).

use std::sync::OnceLock;

use camino::Utf8PathBuf;
use shipyard_schema::{Artifact, Checksum, PackageFormat};
use tracing::info;

use crate::{
    build::CompiledTarget,
    config::{ChecksumStyle, Config},
    errors::DistResult,
    process::Tools,
    tasks::{BuildMatrixEntry, BuildSpec},
    templates::Templates,
};

pub mod archive;
pub mod fpm;
pub mod stage;

use stage::PackageStager;

/// A package file we produced
#[derive(Debug)]
pub struct PackageArtifact {
    /// where it is
    pub path: Utf8PathBuf,
    /// what kind of package it is
    pub format: PackageFormat,
    /// platform of its contents
    pub platform: String,
    /// arch of its contents
    pub arch: String,
    /// version it was built at
    pub version: String,
    hash: OnceLock<String>,
}

impl PackageArtifact {
    /// Record a freshly written package
    pub fn new(
        path: Utf8PathBuf,
        format: PackageFormat,
        entry: &BuildMatrixEntry,
        version: &str,
    ) -> Self {
        Self {
            path,
            format,
            platform: entry.platform.clone(),
            arch: entry.arch.clone(),
            version: version.to_owned(),
            hash: OnceLock::new(),
        }
    }

    /// The file name
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }

    /// Hash of the file's contents, computed on first use
    pub fn content_hash(&self, style: ChecksumStyle) -> DistResult<&str> {
        if let Some(hash) = self.hash.get() {
            return Ok(hash);
        }
        let computed = generate_checksum(style, &self.path)?;
        Ok(self.hash.get_or_init(|| computed))
    }

    /// Convert to the report form
    pub fn to_report(&self, style: ChecksumStyle) -> DistResult<Artifact> {
        Ok(Artifact {
            name: self.file_name().to_owned(),
            path: self.path.to_string(),
            format: self.format,
            platform: self.platform.clone(),
            arch: self.arch.clone(),
            version: self.version.clone(),
            checksum: Some(Checksum {
                style: style.ext().to_owned(),
                value: self.content_hash(style)?.to_owned(),
            }),
        })
    }
}

/// Generate a checksum for the src_path and return it as a hex string
pub fn generate_checksum(style: ChecksumStyle, src_path: &camino::Utf8Path) -> DistResult<String> {
    info!("generating {} for {src_path}", style.ext());
    use sha2::Digest;
    use std::fmt::Write;

    let file_bytes = axoasset::LocalAsset::load_bytes(src_path)?;

    let hash = match style {
        ChecksumStyle::Sha256 => {
            let mut hasher = sha2::Sha256::new();
            hasher.update(&file_bytes);
            hasher.finalize().as_slice().to_owned()
        }
        ChecksumStyle::Sha512 => {
            let mut hasher = sha2::Sha512::new();
            hasher.update(&file_bytes);
            hasher.finalize().as_slice().to_owned()
        }
    };
    let mut output = String::with_capacity(hash.len() * 2);
    for byte in hash {
        // writing to a String can't fail
        let _ = write!(&mut output, "{byte:02x}");
    }
    Ok(output)
}

/// Produces every package a cell asks for
pub struct Packager<'a> {
    cfg: &'a Config,
    tools: &'a Tools,
    spec: &'a BuildSpec,
    stager: PackageStager<'a>,
}

impl<'a> Packager<'a> {
    /// Create a packager for a run
    pub fn new(
        cfg: &'a Config,
        tools: &'a Tools,
        spec: &'a BuildSpec,
        templates: &'a Templates,
    ) -> Self {
        Self {
            cfg,
            tools,
            spec,
            stager: PackageStager::new(cfg, spec, templates),
        }
    }

    /// Package a cell in all of its formats
    ///
    /// The staging root is shared between formats and removed when this returns.
    pub fn package_cell(
        &self,
        entry: &BuildMatrixEntry,
        binaries: &[CompiledTarget],
    ) -> DistResult<Vec<PackageArtifact>> {
        if entry.formats.is_empty() {
            return Ok(vec![]);
        }
        let root = self.stager.stage(entry, binaries)?;
        let mut artifacts = vec![];
        for &format in &entry.formats {
            let path = if format.is_os_package() {
                fpm::build_os_package(self.cfg, self.tools, self.spec, entry, &root, format)?
            } else {
                let stem = archive::archive_stem(
                    &self.cfg.project.name,
                    &self.spec.version,
                    self.spec.nightly,
                    entry.static_build,
                    &entry.platform,
                    &entry.arch,
                );
                Some(archive::build_archive(&root, format, &entry.output_dir, &stem)?)
            };
            if let Some(path) = path {
                info!("packaged {}", path);
                artifacts.push(PackageArtifact::new(path, format, entry, &self.spec.version));
            }
        }
        Ok(artifacts)
    }
}
