//! Staging the filesystem tree a package is built from
//!
//! A [`StagingRoot`][] is a fresh temp dir per cell. Inside it lives the tree that
//! becomes the package (`<tmp>/<name>-<version>/...`) and, next to it, the package
//! hook scripts (which must not end up inside the tree). The whole thing is deleted
//! when the root is dropped, whether packaging worked or not.

use axoasset::LocalAsset;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::{
    build::CompiledTarget,
    config::Config,
    errors::{DistError, DistResult},
    platform::{exe_suffix, PLATFORM_WINDOWS},
    tasks::{BuildMatrixEntry, BuildSpec},
    templates::{self, PackagingContext, TemplateId, Templates},
};

/// Where binaries are installed
pub const INSTALL_BIN_DIR: &str = "usr/bin";
/// Where logrotate rules are installed
pub const LOGROTATE_DIR: &str = "etc/logrotate.d";

/// Mode for directories in the tree
pub const DIR_MODE: u32 = 0o755;
/// Mode for regular files in the tree
pub const FILE_MODE: u32 = 0o644;
/// Mode for binaries and hook scripts
pub const EXEC_MODE: u32 = 0o755;

/// How much of a filesystem a package carries
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StagingCategory {
    /// Full FHS tree: binaries, log dir, scripts, config, logrotate
    FilesystemHierarchy,
    /// Everything at the root of the archive (windows)
    FlatArchive,
    /// Just the binaries and a config file (static builds)
    ConfigOnly,
}

impl StagingCategory {
    /// Pick the category for a cell
    ///
    /// Static builds are always config-only, whatever format is being produced.
    pub fn for_entry(entry: &BuildMatrixEntry) -> Self {
        if entry.static_build {
            StagingCategory::ConfigOnly
        } else if entry.platform == PLATFORM_WINDOWS {
            StagingCategory::FlatArchive
        } else {
            StagingCategory::FilesystemHierarchy
        }
    }
}

/// Installed locations of the project's files
#[derive(Debug, Clone)]
pub struct Layout {
    /// `var/log/<name>`
    pub log_dir: Utf8PathBuf,
    /// `usr/lib/<name>/scripts`
    pub script_dir: Utf8PathBuf,
    /// `etc/<name>`
    pub config_dir: Utf8PathBuf,
    /// `etc/<name>/<name>.d`
    pub config_drop_in_dir: Utf8PathBuf,
}

impl Layout {
    /// The layout for a package called `name` (paths are relative to `/`)
    pub fn new(name: &str) -> Self {
        Self {
            log_dir: format!("var/log/{name}").into(),
            script_dir: format!("usr/lib/{name}/scripts").into(),
            config_dir: format!("etc/{name}").into(),
            config_drop_in_dir: format!("etc/{name}/{name}.d").into(),
        }
    }

    /// Every directory a filesystem-hierarchy package creates, parents first
    pub fn directories(&self) -> Vec<Utf8PathBuf> {
        vec![
            INSTALL_BIN_DIR.into(),
            self.log_dir.clone(),
            self.script_dir.clone(),
            self.config_dir.clone(),
            self.config_drop_in_dir.clone(),
            LOGROTATE_DIR.into(),
        ]
    }
}

/// Package hooks handed to fpm
#[derive(Debug, Clone, Default)]
pub struct PackageHooks {
    /// before install
    pub pre_install: Option<Utf8PathBuf>,
    /// after install
    pub post_install: Option<Utf8PathBuf>,
    /// before removal
    pub pre_remove: Option<Utf8PathBuf>,
    /// after removal
    pub post_remove: Option<Utf8PathBuf>,
}

/// A staged package tree, deleted on drop
#[derive(Debug)]
pub struct StagingRoot {
    _dir: temp_dir::TempDir,
    base: Utf8PathBuf,
    /// name of the top-level folder (`<name>-<version>`)
    pub root_name: String,
    /// the tree itself (`<base>/<root_name>`)
    pub tree: Utf8PathBuf,
    /// which layout was staged
    pub category: StagingCategory,
    /// config files inside the tree, as absolute install paths (`/etc/x/x.conf`)
    pub config_files: Vec<Utf8PathBuf>,
    /// hook scripts, outside the tree
    pub hooks: PackageHooks,
}

impl StagingRoot {
    /// Create an empty staging root
    pub fn new(root_name: &str, category: StagingCategory) -> DistResult<Self> {
        let dir = temp_dir::TempDir::new()?;
        let base = Utf8PathBuf::from_path_buf(dir.path().to_owned())
            .map_err(|path| DistError::NonUtf8Path { path })?;
        let tree = base.join(root_name);
        LocalAsset::create_dir_all(&tree)?;
        set_mode(&tree, DIR_MODE)?;
        Ok(Self {
            _dir: dir,
            base,
            root_name: root_name.to_owned(),
            tree,
            category,
            config_files: vec![],
            hooks: PackageHooks::default(),
        })
    }

    /// The temp dir holding the tree
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    fn hooks_dir(&self) -> Utf8PathBuf {
        self.base.join("hooks")
    }
}

impl Drop for StagingRoot {
    fn drop(&mut self) {
        if !self.base.exists() {
            return;
        }
        match LocalAsset::remove_dir_all(&self.base) {
            Ok(()) => debug!("removed staging dir {}", self.base),
            Err(e) => warn!("couldn't remove staging dir {}: {e}", self.base),
        }
    }
}

/// Name of the top-level folder inside packages
pub fn root_dir_name(name: &str, version: &str, nightly: bool) -> String {
    if nightly {
        format!("{name}-nightly")
    } else {
        format!("{name}-{version}")
    }
}

/// Materializes staging roots for a run
pub struct PackageStager<'a> {
    cfg: &'a Config,
    spec: &'a BuildSpec,
    templates: &'a Templates,
    layout: Layout,
}

impl<'a> PackageStager<'a> {
    /// Create a stager
    pub fn new(cfg: &'a Config, spec: &'a BuildSpec, templates: &'a Templates) -> Self {
        Self {
            layout: Layout::new(&cfg.project.name),
            cfg,
            spec,
            templates,
        }
    }

    /// Stage a cell's binaries into a fresh root
    pub fn stage(
        &self,
        entry: &BuildMatrixEntry,
        binaries: &[CompiledTarget],
    ) -> DistResult<StagingRoot> {
        let category = StagingCategory::for_entry(entry);
        let root_name = root_dir_name(&self.cfg.project.name, &self.spec.version, self.spec.nightly);
        let mut root = StagingRoot::new(&root_name, category)?;
        debug!("staging {} as {category:?} in {}", entry.label(), root.tree);

        match category {
            StagingCategory::FilesystemHierarchy => self.stage_hierarchy(&mut root, entry, binaries)?,
            StagingCategory::FlatArchive | StagingCategory::ConfigOnly => {
                self.stage_flat(&mut root, entry, binaries)?
            }
        }
        Ok(root)
    }

    fn context(&self, entry: &BuildMatrixEntry, binaries: &[CompiledTarget]) -> PackagingContext {
        let name = &self.cfg.project.name;
        let binary = binaries
            .first()
            .map(|b| b.name.clone())
            .unwrap_or_else(|| name.clone());
        PackagingContext {
            name: name.clone(),
            description: self.cfg.project.description.clone(),
            binary: format!("{binary}{}", exe_suffix(&entry.platform)),
            bin_dir: format!("/{INSTALL_BIN_DIR}"),
            log_dir: format!("/{}", self.layout.log_dir),
            config_dir: format!("/{}", self.layout.config_dir),
            script_dir: format!("/{}", self.layout.script_dir),
            windows: entry.platform == PLATFORM_WINDOWS,
        }
    }

    fn stage_hierarchy(
        &self,
        root: &mut StagingRoot,
        entry: &BuildMatrixEntry,
        binaries: &[CompiledTarget],
    ) -> DistResult<()> {
        let name = &self.cfg.project.name;
        let templates = &self.cfg.project.templates;
        let ctx = self.context(entry, binaries);

        for dir in self.layout.directories() {
            let path = root.tree.join(&dir);
            LocalAsset::create_dir_all(&path)?;
            // create_dir_all makes parents too, stamp every level we own
            let mut cur = Some(path.as_path());
            while let Some(p) = cur {
                if p == root.tree.as_path() {
                    break;
                }
                set_mode(p, DIR_MODE)?;
                cur = p.parent();
            }
        }

        for bin in binaries {
            let dest = root
                .tree
                .join(INSTALL_BIN_DIR)
                .join(bin_file_name(bin)?);
            copy_with_mode(&bin.binary_path, &dest, EXEC_MODE)?;
        }

        let script_dir = root.tree.join(&self.layout.script_dir);
        self.place(
            &templates.init_script,
            templates::TEMPLATE_INIT_SCRIPT,
            &ctx,
            &script_dir.join("init.sh"),
            FILE_MODE,
        )?;
        self.place(
            &templates.systemd_unit,
            templates::TEMPLATE_SYSTEMD_UNIT,
            &ctx,
            &script_dir.join(format!("{name}.service")),
            FILE_MODE,
        )?;
        self.place(
            &templates.logrotate,
            templates::TEMPLATE_LOGROTATE,
            &ctx,
            &root.tree.join(LOGROTATE_DIR).join(name),
            FILE_MODE,
        )?;
        let config_rel = self.layout.config_dir.join(format!("{name}.conf"));
        self.place(
            &templates.config,
            templates::TEMPLATE_CONFIG,
            &ctx,
            &root.tree.join(&config_rel),
            FILE_MODE,
        )?;

        root.config_files = vec![
            Utf8PathBuf::from("/").join(&config_rel),
            Utf8PathBuf::from("/").join(LOGROTATE_DIR).join(name),
        ];
        root.hooks = self.stage_hooks(root, &ctx)?;
        Ok(())
    }

    fn stage_flat(
        &self,
        root: &mut StagingRoot,
        entry: &BuildMatrixEntry,
        binaries: &[CompiledTarget],
    ) -> DistResult<()> {
        let name = &self.cfg.project.name;
        let templates = &self.cfg.project.templates;
        let ctx = self.context(entry, binaries);

        for bin in binaries {
            let dest = root.tree.join(bin_file_name(bin)?);
            copy_with_mode(&bin.binary_path, &dest, EXEC_MODE)?;
        }

        let config_src = if entry.platform == PLATFORM_WINDOWS
            && self.cfg.checkout.join(&templates.windows_config).exists()
        {
            &templates.windows_config
        } else {
            &templates.config
        };
        self.place(
            config_src,
            templates::TEMPLATE_CONFIG,
            &ctx,
            &root.tree.join(format!("{name}.conf")),
            FILE_MODE,
        )?;
        Ok(())
    }

    fn stage_hooks(&self, root: &StagingRoot, ctx: &PackagingContext) -> DistResult<PackageHooks> {
        let templates = &self.cfg.project.templates;
        let dir = root.hooks_dir();
        LocalAsset::create_dir_all(&dir)?;
        let hook = |src: &Utf8Path, key: TemplateId, file: &str| -> DistResult<Option<Utf8PathBuf>> {
            let dest = dir.join(file);
            self.place(src, key, ctx, &dest, EXEC_MODE)?;
            Ok(Some(dest))
        };
        Ok(PackageHooks {
            pre_install: hook(&templates.pre_install, templates::TEMPLATE_PRE_INSTALL, "pre-install.sh")?,
            post_install: hook(&templates.post_install, templates::TEMPLATE_POST_INSTALL, "post-install.sh")?,
            pre_remove: hook(&templates.pre_remove, templates::TEMPLATE_PRE_REMOVE, "pre-remove.sh")?,
            post_remove: hook(&templates.post_remove, templates::TEMPLATE_POST_REMOVE, "post-remove.sh")?,
        })
    }

    /// Copy a file from the checkout, or render the builtin template if it isn't there
    fn place(
        &self,
        checkout_rel: &Utf8Path,
        fallback: TemplateId,
        ctx: &PackagingContext,
        dest: &Utf8Path,
        mode: u32,
    ) -> DistResult<()> {
        let src = self.cfg.checkout.join(checkout_rel);
        if src.is_file() {
            copy_with_mode(&src, dest, mode)
        } else {
            debug!("{src} not found, using builtin {fallback}");
            let contents = self.templates.render(fallback, ctx)?;
            LocalAsset::write_new_all(&contents, dest)?;
            set_mode(dest, mode)
        }
    }
}

fn bin_file_name(bin: &CompiledTarget) -> DistResult<&str> {
    bin.binary_path
        .file_name()
        .ok_or_else(|| DistError::MissingBinary {
            name: bin.name.clone(),
            path: bin.binary_path.clone(),
        })
}

fn copy_with_mode(src: &Utf8Path, dest: &Utf8Path, mode: u32) -> DistResult<()> {
    if let Some(parent) = dest.parent() {
        LocalAsset::create_dir_all(parent)?;
    }
    LocalAsset::copy_file_to_file(src, dest)?;
    set_mode(dest, mode)
}

#[cfg(unix)]
fn set_mode(path: &Utf8Path, mode: u32) -> DistResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Utf8Path, _mode: u32) -> DistResult<()> {
    Ok(())
}
