//! Logic for resolving/rendering templates
//!
//! Packaging needs a handful of files (init script, systemd unit, logrotate rule, sample
//! config, package hooks). Projects normally ship their own in the checkout; whatever they
//! don't ship gets rendered from the builtin templates baked into the binary.

use camino::Utf8Path;
use include_dir::{include_dir, Dir};
use minijinja::Environment;
use serde::Serialize;

use crate::errors::{DistError, DistResult};

const TEMPLATE_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");

/// Key used for looking up templates (relative path from the templates dir, minus `.j2`)
pub type TemplateId = &'static str;
/// SysV init script
pub const TEMPLATE_INIT_SCRIPT: TemplateId = "packaging/init.sh";
/// systemd unit
pub const TEMPLATE_SYSTEMD_UNIT: TemplateId = "packaging/service";
/// logrotate rule
pub const TEMPLATE_LOGROTATE: TemplateId = "packaging/logrotate";
/// sample config
pub const TEMPLATE_CONFIG: TemplateId = "packaging/config.conf";
/// hook run before install
pub const TEMPLATE_PRE_INSTALL: TemplateId = "packaging/pre-install.sh";
/// hook run after install
pub const TEMPLATE_POST_INSTALL: TemplateId = "packaging/post-install.sh";
/// hook run before removal
pub const TEMPLATE_PRE_REMOVE: TemplateId = "packaging/pre-remove.sh";
/// hook run after removal
pub const TEMPLATE_POST_REMOVE: TemplateId = "packaging/post-remove.sh";

/// Values the builtin templates can refer to
#[derive(Debug, Clone, Serialize)]
pub struct PackagingContext {
    /// package name
    pub name: String,
    /// package description
    pub description: String,
    /// the main binary's file name
    pub binary: String,
    /// where binaries are installed
    pub bin_dir: String,
    /// where logs go
    pub log_dir: String,
    /// where config lives
    pub config_dir: String,
    /// where helper scripts are installed
    pub script_dir: String,
    /// rendering for a windows archive
    pub windows: bool,
}

/// The builtin templates
#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Load + Parse templates from the binary
    pub fn new() -> DistResult<Self> {
        let mut env = Environment::new();
        env.set_debug(true);
        env.set_keep_trailing_newline(true);
        Self::load_files(&mut env, &TEMPLATE_DIR)?;
        Ok(Self { env })
    }

    /// Render a template to a string
    pub fn render(&self, key: TemplateId, val: &impl Serialize) -> DistResult<String> {
        let template = self.env.get_template(key)?;
        Ok(template.render(val)?)
    }

    /// load + parse templates from the binary (recursive)
    fn load_files(env: &mut Environment<'static>, dir: &'static Dir) -> DistResult<()> {
        for entry in dir.entries() {
            if let Some(subdir) = entry.as_dir() {
                Self::load_files(env, subdir)?;
                continue;
            }
            let Some(file) = entry.as_file() else {
                continue;
            };
            let path = Utf8Path::from_path(file.path()).ok_or_else(|| DistError::NonUtf8Path {
                path: file.path().to_owned(),
            })?;
            if path.extension().unwrap_or_default() != "j2" {
                // Skip non-jinja-templates (useful for prototyping)
                continue;
            }
            let Some(contents) = file.contents_utf8() else {
                continue;
            };
            let key = path.with_extension("");
            env.add_template_owned(key.to_string(), contents.to_owned())?;
        }
        Ok(())
    }
}
