//! Detached signatures using gpg

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::{
    errors::{DistError, DistResult},
    process::{Secret, Tool, ToolCommand, ToolRunner},
};

/// Env var holding the passphrase for the signing key
pub const PASSPHRASE_VAR: &str = "SHIPYARD_GPG_PASSPHRASE";

/// An instance of gpg, ready to sign
#[derive(Debug)]
pub struct GpgSigner {
    tool: Tool,
    key: Option<String>,
    passphrase: Option<Secret>,
}

impl GpgSigner {
    /// Make a signer
    ///
    /// Without a key gpg picks its default one. Without a passphrase gpg is on its own
    /// (agent, unprotected key, ...).
    pub fn new(tool: Tool, key: Option<String>, passphrase: Option<Secret>) -> Self {
        Self {
            tool,
            key,
            passphrase,
        }
    }

    /// Read the passphrase from the environment
    pub fn passphrase_from_env() -> Option<Secret> {
        std::env::var(PASSPHRASE_VAR)
            .ok()
            .filter(|p| !p.is_empty())
            .map(Secret::new)
    }

    /// Arguments to produce `dest` as an armored detached signature of `file`
    pub fn args(&self, file: &Utf8Path, dest: &Utf8Path) -> Vec<String> {
        let mut args: Vec<String> = ["--batch", "--yes", "--armor", "--detach-sign"]
            .map(String::from)
            .into();
        args.push("--output".to_owned());
        args.push(dest.to_string());
        if let Some(key) = &self.key {
            args.push("--local-user".to_owned());
            args.push(key.clone());
        }
        if self.passphrase.is_some() {
            args.extend(["--pinentry-mode", "loopback", "--passphrase-fd", "0"].map(String::from));
        }
        args.push(file.to_string());
        args
    }

    /// Sign a file, returning the path of the signature
    pub fn sign(&self, runner: &dyn ToolRunner, file: &Utf8Path) -> DistResult<Utf8PathBuf> {
        let dest = signature_path(file);
        let name = file.file_name().unwrap_or(file.as_str());
        info!("signing {file}");
        let mut cmd =
            ToolCommand::new(&self.tool.cmd, format!("sign {name}")).args(self.args(file, &dest));
        if let Some(passphrase) = &self.passphrase {
            cmd = cmd.stdin_secret(passphrase.clone());
        }
        runner.invoke(&cmd)?;
        if !dest.exists() {
            return Err(DistError::MissingBinary {
                name: format!("{name}.asc"),
                path: dest,
            });
        }
        Ok(dest)
    }
}

/// Where the detached signature for a file goes
pub fn signature_path(file: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{file}.asc"))
}
