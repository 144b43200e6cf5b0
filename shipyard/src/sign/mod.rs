//! Artifact signing support
//!
//! Signing is best-effort unless `--sign-required` is passed: a missing gpg or a failed
//! signature is reported per artifact and the run carries on.

use shipyard_schema::{Signature, StepStatus};
use tracing::warn;

use crate::{
    config::SignSettings,
    errors::{DistError, DistResult},
    package::PackageArtifact,
    process::Tools,
};

pub mod gpg;

/// Signing providers
#[derive(Debug)]
pub struct Signing {
    gpg: Option<gpg::GpgSigner>,
    required: bool,
}

impl Signing {
    /// Setup signing
    pub fn new(tools: &Tools, settings: &SignSettings) -> DistResult<Self> {
        let gpg = match &tools.gpg {
            Some(tool) => Some(gpg::GpgSigner::new(
                tool.clone(),
                settings.key.clone(),
                gpg::GpgSigner::passphrase_from_env(),
            )),
            None if settings.required => {
                return Err(DistError::ToolMissing {
                    tool: "gpg".to_owned(),
                    help: "install gnupg or drop --sign-required".to_owned(),
                })
            }
            None => {
                warn!("gpg isn't installed, artifacts won't be signed");
                None
            }
        };
        Ok(Self {
            gpg,
            required: settings.required,
        })
    }

    /// Use a specific signer
    pub fn with_signer(gpg: Option<gpg::GpgSigner>, required: bool) -> Self {
        Self { gpg, required }
    }

    /// Sign an artifact
    ///
    /// Only returns an error if signing is required (or the run was interrupted).
    pub fn sign(&self, tools: &Tools, artifact: &PackageArtifact) -> DistResult<Signature> {
        let name = artifact.file_name().to_owned();
        let Some(signer) = &self.gpg else {
            return Ok(Signature {
                artifact: name,
                path: None,
                status: StepStatus::Skipped,
            });
        };

        let status = match signer.sign(tools.runner.as_ref(), &artifact.path) {
            Ok(path) => {
                return Ok(Signature {
                    artifact: name,
                    path: Some(path.to_string()),
                    status: StepStatus::Done,
                })
            }
            Err(DistError::Cancelled) => return Err(DistError::Cancelled),
            Err(e) if self.required => {
                return Err(DistError::SigningFailed {
                    artifact: name,
                    details: Box::new(e),
                })
            }
            Err(e @ DistError::Timeout { .. }) => {
                warn!("{e}");
                StepStatus::TimedOut
            }
            Err(e) => {
                warn!("couldn't sign {name}: {e}");
                StepStatus::Failed
            }
        };
        Ok(Signature {
            artifact: name,
            path: None,
            status,
        })
    }
}
