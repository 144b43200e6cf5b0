//! Details for hosting artifacts
//!
//! Artifacts (and their signatures) are pushed to `<bucket>[/<prefix>]/<file name>`.

use camino::{Utf8Path, Utf8PathBuf};
use shipyard_schema::{StepStatus, Upload};
use tracing::{info, warn};

use crate::{
    config::{split_destination, Config},
    errors::{DistError, DistResult},
    process::Tools,
};

pub mod s3;

/// Somewhere objects can be stored
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists at `key`
    fn exists(&self, bucket: &str, key: &str) -> DistResult<bool>;
    /// Store `file` at `key`
    fn put(&self, file: &Utf8Path, bucket: &str, key: &str) -> DistResult<()>;
    /// Make the object at `key` publicly readable
    fn make_public(&self, bucket: &str, key: &str) -> DistResult<()>;
}

/// Where uploads go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// the bucket
    pub bucket: String,
    /// a path inside the bucket
    pub prefix: Option<String>,
}

impl Destination {
    /// Parse `bucket[/prefix]`
    pub fn parse(destination: &str) -> Self {
        let (bucket, prefix) = split_destination(destination);
        Self {
            bucket: bucket.to_owned(),
            prefix: prefix.map(ToOwned::to_owned),
        }
    }

    /// The key a file with this name is stored under
    pub fn key_for(&self, file_name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{file_name}"),
            None => file_name.to_owned(),
        }
    }
}

/// Upload files
///
/// Existing objects are left alone unless `overwrite`. A timeout is reported for that
/// file only; any other failure ends the run.
pub fn upload_files(
    store: &dyn ObjectStore,
    dest: &Destination,
    files: &[Utf8PathBuf],
    overwrite: bool,
) -> DistResult<Vec<Upload>> {
    let mut uploads = vec![];
    for file in files {
        let name = file.file_name().unwrap_or(file.as_str()).to_owned();
        let key = dest.key_for(&name);
        let status = match upload_one(store, dest, file, &key, overwrite) {
            Ok(status) => status,
            Err(DistError::Cancelled) => return Err(DistError::Cancelled),
            Err(e @ DistError::Timeout { .. }) => {
                warn!("{e}");
                StepStatus::TimedOut
            }
            Err(e) => {
                return Err(DistError::UploadFailed {
                    file: name,
                    bucket: dest.bucket.clone(),
                    key,
                    details: Box::new(e),
                })
            }
        };
        uploads.push(Upload {
            file: name,
            bucket: dest.bucket.clone(),
            key,
            status,
        });
    }
    Ok(uploads)
}

fn upload_one(
    store: &dyn ObjectStore,
    dest: &Destination,
    file: &Utf8Path,
    key: &str,
    overwrite: bool,
) -> DistResult<StepStatus> {
    if !overwrite && store.exists(&dest.bucket, key)? {
        info!("{}/{key} already exists, skipping", dest.bucket);
        return Ok(StepStatus::Skipped);
    }
    info!("uploading {file} to {}/{key}", dest.bucket);
    store.put(file, &dest.bucket, key)?;
    store.make_public(&dest.bucket, key)?;
    Ok(StepStatus::Done)
}

/// Do hosting
///
/// Without the aws cli the whole step is skipped with a warning.
pub fn do_upload(cfg: &Config, tools: &Tools, files: &[Utf8PathBuf]) -> DistResult<Vec<Upload>> {
    let Some(settings) = &cfg.upload else {
        return Ok(vec![]);
    };
    let dest = Destination::parse(&settings.destination);
    let Some(aws) = &tools.aws else {
        warn!("the aws cli isn't installed, skipping upload");
        return Ok(files
            .iter()
            .map(|file| {
                let name = file.file_name().unwrap_or(file.as_str()).to_owned();
                Upload {
                    key: dest.key_for(&name),
                    file: name,
                    bucket: dest.bucket.clone(),
                    status: StepStatus::Skipped,
                }
            })
            .collect());
    };
    let store = s3::AwsCliStore::new(aws.clone(), tools.runner.clone());
    upload_files(&store, &dest, files, cfg.overwrite_uploads())
}
