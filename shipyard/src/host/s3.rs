//! S3 through the aws cli

use std::sync::Arc;

use camino::Utf8Path;

use crate::{
    errors::{DistError, DistResult},
    process::{stderr_tail, Tool, ToolCommand, ToolRunner},
};

use super::ObjectStore;

/// An S3 bucket, reached by shelling out to `aws`
///
/// Credentials are whatever the aws cli picks up from its environment.
pub struct AwsCliStore {
    aws: Tool,
    runner: Arc<dyn ToolRunner>,
}

impl AwsCliStore {
    /// Make a store
    pub fn new(aws: Tool, runner: Arc<dyn ToolRunner>) -> Self {
        Self { aws, runner }
    }

    fn cmd(&self, summary: String) -> ToolCommand {
        ToolCommand::new(&self.aws.cmd, summary)
    }
}

impl ObjectStore for AwsCliStore {
    fn exists(&self, bucket: &str, key: &str) -> DistResult<bool> {
        let cmd = self
            .cmd(format!("check for {bucket}/{key}"))
            .args(["s3api", "head-object", "--bucket", bucket, "--key", key])
            .check(false);
        let output = self.runner.execute(&cmd)?;
        if output.success() {
            return Ok(true);
        }
        // only a 404 means the object is missing
        if output.stderr.contains("(404)") || output.stderr.contains("Not Found") {
            return Ok(false);
        }
        Err(DistError::ToolStatus {
            summary: cmd.summary,
            status: output.status_string(),
            stderr: stderr_tail(&output.stderr),
        })
    }

    fn put(&self, file: &Utf8Path, bucket: &str, key: &str) -> DistResult<()> {
        let cmd = self
            .cmd(format!("upload {file} to {bucket}/{key}"))
            .args(["s3", "cp"])
            .arg(file.as_str())
            .arg(format!("s3://{bucket}/{key}"));
        self.runner.invoke(&cmd)?;
        Ok(())
    }

    fn make_public(&self, bucket: &str, key: &str) -> DistResult<()> {
        let cmd = self
            .cmd(format!("make {bucket}/{key} public"))
            .args(["s3api", "put-object-acl", "--bucket", bucket, "--key", key])
            .args(["--acl", "public-read"]);
        self.runner.invoke(&cmd)?;
        Ok(())
    }
}
