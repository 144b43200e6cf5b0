//! real fake binaries, no substance, all style
//!
//! used by the test runner to reproduce as much of our builds as possible
//! without needing a Go toolchain

use axoasset::LocalAsset;
use camino::Utf8Path;

use crate::{errors::DistResult, process::ToolCommand};

/// Pretend to be `go build`: write a tiny file where `-o` points
///
/// The contents record the env and ldflags the build was handed, so tests can check them
/// by reading the "binary" back.
pub fn build_fake_binary(cmd: &ToolCommand) -> DistResult<()> {
    let Some(dest) = cmd.flag_value("-o") else {
        return Ok(());
    };
    let goos = cmd.env_value("GOOS").unwrap_or_default();
    let goarch = cmd.env_value("GOARCH").unwrap_or_default();
    let goarm = cmd.env_value("GOARM").unwrap_or("-");
    let ldflags = cmd.flag_value("-ldflags").unwrap_or_default();
    let contents = format!("#!fake {goos}/{goarch} goarm={goarm}\n{ldflags}\n");
    LocalAsset::write_new_all(&contents, Utf8Path::new(dest))?;
    Ok(())
}
