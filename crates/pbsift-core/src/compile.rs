//! Thin wrapper around `protoc` for producing descriptor sets.
//!
//! The registry consumes a `FileDescriptorSet`; this module compiles a
//! directory of `.proto` sources into one with
//! `protoc --include_imports --descriptor_set_out`.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Default compiler binary, looked up on `PATH`
pub const DEFAULT_PROTOC: &str = "protoc";

/// Invokes an external `protoc`
#[derive(Debug, Clone)]
pub struct SchemaCompiler {
    protoc: PathBuf,
}

impl Default for SchemaCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOC)
    }
}

impl SchemaCompiler {
    /// Creates a compiler using the given `protoc` binary
    pub fn new(protoc: impl Into<PathBuf>) -> Self {
        Self {
            protoc: protoc.into(),
        }
    }

    /// The configured binary
    pub fn protoc(&self) -> &Path {
        &self.protoc
    }

    /// Checks that `protoc` can be started and returns its version line
    pub fn check(&self) -> Result<String> {
        let output = Command::new(&self.protoc)
            .arg("--version")
            .output()
            .map_err(|source| Error::ToolchainUnavailable {
                program: self.protoc.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::ToolchainFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Compiles every `.proto` file under `input_dir` into `output_file`,
    /// returning the sources that went in
    pub fn compile(&self, input_dir: &Path, output_file: &Path) -> Result<Vec<PathBuf>> {
        let sources = collect_proto_files(input_dir)?;
        let version = self.check()?;
        debug!("Using {}", version);

        if let Some(dir) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| Error::directory_create(dir, e))?;
        }

        let mut command = Command::new(&self.protoc);
        command
            .arg("--include_imports")
            .arg(format!("--descriptor_set_out={}", output_file.display()))
            .arg("-I")
            .arg(input_dir)
            .args(&sources);

        debug!("Running {:?}", command);
        let output = command.output().map_err(|source| Error::ToolchainUnavailable {
            program: self.protoc.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(Error::ToolchainFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(
            "Compiled {} proto file(s) into {}",
            sources.len(),
            output_file.display()
        );
        Ok(sources)
    }
}

/// All `.proto` files below `dir`, sorted
pub fn collect_proto_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::InputRoot {
            path: dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "proto").unwrap_or(false))
        .collect();

    if files.is_empty() {
        return Err(Error::NoProtoFiles {
            path: dir.to_path_buf(),
        });
    }

    files.sort();
    Ok(files)
}
