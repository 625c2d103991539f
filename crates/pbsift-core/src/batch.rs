//! Batch directory processing.
//!
//! [`BatchProcessor`] walks an input tree depth-first, mirrors its
//! directories under the output root and runs every regular file through
//! the pipeline:
//!
//! 1. [`recover_file`] turns the file into a byte buffer (text pass, then binary pass)
//! 2. a [`FileDecoder`] turns the buffer into an [`Artifact`]
//! 3. the artifact is written atomically next to its mirrored position
//!
//! A failure in any step only affects that file. It is logged, recorded in
//! the [`BatchReport`] and the walk continues.

use crate::error::{Error, Result};
use crate::naming::output_file_name;
use crate::schema::{AmbiguityPolicy, SchemaRegistry};
use crate::sniff::recover_file;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

/// A rendered output file, not yet written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name inside the mirrored output directory
    pub file_name: String,
    /// Complete file contents
    pub contents: String,
}

/// Turns a recovered byte buffer into an artifact.
///
/// Implementations must be deterministic per input file so re-runs target
/// the same names with the same contents.
pub trait FileDecoder: Send + Sync {
    /// Decode the bytes recovered from `path`
    fn decode_file(&self, path: &Path, bytes: &[u8]) -> Result<Artifact>;
}

/// [`FileDecoder`] backed by a [`SchemaRegistry`]
#[derive(Debug, Clone)]
pub struct SchemaDecoder<'a> {
    registry: &'a SchemaRegistry,
    explicit_tag: Option<String>,
    policy: AmbiguityPolicy,
}

impl<'a> SchemaDecoder<'a> {
    /// Creates a decoder that picks the schema per file
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            explicit_tag: None,
            policy: AmbiguityPolicy::default(),
        }
    }

    /// Decode every file as `tag` instead of looking at extensions
    pub fn with_tag(mut self, tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into().to_lowercase();
        if !self.registry.contains(&tag) {
            return Err(Error::unknown_schema(tag));
        }
        self.explicit_tag = Some(tag);
        Ok(self)
    }

    /// Sets how ambiguous trial decodes are handled
    pub fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl FileDecoder for SchemaDecoder<'_> {
    fn decode_file(&self, path: &Path, bytes: &[u8]) -> Result<Artifact> {
        let directed = self
            .registry
            .directed_tag(path, self.explicit_tag.as_deref())?;

        let result = match directed {
            Some(tag) => {
                debug!("Directed decode of {} as '{}'", path.display(), tag);
                self.registry.decode_as(&tag, bytes)?
            }
            None => self
                .registry
                .decode_any_with(bytes, self.policy)
                .ok_or_else(|| Error::schema_decode_failed(path))?,
        };

        Ok(Artifact {
            file_name: output_file_name(path, &result.tag),
            contents: result.to_json_pretty()?,
        })
    }
}

/// Configuration for one batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Root of the input tree
    pub input: PathBuf,
    /// Root of the mirrored output tree
    pub output: PathBuf,
    /// Remove the output tree before starting
    pub clean: bool,
    /// Skip files and directories whose name starts with a dot
    pub skip_hidden: bool,
}

impl BatchConfig {
    /// Creates a config with `clean` and `skip_hidden` off
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            clean: false,
            skip_hidden: false,
        }
    }

    /// Sets whether the output tree is removed first
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Sets whether hidden entries are skipped
    pub fn skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }
}

/// What happened to a successfully processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The artifact was (re)written
    Written(PathBuf),
    /// An identical artifact already existed
    Unchanged(PathBuf),
}

impl FileOutcome {
    /// Path of the artifact
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Written(p) | FileOutcome::Unchanged(p) => p,
        }
    }
}

/// A file that produced no artifact
#[derive(Debug)]
pub struct FileFailure {
    /// The input path
    pub path: PathBuf,
    /// Why it failed
    pub error: Error,
}

/// Summary of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Regular files visited
    pub files_seen: usize,
    /// Artifacts written
    pub written: Vec<PathBuf>,
    /// Artifacts already up to date
    pub unchanged: Vec<PathBuf>,
    /// Files that failed
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    /// Files that ended with an artifact on disk
    pub fn succeeded(&self) -> usize {
        self.written.len() + self.unchanged.len()
    }

    /// Files that failed
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record_failure(&mut self, path: PathBuf, err: Error) {
        error!("Failed to process {}: {}", path.display(), err);
        self.failures.push(FileFailure { path, error: err });
    }
}

/// Walks an input tree and decodes every file into a mirrored output tree
pub struct BatchProcessor<D> {
    config: BatchConfig,
    decoder: D,
}

impl<D: FileDecoder> BatchProcessor<D> {
    /// Creates a processor
    pub fn new(config: BatchConfig, decoder: D) -> Self {
        Self { config, decoder }
    }

    /// The run configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Runs the batch.
    ///
    /// Setup failures (missing input root, output root that cannot be
    /// cleaned or created) and errors that are not
    /// [`Error::is_recoverable`] are returned as errors. Per-file failures
    /// end up in the report.
    pub fn run(&self) -> Result<BatchReport> {
        let input = &self.config.input;
        let output = &self.config.output;

        if !input.is_dir() {
            return Err(Error::InputRoot {
                path: input.clone(),
            });
        }

        if self.config.clean && output.exists() {
            info!("Removing output directory: {}", output.display());
            fs::remove_dir_all(output).map_err(|e| Error::directory_remove(output, e))?;
        }
        fs::create_dir_all(output).map_err(|e| Error::directory_create(output, e))?;
        let nested_output = nested_output(input, output)?;

        info!("Processing {} -> {}", input.display(), output.display());

        let mut report = BatchReport::default();
        let walker = WalkDir::new(input)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.should_visit(e, nested_output.as_deref()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(input).to_path_buf();
                    report.record_failure(path.clone(), Error::Walk { path, source: e });
                    continue;
                }
            };

            let relative = entry.path().strip_prefix(input).unwrap_or(entry.path());

            if entry.file_type().is_dir() {
                let mirrored = output.join(relative);
                if let Err(e) = fs::create_dir_all(&mirrored) {
                    report.record_failure(
                        entry.path().to_path_buf(),
                        Error::directory_create(mirrored, e),
                    );
                }
                continue;
            }

            if !entry.file_type().is_file() {
                debug!("Skipping non-regular file: {}", entry.path().display());
                continue;
            }

            report.files_seen += 1;
            let out_dir = match relative.parent() {
                Some(parent) => output.join(parent),
                None => output.clone(),
            };

            match self.process_file(entry.path(), &out_dir) {
                Ok(FileOutcome::Written(path)) => {
                    info!("{} -> {}", entry.path().display(), path.display());
                    report.written.push(path);
                }
                Ok(FileOutcome::Unchanged(path)) => {
                    debug!("{} is up to date", path.display());
                    report.unchanged.push(path);
                }
                Err(e) if e.is_recoverable() => {
                    report.record_failure(entry.path().to_path_buf(), e)
                }
                Err(e) => return Err(e),
            }
        }

        if report.files_seen == 0 {
            warn!("No input files found in {}", input.display());
        }

        info!(
            "Processed {} files: {} written, {} unchanged, {} failed",
            report.files_seen,
            report.written.len(),
            report.unchanged.len(),
            report.failed()
        );

        Ok(report)
    }

    /// Runs a single file through recovery, decoding and writing
    pub fn process_file(&self, path: &Path, out_dir: &Path) -> Result<FileOutcome> {
        let recovered = recover_file(path)?;
        debug!(
            "Recovered {} bytes from {} ({})",
            recovered.bytes.len(),
            path.display(),
            recovered.encoding
        );

        let artifact = self.decoder.decode_file(path, &recovered.bytes)?;
        write_atomic(&out_dir.join(&artifact.file_name), artifact.contents.as_bytes())
    }

    fn should_visit(&self, entry: &DirEntry, nested_output: Option<&Path>) -> bool {
        if let Some(nested) = nested_output {
            if entry.file_type().is_dir()
                && fs::canonicalize(entry.path()).is_ok_and(|p| p == nested)
            {
                debug!("Skipping output directory: {}", entry.path().display());
                return false;
            }
        }
        !(self.config.skip_hidden && is_hidden(entry))
    }
}

/// Canonical output root when it lies strictly below the input root.
///
/// That directory is pruned from the walk so a run never reads back its own
/// artifacts. An output root equal to or above the input is not pruned.
fn nested_output(input: &Path, output: &Path) -> Result<Option<PathBuf>> {
    let input = fs::canonicalize(input).map_err(|_| Error::InputRoot {
        path: input.to_path_buf(),
    })?;
    let output = fs::canonicalize(output).map_err(|e| Error::directory_create(output, e))?;
    Ok((output != input && output.starts_with(&input)).then_some(output))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Write `contents` to `target` via a sibling `.tmp` file and a rename.
///
/// An existing file with identical contents is left alone.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<FileOutcome> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
    }

    if let Ok(existing) = fs::read(target) {
        if existing == contents {
            return Ok(FileOutcome::Unchanged(target.to_path_buf()));
        }
    }

    let mut tmp = OsString::from(target.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::file_write(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::file_write(target, e));
    }

    Ok(FileOutcome::Written(target.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::raw::RawDecoder;
    use crate::schema::SchemaSpec;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_pool(&fixtures::pool(), &SchemaSpec::defaults()).unwrap()
    }

    fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_session_and_garbage_scenario() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(input.path(), "session.bin", fixtures::response_bytes());
        write(input.path(), "garbage.bin", fixtures::garbage_bytes());

        let registry = registry();
        let processor = BatchProcessor::new(
            BatchConfig::new(input.path(), output.path()),
            SchemaDecoder::new(&registry),
        );
        let report = processor.run().unwrap();

        assert_eq!(report.files_seen, 2);
        assert_eq!(report.written, vec![output.path().join("session_RES.json")]);
        assert_eq!(report.failed(), 1);
        assert!(report.failures[0].path.ends_with("garbage.bin"));
        assert!(matches!(
            report.failures[0].error,
            Error::SchemaDecodeFailed { .. }
        ));

        let json = fs::read_to_string(output.path().join("session_RES.json")).unwrap();
        assert_eq!(json, "{\n  \"body\": \"hello\"\n}\n");
        assert!(!output.path().join("garbage_REQ.json").exists());
        assert!(!output.path().join("garbage_RES.json").exists());
    }

    #[test]
    fn test_mirrors_tree_and_mixed_encodings() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let request = fixtures::request_bytes();

        write(input.path(), "a/hex.txt", hex::encode(&request));
        write(
            input.path(),
            "a/b/uri.txt",
            format!("data:application/x-protobuf;base64,{}", STANDARD.encode(&request)),
        );
        write(input.path(), "raw.bin", &request);
        fs::create_dir_all(input.path().join("empty")).unwrap();

        let registry = registry();
        let report = BatchProcessor::new(
            BatchConfig::new(input.path(), output.path()),
            SchemaDecoder::new(&registry),
        )
        .run()
        .unwrap();

        assert_eq!(report.failed(), 0);
        assert_eq!(report.written.len(), 3);
        assert!(output.path().join("a/hex_REQ.json").is_file());
        assert!(output.path().join("a/b/uri_REQ.json").is_file());
        assert!(output.path().join("raw_REQ.json").is_file());
        assert!(output.path().join("empty").is_dir());
    }

    #[test]
    fn test_batch_isolation() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        for i in 0..4 {
            write(input.path(), &format!("ok{}.bin", i), fixtures::request_bytes());
        }
        write(input.path(), "bad.bin", fixtures::garbage_bytes());
        write(input.path(), "empty.bin", b"");

        let registry = registry();
        let report = BatchProcessor::new(
            BatchConfig::new(input.path(), output.path()),
            SchemaDecoder::new(&registry),
        )
        .run()
        .unwrap();

        assert_eq!(report.files_seen, 6);
        assert_eq!(report.written.len(), 4);
        assert_eq!(report.failed(), 2);
        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f.error, Error::EncodingUnrecognized { .. })));
        for i in 0..4 {
            assert!(output.path().join(format!("ok{}_REQ.json", i)).is_file());
        }
    }

    #[test]
    fn test_directed_decode_by_extension() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        // response bytes under a .req extension: decoded as req, no sweep
        write(input.path(), "forced.req", fixtures::response_bytes());
        write(input.path(), "broken.res", fixtures::garbage_bytes());

        let registry = registry();
        let report = BatchProcessor::new(
            BatchConfig::new(input.path(), output.path()),
            SchemaDecoder::new(&registry),
        )
        .run()
        .unwrap();

        assert!(output.path().join("forced_REQ.json").is_file());
        assert!(!output.path().join("forced_RES.json").exists());
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.failures[0].error, Error::MessageDecode { .. }));
    }

    #[test]
    fn test_explicit_tag() {
        let registry = registry();
        assert!(SchemaDecoder::new(&registry).with_tag("ack").is_err());

        let decoder = SchemaDecoder::new(&registry).with_tag("RES").unwrap();
        let artifact = decoder
            .decode_file(Path::new("x.bin"), &fixtures::request_bytes())
            .unwrap();
        assert_eq!(artifact.file_name, "x_RES.json");
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(input.path(), "session.bin", fixtures::response_bytes());
        write(input.path(), "sub/req.txt", hex::encode(fixtures::request_bytes()));

        let registry = registry();
        let processor = BatchProcessor::new(
            BatchConfig::new(input.path(), output.path()),
            SchemaDecoder::new(&registry),
        );

        let first = processor.run().unwrap();
        let before = fs::read(output.path().join("sub/req_REQ.json")).unwrap();
        let second = processor.run().unwrap();
        let after = fs::read(output.path().join("sub/req_REQ.json")).unwrap();

        assert_eq!(first.written.len(), 2);
        assert_eq!(second.written.len(), 0);
        assert_eq!(second.unchanged.len(), 2);
        assert_eq!(before, after);
    }

    #[test]
    fn test_clean_removes_stale_output() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(input.path(), "session.bin", fixtures::response_bytes());
        write(output.path(), "stale/old_RES.json", "{}");

        let registry = registry();
        BatchProcessor::new(
            BatchConfig::new(input.path(), output.path()).clean(true),
            SchemaDecoder::new(&registry),
        )
        .run()
        .unwrap();

        assert!(!output.path().join("stale").exists());
        assert!(output.path().join("session_RES.json").is_file());
    }

    #[test]
    fn test_empty_input_and_missing_root() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let out_root = output.path().join("out");

        let registry = registry();
        let report = BatchProcessor::new(
            BatchConfig::new(input.path(), &out_root),
            SchemaDecoder::new(&registry),
        )
        .run()
        .unwrap();
        assert_eq!(report.files_seen, 0);
        assert!(out_root.is_dir());

        let missing = BatchProcessor::new(
            BatchConfig::new(input.path().join("missing"), &out_root),
            SchemaDecoder::new(&registry),
        );
        assert!(matches!(missing.run(), Err(Error::InputRoot { .. })));
    }

    #[test]
    fn test_skip_hidden_and_nested_output() {
        let input = TempDir::new().unwrap();
        write(input.path(), ".cache/x.bin", fixtures::request_bytes());
        write(input.path(), ".x.bin", fixtures::request_bytes());
        write(input.path(), "y.bin", fixtures::request_bytes());
        let output = input.path().join("decoded");

        let processor = BatchProcessor::new(
            BatchConfig::new(input.path(), &output).skip_hidden(true),
            RawDecoder,
        );
        let first = processor.run().unwrap();
        assert_eq!(first.files_seen, 1);
        assert!(output.join("y_Result.txt").is_file());

        // the output tree inside the input tree is not decoded again
        let second = processor.run().unwrap();
        assert_eq!(second.files_seen, 1);
    }

    #[test]
    fn test_output_above_or_equal_to_input() {
        let root = TempDir::new().unwrap();
        let store = root.path().join("store");
        let data = store.join("data");
        write(&data, "session.bin", fixtures::response_bytes());

        let registry = registry();
        let report = BatchProcessor::new(
            BatchConfig::new(&data, &store),
            SchemaDecoder::new(&registry),
        )
        .run()
        .unwrap();
        assert_eq!(report.files_seen, 1);
        assert_eq!(report.written, vec![store.join("session_RES.json")]);

        let report = BatchProcessor::new(
            BatchConfig::new(&data, &data),
            SchemaDecoder::new(&registry),
        )
        .run()
        .unwrap();
        assert!(report.files_seen >= 1);
        assert!(report.written.contains(&data.join("session_RES.json")));
    }

    #[test]
    fn test_unnormalized_nested_output_is_pruned() {
        let root = TempDir::new().unwrap();
        write(root.path(), "session.bin", fixtures::response_bytes());
        fs::create_dir_all(root.path().join("sub")).unwrap();
        // same directory as the root, spelled differently from the output
        let input = root.path().join("sub").join("..");
        let output = root.path().join("out");

        let registry = registry();
        let processor = BatchProcessor::new(
            BatchConfig::new(&input, &output),
            SchemaDecoder::new(&registry),
        );
        let first = processor.run().unwrap();
        let second = processor.run().unwrap();

        assert_eq!(first.files_seen, 1);
        assert_eq!(second.files_seen, 1);
        assert_eq!(second.failed(), 0);
        assert!(output.join("session_RES.json").is_file());
        assert!(!output.join("out").exists());
    }

    struct FatalDecoder;

    impl FileDecoder for FatalDecoder {
        fn decode_file(&self, _path: &Path, _bytes: &[u8]) -> Result<Artifact> {
            Err(Error::EmptyRegistry)
        }
    }

    #[test]
    fn test_unrecoverable_error_stops_run() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(input.path(), "a.bin", fixtures::request_bytes());

        let result = BatchProcessor::new(BatchConfig::new(input.path(), output.path()), FatalDecoder)
            .run();
        assert!(matches!(result, Err(Error::EmptyRegistry)));
    }

    #[test]
    fn test_write_atomic_failure_leaves_no_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.json");
        // a directory in the way of the temporary file makes the write fail
        fs::create_dir_all(dir.path().join("out.json.tmp")).unwrap();

        let err = write_atomic(&target, b"{}").unwrap_err();
        assert!(matches!(err, Error::FileWrite { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn test_write_atomic() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/out.json");

        assert_eq!(
            write_atomic(&target, b"one").unwrap(),
            FileOutcome::Written(target.clone())
        );
        assert_eq!(
            write_atomic(&target, b"one").unwrap(),
            FileOutcome::Unchanged(target.clone())
        );
        assert_eq!(
            write_atomic(&target, b"two").unwrap(),
            FileOutcome::Written(target.clone())
        );
        assert_eq!(fs::read(&target).unwrap(), b"two");
        assert!(!dir.path().join("nested/out.json.tmp").exists());
    }
}
