//! pbsift - Decode captured protobuf payloads without knowing their type
//!
//! This tool walks a directory of captured payloads (raw bytes, base64 data
//! URIs or hex dumps), recovers the bytes and decodes each one against an
//! ordered set of candidate message types, writing one JSON file per input.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pbsift_core::{
    AmbiguityPolicy, BatchConfig, BatchProcessor, BatchReport, FileDecoder, RawDecoder,
    SchemaCompiler, SchemaDecoder, SchemaRegistry, SchemaSpec, Storage,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

/// Decode captured protobuf payloads into JSON
#[derive(Parser, Debug)]
#[command(name = "pbsift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode every captured file by trying each registered schema
    Decode(DecodeArgs),
    /// Dump the raw wire fields of every captured file, no schema needed
    Raw(RawArgs),
    /// Compile .proto sources into a descriptor set with protoc
    Compile(CompileArgs),
    /// Show or update stored session values
    Store(StoreArgs),
}

#[derive(Args, Debug)]
struct TreeArgs {
    /// Input directory of captured payloads
    #[arg(short, long, default_value = ".storage/data")]
    input: PathBuf,

    /// Skip files and directories starting with a dot
    #[arg(long)]
    skip_hidden: bool,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[command(flatten)]
    tree: TreeArgs,

    /// Output directory for decoded JSON files
    #[arg(short, long, default_value = ".storage/proto-decoded")]
    output: PathBuf,

    /// Remove the output directory before decoding
    #[arg(long)]
    clean: bool,

    /// Compiled FileDescriptorSet holding the candidate message types
    #[arg(
        short,
        long,
        env = "PBSIFT_DESCRIPTORS",
        default_value = ".storage/schema.binpb"
    )]
    descriptors: PathBuf,

    /// Candidate schema as tag=Message[:body_field], tried in the given order
    /// (default: req=Request:body res=Response:body)
    #[arg(short, long = "schema", value_name = "TAG=MESSAGE[:BODY]")]
    schemas: Vec<SchemaSpec>,

    /// Decode every file as this tag instead of trying each schema
    #[arg(short = 't', long = "type", value_name = "TAG")]
    tag: Option<String>,

    /// What to do when several schemas decode a file plausibly
    #[arg(long, value_enum, default_value = "first")]
    ambiguity: Ambiguity,
}

#[derive(Args, Debug)]
struct RawArgs {
    #[command(flatten)]
    tree: TreeArgs,

    /// Output directory for raw dumps
    #[arg(short, long, default_value = ".storage/protoc-decoded")]
    output: PathBuf,

    /// Keep the existing output directory instead of clearing it first
    #[arg(long)]
    no_clean: bool,
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// Directory of .proto sources
    #[arg(short, long, default_value = "proto")]
    input: PathBuf,

    /// Descriptor set file to write
    #[arg(
        short,
        long,
        env = "PBSIFT_DESCRIPTORS",
        default_value = ".storage/schema.binpb"
    )]
    output: PathBuf,

    /// protoc binary to run
    #[arg(long, default_value = "protoc")]
    protoc: PathBuf,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Storage directory
    #[arg(long, env = "PBSIFT_STORAGE", default_value = ".storage")]
    dir: PathBuf,

    #[command(subcommand)]
    action: StoreAction,
}

#[derive(Subcommand, Debug)]
enum StoreAction {
    /// Print all values, or one value by key
    Show {
        /// Key to print
        key: Option<String>,
    },
    /// Merge KEY=VALUE pairs into the store (VALUE is parsed as JSON when possible)
    Set {
        /// Pairs to store
        #[arg(required = true, value_parser = parse_key_value)]
        pairs: Vec<(String, Value)>,
    },
}

/// How ambiguous trial decodes are handled
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Ambiguity {
    /// Keep the first plausible schema in declaration order
    First,
    /// Keep the first, but warn when others are plausible too
    Warn,
    /// Treat the file as undecodable when several schemas are plausible
    Reject,
}

impl From<Ambiguity> for AmbiguityPolicy {
    fn from(value: Ambiguity) -> Self {
        match value {
            Ambiguity::First => AmbiguityPolicy::FirstMatch,
            Ambiguity::Warn => AmbiguityPolicy::Warn,
            Ambiguity::Reject => AmbiguityPolicy::Reject,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    match cli.command {
        Command::Decode(args) => run_decode(&args),
        Command::Raw(args) => run_raw(&args),
        Command::Compile(args) => run_compile(&args),
        Command::Store(args) => run_store(&args),
    }
}

/// Decode a tree against the schema registry
fn run_decode(args: &DecodeArgs) -> Result<()> {
    let specs = if args.schemas.is_empty() {
        SchemaSpec::defaults()
    } else {
        args.schemas.clone()
    };

    let registry = SchemaRegistry::load(&args.descriptors, &specs).with_context(|| {
        format!(
            "Failed to load schemas from {} (run `pbsift compile` first?)",
            args.descriptors.display()
        )
    })?;
    debug!(
        "Schemas in trial order: {}",
        registry.tags().collect::<Vec<_>>().join(", ")
    );

    let mut decoder = SchemaDecoder::new(&registry).with_policy(args.ambiguity.into());
    if let Some(tag) = &args.tag {
        decoder = decoder.with_tag(tag)?;
    }

    let report = run_tree(&args.tree, &args.output, args.clean, decoder)?;
    print_summary(&report);
    Ok(())
}

/// Dump a tree as raw wire fields
fn run_raw(args: &RawArgs) -> Result<()> {
    let report = run_tree(&args.tree, &args.output, !args.no_clean, RawDecoder)?;
    print_summary(&report);
    Ok(())
}

fn run_tree<D: FileDecoder>(
    tree: &TreeArgs,
    output: &Path,
    clean: bool,
    decoder: D,
) -> Result<BatchReport> {
    if !tree.input.is_dir() {
        bail!("Input directory does not exist: {}", tree.input.display());
    }

    let config = BatchConfig::new(&tree.input, output)
        .clean(clean)
        .skip_hidden(tree.skip_hidden);

    BatchProcessor::new(config, decoder)
        .run()
        .with_context(|| format!("Failed to process {}", tree.input.display()))
}

fn print_summary(report: &BatchReport) {
    for path in &report.written {
        println!("Wrote {}", path.display());
    }
    println!(
        "Summary: {} files, {} written, {} unchanged, {} failed",
        report.files_seen,
        report.written.len(),
        report.unchanged.len(),
        report.failed()
    );
}

/// Compile .proto sources into a descriptor set
fn run_compile(args: &CompileArgs) -> Result<()> {
    let compiler = SchemaCompiler::new(&args.protoc);
    let sources = compiler
        .compile(&args.input, &args.output)
        .with_context(|| format!("Failed to compile protos in {}", args.input.display()))?;

    println!(
        "Wrote {} ({} proto file(s))",
        args.output.display(),
        sources.len()
    );
    Ok(())
}

/// Show or update the session store
fn run_store(args: &StoreArgs) -> Result<()> {
    let mut storage = Storage::new(&args.dir);

    match &args.action {
        StoreAction::Show { key: Some(key) } => match storage.get(key)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
            None => bail!("No value stored for '{}'", key),
        },
        StoreAction::Show { key: None } => {
            println!("{}", serde_json::to_string_pretty(storage.data()?)?);
        }
        StoreAction::Set { pairs } => {
            let patch: Map<String, Value> = pairs.iter().cloned().collect();
            storage.merge_save(patch)?;
            println!(
                "Saved {} value(s) to {}",
                pairs.len(),
                storage.resolve(pbsift_core::storage::DATA_FILE).display()
            );
        }
    }

    Ok(())
}

/// Parse `KEY=VALUE`, reading VALUE as JSON and falling back to a string
fn parse_key_value(s: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
