//! # pbsift-core
//!
//! A library for recovering captured protobuf payloads and decoding them
//! without knowing their message type up front.
//!
//! Captured files may hold raw protobuf bytes, a base64 data URI or a hex
//! dump. The pipeline:
//! - recovers the byte buffer whatever the wrapping ([`sniff`])
//! - decodes it against an ordered set of candidate schemas, keeping the
//!   first one whose body field is populated ([`schema`])
//! - walks whole directory trees, mirroring them into JSON artifacts named
//!   after the winning schema ([`batch`], [`naming`])
//!
//! ## Architecture
//!
//! - [`sniff`]: Encoding detection and the text-then-binary file strategy
//! - [`schema`]: Schema registry, trial and directed decoding
//! - [`batch`]: Directory traversal with per-file isolation
//! - [`naming`]: Deterministic output names
//! - [`raw`]: Schema-less wire dump
//! - [`compile`]: `protoc` wrapper producing descriptor sets
//! - [`storage`]: JSON key-value store for session values
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use pbsift_core::{BatchConfig, BatchProcessor, SchemaDecoder, SchemaRegistry, SchemaSpec};
//!
//! let registry = SchemaRegistry::load(".storage/schema.binpb", &SchemaSpec::defaults())?;
//! let config = BatchConfig::new(".storage/data", ".storage/proto-decoded").clean(true);
//! let report = BatchProcessor::new(config, SchemaDecoder::new(&registry)).run()?;
//!
//! println!("{} decoded, {} failed", report.succeeded(), report.failed());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! [`FileDecoder`] is the seam between traversal and decoding; the batch
//! processor drives any implementation of it.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod batch;
pub mod compile;
pub mod error;
pub mod naming;
pub mod raw;
pub mod schema;
pub mod sniff;
pub mod storage;

#[cfg(test)]
mod fixtures;

// Re-export primary types for convenience
pub use batch::{
    Artifact, BatchConfig, BatchProcessor, BatchReport, FileDecoder, FileFailure, FileOutcome,
    SchemaDecoder,
};
pub use compile::SchemaCompiler;
pub use error::{Error, Result};
pub use naming::{output_file_name, raw_output_file_name};
pub use raw::RawDecoder;
pub use schema::{AmbiguityPolicy, DecodeResult, SchemaCandidate, SchemaRegistry, SchemaSpec};
pub use sniff::{recover, recover_file, Encoding, Payload, Recovered};
pub use storage::Storage;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
