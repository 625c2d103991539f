//! Schema registry for trial decoding.
//!
//! A [`SchemaRegistry`] is an ordered list of candidate protobuf message
//! types, each with a short tag (`req`, `res`, ...) and a declared body
//! field used as a plausibility check. Candidates are resolved from a
//! compiled `FileDescriptorSet` through prost-reflect.
//!
//! ## Example
//!
//! ```no_run
//! use pbsift_core::{SchemaRegistry, SchemaSpec};
//!
//! let registry = SchemaRegistry::load("schema.binpb", &SchemaSpec::defaults())?;
//! let captured: Vec<u8> = std::fs::read("capture.bin")?;
//! if let Some(result) = registry.decode_any(&captured) {
//!     println!("{} => {}", result.tag, result.to_json_pretty()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod trial;

use crate::error::{Error, Result};
use prost_reflect::{DescriptorPool, FieldDescriptor, MessageDescriptor};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

pub use trial::{AmbiguityPolicy, DecodeResult};

/// Body field used when a spec does not name one
pub const DEFAULT_BODY_FIELD: &str = "body";

/// Declarative description of one registry entry, `tag=Message[:body_field]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSpec {
    /// Short tag, also used for directed decoding by file extension
    pub tag: String,
    /// Full or simple protobuf message name
    pub message: String,
    /// Field that must be populated for a trial decode to be accepted
    pub body_field: String,
}

impl SchemaSpec {
    /// Creates a new spec
    pub fn new(
        tag: impl Into<String>,
        message: impl Into<String>,
        body_field: impl Into<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            message: message.into(),
            body_field: body_field.into(),
        }
    }

    /// The request/response pair, tried in that order
    pub fn defaults() -> Vec<SchemaSpec> {
        vec![
            SchemaSpec::new("req", "Request", DEFAULT_BODY_FIELD),
            SchemaSpec::new("res", "Response", DEFAULT_BODY_FIELD),
        ]
    }
}

impl FromStr for SchemaSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidSchemaSpec {
            spec: s.to_string(),
        };

        let (tag, rest) = s.split_once('=').ok_or_else(invalid)?;
        let (message, body) = match rest.split_once(':') {
            Some((message, body)) => (message, body),
            None => (rest, DEFAULT_BODY_FIELD),
        };

        let (tag, message, body) = (tag.trim(), message.trim(), body.trim());
        if tag.is_empty() || message.is_empty() || body.is_empty() {
            return Err(invalid());
        }

        Ok(SchemaSpec::new(tag.to_lowercase(), message, body))
    }
}

/// A resolved registry entry
#[derive(Debug, Clone)]
pub struct SchemaCandidate {
    tag: String,
    message: MessageDescriptor,
    body_field: FieldDescriptor,
}

impl SchemaCandidate {
    /// Creates a candidate, checking that `body_field` exists on `message`
    pub fn new(tag: impl Into<String>, message: MessageDescriptor, body_field: &str) -> Result<Self> {
        let field = message
            .get_field_by_name(body_field)
            .ok_or_else(|| Error::FieldNotFound {
                message: message.full_name().to_string(),
                field: body_field.to_string(),
            })?;

        Ok(Self {
            tag: tag.into(),
            message,
            body_field: field,
        })
    }

    /// The candidate's tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The message type this candidate decodes
    pub fn message(&self) -> &MessageDescriptor {
        &self.message
    }

    /// The field checked for plausibility
    pub fn body_field(&self) -> &FieldDescriptor {
        &self.body_field
    }
}

/// Ordered, read-only set of schema candidates
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    candidates: Vec<SchemaCandidate>,
}

impl SchemaRegistry {
    /// Builds a registry from already resolved candidates.
    ///
    /// Declaration order is kept; it decides which candidate wins a trial.
    pub fn new(candidates: Vec<SchemaCandidate>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(Error::EmptyRegistry);
        }

        for (i, candidate) in candidates.iter().enumerate() {
            if candidates[..i].iter().any(|c| c.tag == candidate.tag) {
                return Err(Error::DuplicateSchema {
                    tag: candidate.tag.clone(),
                });
            }
        }

        Ok(Self { candidates })
    }

    /// Resolves `specs` against a descriptor pool
    pub fn from_pool(pool: &DescriptorPool, specs: &[SchemaSpec]) -> Result<Self> {
        let candidates = specs
            .iter()
            .map(|spec| {
                let message = resolve_message(pool, &spec.message)?;
                debug!(
                    "Registered schema '{}' -> {} (body: {})",
                    spec.tag,
                    message.full_name(),
                    spec.body_field
                );
                SchemaCandidate::new(spec.tag.clone(), message, &spec.body_field)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(candidates)
    }

    /// Resolves `specs` against an encoded `FileDescriptorSet`
    pub fn from_descriptor_set(bytes: &[u8], specs: &[SchemaSpec]) -> Result<Self> {
        let pool =
            DescriptorPool::decode(bytes).map_err(|e| Error::descriptor_build(e.to_string()))?;
        Self::from_pool(&pool, specs)
    }

    /// Reads a `FileDescriptorSet` file (as written by `protoc --descriptor_set_out`)
    pub fn load(path: impl AsRef<Path>, specs: &[SchemaSpec]) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_descriptor_set(&bytes, specs)
    }

    /// Looks up a candidate by tag
    pub fn get(&self, tag: &str) -> Option<&SchemaCandidate> {
        self.candidates.iter().find(|c| c.tag == tag)
    }

    /// True if `tag` is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    /// Tags in declaration order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.tag.as_str())
    }

    /// Candidates in declaration order
    pub fn candidates(&self) -> &[SchemaCandidate] {
        &self.candidates
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Always false for a constructed registry
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Picks the schema for a directed decode, if any.
    ///
    /// An explicit tag must be registered. Otherwise the file extension,
    /// lowercased, selects the schema when it names a registered tag.
    pub fn directed_tag(&self, path: &Path, explicit: Option<&str>) -> Result<Option<String>> {
        if let Some(tag) = explicit {
            let tag = tag.to_lowercase();
            if !self.contains(&tag) {
                return Err(Error::unknown_schema(tag));
            }
            return Ok(Some(tag));
        }

        Ok(path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .filter(|ext| self.contains(ext)))
    }
}

/// Find a message by full name, falling back to a unique simple name
fn resolve_message(pool: &DescriptorPool, name: &str) -> Result<MessageDescriptor> {
    let name = name.trim_start_matches('.');
    if let Some(message) = pool.get_message_by_name(name) {
        return Ok(message);
    }

    let mut matches: Vec<MessageDescriptor> =
        pool.all_messages().filter(|m| m.name() == name).collect();

    match matches.len() {
        0 => Err(Error::MessageNotFound {
            name: name.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::AmbiguousMessage {
            name: name.to_string(),
            candidates: matches
                .iter()
                .map(|m| m.full_name())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}
