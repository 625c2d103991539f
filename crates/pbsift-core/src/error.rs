//! Error types for the pbsift-core library.
//!
//! Every failure the decode pipeline can hit is a variant of [`Error`].
//! [`Error::is_recoverable`] separates failures confined to one input file
//! from setup failures that stop a batch.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pbsift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all pbsift operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove an existing output tree
    #[error("failed to remove directory '{path}': {source}")]
    DirectoryRemove {
        /// Path to the directory that failed to be removed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The batch input root is missing or not a directory
    #[error("input root '{path}' is not a readable directory")]
    InputRoot {
        /// The offending input root
        path: PathBuf,
    },

    /// Directory traversal failed below the input root
    #[error("failed to walk '{path}': {source}")]
    Walk {
        /// Path that could not be visited
        path: PathBuf,
        /// Underlying walkdir error
        #[source]
        source: walkdir::Error,
    },

    /// Neither the text nor the binary pass produced a usable byte buffer
    #[error("unrecognized encoding in '{path}'")]
    EncodingUnrecognized {
        /// The unsupported input file
        path: PathBuf,
    },

    /// No registered schema decoded the buffer plausibly
    #[error("no schema plausibly decodes '{path}'")]
    SchemaDecodeFailed {
        /// The input file that matched nothing
        path: PathBuf,
    },

    /// A directed decode against one schema failed
    #[error("failed to decode as '{tag}': {source}")]
    MessageDecode {
        /// Tag of the schema that was tried
        tag: String,
        /// Underlying protobuf decode error
        #[source]
        source: prost::DecodeError,
    },

    /// A tag was requested that is not in the registry
    #[error("unknown schema tag '{tag}'")]
    UnknownSchema {
        /// The requested tag
        tag: String,
    },

    /// The same tag was registered twice
    #[error("schema tag '{tag}' is registered more than once")]
    DuplicateSchema {
        /// The duplicated tag
        tag: String,
    },

    /// A schema specification string could not be parsed
    #[error("invalid schema spec '{spec}': expected tag=Message[:body_field]")]
    InvalidSchemaSpec {
        /// The offending spec
        spec: String,
    },

    /// A message type could not be resolved in the descriptor pool
    #[error("message type '{name}' not found in descriptor set")]
    MessageNotFound {
        /// Requested message name
        name: String,
    },

    /// A simple message name matches several full names
    #[error("message name '{name}' is ambiguous: {candidates}")]
    AmbiguousMessage {
        /// Requested message name
        name: String,
        /// Comma separated full names that matched
        candidates: String,
    },

    /// The declared body field does not exist on the message
    #[error("message '{message}' has no field named '{field}'")]
    FieldNotFound {
        /// Full message name
        message: String,
        /// Missing field name
        field: String,
    },

    /// The registry would contain no candidates
    #[error("schema registry is empty")]
    EmptyRegistry,

    /// Failed to build a descriptor pool with prost-reflect
    #[error("failed to build descriptor pool: {0}")]
    DescriptorBuild(String),

    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// JSON rendering or parsing failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The external schema compiler could not be started
    #[error("schema compiler '{program}' is not available: {source}")]
    ToolchainUnavailable {
        /// Program that was invoked
        program: PathBuf,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// The external schema compiler ran but reported failure
    #[error("schema compiler exited with {status}: {stderr}")]
    ToolchainFailed {
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// No `.proto` sources were found for compilation
    #[error("no .proto files found in '{path}'")]
    NoProtoFiles {
        /// Directory that was searched
        path: PathBuf,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory removal error
    pub fn directory_remove(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryRemove {
            path: path.into(),
            source,
        }
    }

    /// Creates a new unrecognized encoding error
    pub fn encoding_unrecognized(path: impl Into<PathBuf>) -> Self {
        Self::EncodingUnrecognized { path: path.into() }
    }

    /// Creates a new schema decode failure
    pub fn schema_decode_failed(path: impl Into<PathBuf>) -> Self {
        Self::SchemaDecodeFailed { path: path.into() }
    }

    /// Creates a new unknown schema error
    pub fn unknown_schema(tag: impl Into<String>) -> Self {
        Self::UnknownSchema { tag: tag.into() }
    }

    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Returns true if this error only concerns a single input file and the
    /// batch should carry on with the next one
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FileRead { .. }
                | Self::FileWrite { .. }
                | Self::DirectoryCreate { .. }
                | Self::Walk { .. }
                | Self::EncodingUnrecognized { .. }
                | Self::SchemaDecodeFailed { .. }
                | Self::MessageDecode { .. }
                | Self::InvalidWireFormat { .. }
                | Self::VarintDecode { .. }
                | Self::Json(_)
        )
    }
}
