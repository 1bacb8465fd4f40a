use std::path::PathBuf;

use crate::object::ObjectType;
use crate::Hash;

/// error type for repository operations.
///
/// variants group into the eight outward kinds callers are expected to
/// match on (not found / corrupted / invalid format / state conflict /
/// permission denied / io / unsupported / delta requires network); each
/// variant carries the structured detail that kind implies rather than an
/// opaque message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- NotFound ---
    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("path not found in tree: {0}")]
    PathNotFound(String),

    #[error("object not found: {0:?} {1}")]
    ObjectNotFound(ObjectType, Hash),

    #[error("static delta part not found: {0}")]
    DeltaPartNotFound(String),

    #[error("commit has no locally stored parent: {0}")]
    ParentNotFound(Hash),

    // --- CorruptedObject ---
    #[error("corrupt object {1}: expected checksum {0}, computed {2}")]
    CorruptObject(Hash, ObjectType, Hash),

    #[error("truncated object stream for {0}")]
    TruncatedObject(Hash),

    #[error("invalid varint encoding")]
    InvalidVarint,

    #[error("static delta checksum mismatch for part {index}: expected {expected}, computed {computed}")]
    DeltaPartCorrupt {
        index: usize,
        expected: Hash,
        computed: Hash,
    },

    #[error("static delta object mismatch: expected {expected}, computed {computed}")]
    DeltaObjectMismatch { expected: Hash, computed: Hash },

    // --- InvalidFormat ---
    #[error("unsupported repository version: {0}")]
    UnsupportedRepoVersion(u32),

    #[error("invalid repository mode: {0}")]
    InvalidMode(String),

    #[error("invalid object type tag: {0}")]
    InvalidObjectType(u8),

    #[error("unknown static delta opcode: {0}")]
    InvalidOpcode(u8),

    #[error("static delta opcode used outside its valid state: {0}")]
    OpcodeStateViolation(&'static str),

    #[error("static delta offset out of range: offset {offset} length {length} exceeds blob of size {blob_len}")]
    DeltaOffsetOutOfRange {
        offset: u64,
        length: u64,
        blob_len: u64,
    },

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),

    #[error("invalid delta descriptor name: {0}")]
    InvalidDeltaName(String),

    #[error("unrecognized compression type byte: {0:#x}")]
    InvalidCompressionType(u8),

    #[error("invalid tree entry name: {0}")]
    InvalidEntryName(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("duplicate tree entry name: {0}")]
    DuplicateEntryName(String),

    #[error("config parse error in {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    // --- StateConflict ---
    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("a transaction is already open on this repository handle")]
    TransactionAlreadyOpen,

    #[error("no transaction is open on this repository handle")]
    NoTransactionOpen,

    #[error("checkout target not empty: {0}")]
    TargetNotEmpty(PathBuf),

    #[error("path conflict during checkout: {0}")]
    CheckoutConflict(PathBuf),

    #[error("ref {0} still points at commit being deleted")]
    CommitHasRef(String),

    #[error("hardlink target not yet checked out: {0}")]
    HardlinkTargetNotFound(String),

    #[error("lock contention on repository")]
    LockContention,

    // --- PermissionDenied ---
    #[error("permission denied at {path}: {source}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create device node without privileges: {0}")]
    DeviceNodePermission(PathBuf),

    // --- IOError ---
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("xattr error on {path}: {message}")]
    Xattr { path: PathBuf, message: String },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cbor deserialization error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    // --- Unsupported ---
    #[error("feature not supported in this build: {0}")]
    Unsupported(&'static str),

    #[error("hardlink not supported across this boundary and copy fallback disabled")]
    NoCopyFallback,

    // --- DeltaRequiresNetwork ---
    #[error("static delta apply requires network: {0} fallback object(s) are not available offline")]
    DeltaRequiresNetwork(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context, distinguishing permission
/// failures from the generic IOError bucket.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| {
            let path = path.into();
            if source.kind() == std::io::ErrorKind::PermissionDenied {
                Error::PermissionDenied { path, source }
            } else {
                Error::Io { path, source }
            }
        })
    }
}
