mod metadata;

pub use metadata::{ChangeKind, DiffEntry, SparseRegion, Xattr};
