//! static delta engine (§4.5): generate a compact, content-addressed diff
//! between two commits and apply it entirely offline.
//!
//! a delta is a [`format::Superblock`] plus a sequence of [`format::DeltaPart`]s.
//! generation walks both commits' trees, matches same-ish-sized file objects
//! by a rolling-checksum coverage estimate, and bsdiffs the ones that look
//! worth it; everything else is inlined whole. application replays each
//! part's opcode stream through [`opcode::execute_part`] and refuses to
//! proceed if the delta names fallback objects the destination doesn't
//! already have — callers needing those must fetch them over the network
//! first (see [`crate::error::Error::DeltaRequiresNetwork`]).

pub mod apply;
pub mod format;
pub mod generate;
pub mod opcode;
pub mod rollsum;

pub use apply::apply_delta;
pub use format::{DeltaPart, Endianness, Instruction, Opcode, Superblock};
pub use generate::{generate_delta, DeltaGenerateOptions};
