//! Order lifecycle and merge-candidate discovery.

pub mod matcher;
pub mod state;

pub use matcher::{propose, ConcatenationProposal, ProposalKind};
pub use state::{apply_transition, can_transition, TransitionOutcome, REPRINT_NOTE};
