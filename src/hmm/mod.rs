// Hidden Markov note model
// Transition matrix, per-frame emission priors, and Viterbi decoding

pub mod emission;
pub mod transition;
pub mod viterbi;

pub use emission::{evidence_from_tracks, EmissionParams, FrameEvidence, PriorMatrix};
pub use transition::TransitionMatrix;
pub use viterbi::{silence_start, viterbi, DecodeError, StateSequence};
