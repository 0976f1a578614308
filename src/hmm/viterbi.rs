// Viterbi decoding
// Maximum-likelihood state path through the note model, computed in the
// log domain so long signals do not underflow

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::emission::PriorMatrix;
use super::transition::TransitionMatrix;

/// Errors for inputs the decoder cannot work with
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Cannot decode an empty signal (0 frames)")]
    EmptySignal,

    #[error("Cannot decode a model with no states")]
    EmptyModel,

    #[error("Transition matrix is not square: {rows}x{cols}")]
    NonSquareTransition { rows: usize, cols: usize },

    #[error("Dimension mismatch: {what} has {found} states, transition matrix has {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Negative or NaN probability in {0}")]
    InvalidProbability(&'static str),

    #[error("Every state path has zero probability")]
    ZeroProbability,
}

/// Decoded state path, one state index per frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSequence {
    states: Vec<usize>,
    log_score: f64,
}

impl StateSequence {
    pub fn states(&self) -> &[usize] {
        &self.states
    }

    /// Natural-log probability of the decoded path
    pub fn log_score(&self) -> f64 {
        self.log_score
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Initial distribution that always starts in silence (state 0)
pub fn silence_start(n_states: usize) -> Vec<f64> {
    let mut init = vec![0.0; n_states];
    if let Some(first) = init.first_mut() {
        *first = 1.0;
    }
    init
}

/// Find the most likely state path
///
/// score[0][s] = init[s] * P[s, 0]
/// score[t][s] = max_s' score[t-1][s'] * A[s', s] * P[s, t]
///
/// Exact ties in either argmax resolve to the lowest state index.
pub fn viterbi(
    transition: &TransitionMatrix,
    priors: &PriorMatrix,
    initial: &[f64],
) -> Result<StateSequence, DecodeError> {
    let a = transition.view();
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(DecodeError::NonSquareTransition { rows, cols });
    }
    let n_states = rows;
    if n_states == 0 {
        return Err(DecodeError::EmptyModel);
    }
    if priors.n_states() != n_states {
        return Err(DecodeError::DimensionMismatch {
            what: "prior matrix",
            expected: n_states,
            found: priors.n_states(),
        });
    }
    if initial.len() != n_states {
        return Err(DecodeError::DimensionMismatch {
            what: "initial distribution",
            expected: n_states,
            found: initial.len(),
        });
    }
    let n_frames = priors.n_frames();
    if n_frames == 0 {
        return Err(DecodeError::EmptySignal);
    }

    let is_invalid = |p: &f64| p.is_nan() || *p < 0.0;
    if a.iter().any(is_invalid) {
        return Err(DecodeError::InvalidProbability("transition matrix"));
    }
    if priors.view().iter().any(is_invalid) {
        return Err(DecodeError::InvalidProbability("prior matrix"));
    }
    if initial.iter().any(is_invalid) {
        return Err(DecodeError::InvalidProbability("initial distribution"));
    }

    // ln(0) = -inf marks forbidden moves
    let log_a = a.mapv(f64::ln);
    let log_p = priors.view().mapv(f64::ln);

    let mut backpointers = Array2::<usize>::zeros((n_frames, n_states));
    let mut score: Array1<f64> = Array1::from_iter(
        initial
            .iter()
            .enumerate()
            .map(|(s, &p)| p.ln() + log_p[[s, 0]]),
    );
    let mut next = Array1::<f64>::from_elem(n_states, f64::NEG_INFINITY);

    for t in 1..n_frames {
        for s in 0..n_states {
            let mut best = f64::NEG_INFINITY;
            let mut best_prev = 0;
            for prev in 0..n_states {
                let candidate = score[prev] + log_a[[prev, s]];
                if candidate > best {
                    best = candidate;
                    best_prev = prev;
                }
            }
            next[s] = best + log_p[[s, t]];
            backpointers[[t, s]] = best_prev;
        }
        std::mem::swap(&mut score, &mut next);
    }

    let mut final_state = 0;
    let mut final_score = f64::NEG_INFINITY;
    for (s, &value) in score.iter().enumerate() {
        if value > final_score {
            final_score = value;
            final_state = s;
        }
    }
    if final_score == f64::NEG_INFINITY {
        return Err(DecodeError::ZeroProbability);
    }

    let mut states = vec![0; n_frames];
    states[n_frames - 1] = final_state;
    for t in (1..n_frames).rev() {
        states[t - 1] = backpointers[[t, states[t]]];
    }

    log::debug!(
        "Decoded {} frames over {} states, log score {:.3}",
        n_frames,
        n_states,
        final_score
    );

    Ok(StateSequence {
        states,
        log_score: final_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::emission::{EmissionParams, FrameEvidence};
    use crate::notes::NoteRange;
    use ndarray::array;

    fn note_model(range: &NoteRange) -> TransitionMatrix {
        TransitionMatrix::build(range, 0.9, 0.2).unwrap()
    }

    fn params() -> EmissionParams {
        EmissionParams::new(0.99, 0.9, 0.8, 0.6).unwrap()
    }

    #[test]
    fn test_two_state_weather_model() {
        // Textbook example: sticky states, evidence flips halfway
        let a = TransitionMatrix::from_array(array![[0.7, 0.3], [0.4, 0.6]]);
        let p = PriorMatrix::from_array(array![[0.9, 0.9, 0.2, 0.2], [0.1, 0.1, 0.8, 0.8]]);

        let path = viterbi(&a, &p, &[0.5, 0.5]).unwrap();
        assert_eq!(path.states(), &[0, 0, 1, 1]);
        assert!(path.log_score() < 0.0);
    }

    #[test]
    fn test_log_score_matches_product() {
        let a = TransitionMatrix::from_array(array![[0.7, 0.3], [0.4, 0.6]]);
        let p = PriorMatrix::from_array(array![[0.9, 0.9], [0.1, 0.1]]);

        let path = viterbi(&a, &p, &[1.0, 0.0]).unwrap();
        assert_eq!(path.states(), &[0, 0]);
        let expected = (1.0f64 * 0.9 * 0.7 * 0.9).ln();
        assert!((path.log_score() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ties_pick_lowest_state() {
        let a = TransitionMatrix::from_array(array![[0.5, 0.5], [0.5, 0.5]]);
        let p = PriorMatrix::from_array(array![[0.5, 0.5, 0.5], [0.5, 0.5, 0.5]]);

        let path = viterbi(&a, &p, &[0.5, 0.5]).unwrap();
        assert_eq!(path.states(), &[0, 0, 0]);
    }

    #[test]
    fn test_decodes_held_note() {
        let range = NoteRange::new(60, 64).unwrap();
        let mut evidence = vec![FrameEvidence::silent(); 3];
        evidence.push(FrameEvidence::voiced(62, true));
        evidence.extend(vec![FrameEvidence::voiced(62, false); 20]);
        evidence.extend(vec![FrameEvidence::silent(); 5]);

        let priors = PriorMatrix::assemble(&evidence, &range, &params());
        let a = note_model(&range);
        let path = viterbi(&a, &priors, &silence_start(a.n_states())).unwrap();

        // Staying in sustain (0.9) is cheaper than staying in silence (0.2),
        // so the attack frame lands one frame ahead of the first voiced frame
        let onset = range.onset_state(2);
        let sustain = range.sustain_state(2);
        assert_eq!(&path.states()[..2], &[0, 0]);
        assert_eq!(path.states()[2], onset);
        assert!(path.states()[3..24].iter().all(|&s| s == sustain));
        assert!(path.states()[24..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_path_respects_zero_transitions() {
        let range = NoteRange::new(60, 62).unwrap();
        let evidence = vec![
            FrameEvidence::voiced(60, true),
            FrameEvidence::voiced(60, false),
            FrameEvidence::voiced(62, true),
            FrameEvidence::voiced(62, false),
            FrameEvidence::silent(),
        ];
        let priors = PriorMatrix::assemble(&evidence, &range, &params());
        let a = note_model(&range);
        let path = viterbi(&a, &priors, &silence_start(a.n_states())).unwrap();

        assert_eq!(path.states()[0], 0);
        for pair in path.states().windows(2) {
            assert!(a.get(pair[0], pair[1]) > 0.0, "illegal move {:?}", pair);
        }
    }

    #[test]
    fn test_deterministic() {
        let range = NoteRange::new(55, 70).unwrap();
        let evidence: Vec<FrameEvidence> = (0..200)
            .map(|t| match t % 40 {
                0..=9 => FrameEvidence::silent(),
                10 => FrameEvidence::voiced(55 + (t / 40) as i32, true),
                _ => FrameEvidence::voiced(55 + (t / 40) as i32, false),
            })
            .collect();
        let priors = PriorMatrix::assemble(&evidence, &range, &params());
        let a = note_model(&range);
        let init = silence_start(a.n_states());

        let first = viterbi(&a, &priors, &init).unwrap();
        let second = viterbi(&a, &priors, &init).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 200);
    }

    #[test]
    fn test_long_signal_does_not_underflow() {
        let range = NoteRange::new(60, 61).unwrap();
        let evidence = vec![FrameEvidence::silent(); 20_000];
        let priors = PriorMatrix::assemble(&evidence, &range, &params());
        let a = note_model(&range);

        let path = viterbi(&a, &priors, &silence_start(a.n_states())).unwrap();
        assert!(path.log_score().is_finite());
        assert!(path.states().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_empty_signal() {
        let range = NoteRange::new(60, 61).unwrap();
        let priors = PriorMatrix::assemble(&[], &range, &params());
        let a = note_model(&range);

        assert_eq!(
            viterbi(&a, &priors, &silence_start(a.n_states())),
            Err(DecodeError::EmptySignal)
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = note_model(&NoteRange::new(60, 61).unwrap());
        let other = NoteRange::new(60, 62).unwrap();
        let priors = PriorMatrix::assemble(&[FrameEvidence::silent()], &other, &params());

        assert!(matches!(
            viterbi(&a, &priors, &silence_start(a.n_states())),
            Err(DecodeError::DimensionMismatch { what: "prior matrix", expected: 5, found: 7 })
        ));

        let priors = PriorMatrix::assemble(
            &[FrameEvidence::silent()],
            &NoteRange::new(60, 61).unwrap(),
            &params(),
        );
        assert!(matches!(
            viterbi(&a, &priors, &[1.0]),
            Err(DecodeError::DimensionMismatch { what: "initial distribution", .. })
        ));
    }

    #[test]
    fn test_zero_probability_paths() {
        let a = TransitionMatrix::from_array(array![[1.0, 0.0], [0.0, 1.0]]);
        let p = PriorMatrix::from_array(array![[1.0, 0.0], [0.0, 1.0]]);

        assert_eq!(viterbi(&a, &p, &[1.0, 0.0]), Err(DecodeError::ZeroProbability));
    }

    #[test]
    fn test_silence_start() {
        assert_eq!(silence_start(3), vec![1.0, 0.0, 0.0]);
        assert!(silence_start(0).is_empty());
    }
}
