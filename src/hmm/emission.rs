// Emission probability assembler
// Turns per-frame acoustic evidence into a states x frames prior matrix.
// Values are pseudo-likelihoods; columns do not sum to 1.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::audio::AnalysisError;
use crate::config::{check_probability, ConfigError};
use crate::notes::NoteRange;

/// Acoustic evidence for one analysis frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEvidence {
    /// Voicing decision of the pitch tracker
    pub voiced: bool,

    /// Rounded, tuning-corrected MIDI estimate; None when unvoiced
    pub pitch: Option<i32>,

    /// Whether the onset detector fired on this frame
    pub onset: bool,
}

impl FrameEvidence {
    pub fn silent() -> Self {
        FrameEvidence {
            voiced: false,
            pitch: None,
            onset: false,
        }
    }

    pub fn voiced(pitch: i32, onset: bool) -> Self {
        FrameEvidence {
            voiced: true,
            pitch: Some(pitch),
            onset,
        }
    }
}

/// Confidences of the acoustic estimators, all in (0, 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionParams {
    /// Probability that the pitch estimate is correct
    pub pitch_acc: f64,
    /// Accuracy of the voiced flag
    pub voiced_acc: f64,
    /// Accuracy of the onset detector
    pub onset_acc: f64,
    /// Probability of a one-semitone deviation
    pub spread: f64,
}

impl EmissionParams {
    pub fn new(
        pitch_acc: f64,
        voiced_acc: f64,
        onset_acc: f64,
        spread: f64,
    ) -> Result<Self, ConfigError> {
        check_probability("pitch_acc", pitch_acc)?;
        check_probability("voiced_acc", voiced_acc)?;
        check_probability("onset_acc", onset_acc)?;
        check_probability("spread", spread)?;
        Ok(EmissionParams {
            pitch_acc,
            voiced_acc,
            onset_acc,
            spread,
        })
    }
}

/// States x frames matrix, P[s, t] = prior of being in state s at frame t
#[derive(Debug, Clone, PartialEq)]
pub struct PriorMatrix {
    matrix: Array2<f64>,
}

impl PriorMatrix {
    /// Assemble priors for every frame of the evidence
    ///
    /// Onset states all share the same value for a frame: the pitch estimate
    /// is not consulted on the attack frame.
    pub fn assemble(
        evidence: &[FrameEvidence],
        range: &NoteRange,
        params: &EmissionParams,
    ) -> Self {
        let n_notes = range.n_notes();
        let mut matrix = Array2::<f64>::ones((range.n_states(), evidence.len()));

        for (t, frame) in evidence.iter().enumerate() {
            matrix[[0, t]] = if frame.voiced {
                1.0 - params.voiced_acc
            } else {
                params.voiced_acc
            };

            let onset_prob = if frame.onset {
                params.onset_acc
            } else {
                1.0 - params.onset_acc
            };

            for i in 0..n_notes {
                matrix[[range.onset_state(i), t]] = onset_prob;

                let distance = frame.pitch.map(|p| (range.pitch_of(i) - p).abs());
                matrix[[range.sustain_state(i), t]] = match distance {
                    Some(0) => params.pitch_acc,
                    Some(1) => params.pitch_acc * params.spread,
                    _ => 1.0 - params.pitch_acc,
                };
            }
        }

        log::debug!(
            "Assembled {}x{} prior matrix",
            matrix.nrows(),
            matrix.ncols()
        );

        PriorMatrix { matrix }
    }

    /// Wrap an existing states x frames matrix
    pub fn from_array(matrix: Array2<f64>) -> Self {
        PriorMatrix { matrix }
    }

    pub fn n_states(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_frames(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn get(&self, state: usize, frame: usize) -> f64 {
        self.matrix[[state, frame]]
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }
}

/// Zip the acoustic collaborator's outputs into per-frame evidence
///
/// `pitches` and `voiced` must have one entry per frame. Onset indices past
/// the last frame are dropped.
pub fn evidence_from_tracks(
    pitches: &[Option<i32>],
    voiced: &[bool],
    onset_frames: &[usize],
) -> Result<Vec<FrameEvidence>, AnalysisError> {
    if pitches.len() != voiced.len() {
        return Err(AnalysisError::LengthMismatch {
            pitches: pitches.len(),
            voiced: voiced.len(),
        });
    }

    let onsets: BTreeSet<usize> = onset_frames.iter().copied().collect();
    let dropped = onsets.range(pitches.len()..).count();
    if dropped > 0 {
        log::warn!(
            "Ignoring {} onset(s) beyond the last of {} frames",
            dropped,
            pitches.len()
        );
    }

    Ok(pitches
        .iter()
        .zip(voiced)
        .enumerate()
        .map(|(t, (&pitch, &voiced))| FrameEvidence {
            voiced,
            pitch: if voiced { pitch } else { None },
            onset: onsets.contains(&t),
        })
        .collect())
}
