// Transition matrix builder
// One silence state plus an onset and a sustain state per note.
// Every onset lasts exactly one frame; a sustain may stay, re-attack any
// note (itself included) or fall back to silence.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::config::{check_probability, ConfigError};
use crate::notes::NoteRange;

/// Row-stochastic state transition matrix, T[i, j] = P(i -> j)
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    matrix: Array2<f64>,
}

impl TransitionMatrix {
    /// Build the transition matrix for a note range
    pub fn build(
        range: &NoteRange,
        p_stay_note: f64,
        p_stay_silence: f64,
    ) -> Result<Self, ConfigError> {
        Self::for_note_count(range.n_notes(), p_stay_note, p_stay_silence)
    }

    /// Build the transition matrix for `n_notes` contiguous notes
    pub fn for_note_count(
        n_notes: usize,
        p_stay_note: f64,
        p_stay_silence: f64,
    ) -> Result<Self, ConfigError> {
        if n_notes == 0 {
            return Err(ConfigError::NotPositive {
                name: "n_notes",
                value: 0.0,
            });
        }
        check_probability("p_stay_note", p_stay_note)?;
        check_probability("p_stay_silence", p_stay_silence)?;

        let n_states = 2 * n_notes + 1;
        let p_leave_silence = (1.0 - p_stay_silence) / n_notes as f64;
        let p_leave_note = (1.0 - p_stay_note) / (n_notes as f64 + 1.0);

        let mut matrix = Array2::<f64>::zeros((n_states, n_states));

        // Silence
        matrix[[0, 0]] = p_stay_silence;
        for i in 0..n_notes {
            matrix[[0, 2 * i + 1]] = p_leave_silence;
        }

        for i in 0..n_notes {
            let onset = 2 * i + 1;
            let sustain = 2 * i + 2;

            // Onset always moves on to its own sustain
            matrix[[onset, sustain]] = 1.0;

            matrix[[sustain, 0]] = p_leave_note;
            matrix[[sustain, sustain]] = p_stay_note;
            for j in 0..n_notes {
                matrix[[sustain, 2 * j + 1]] = p_leave_note;
            }
        }

        log::debug!(
            "Built {}x{} transition matrix ({} notes)",
            n_states,
            n_states,
            n_notes
        );

        Ok(TransitionMatrix { matrix })
    }

    /// Wrap an existing square matrix, e.g. a hand-built model in tests
    pub fn from_array(matrix: Array2<f64>) -> Self {
        TransitionMatrix { matrix }
    }

    pub fn n_states(&self) -> usize {
        self.matrix.nrows()
    }

    /// Probability of moving from `from` to `to` in one frame
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.matrix[[from, to]]
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    pub fn row_sums(&self) -> Array1<f64> {
        self.matrix.sum_axis(Axis(1))
    }

    /// True when every entry is non-negative and every row sums to 1
    pub fn is_row_stochastic(&self, tolerance: f64) -> bool {
        self.matrix.iter().all(|&p| p >= 0.0)
            && self.row_sums().iter().all(|s| (s - 1.0).abs() <= tolerance)
    }
}
