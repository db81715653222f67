//! Progression Smoother
//!
//! Majority-vote smoothing of a per-frame chord sequence into a short
//! harmonic skeleton.

use crate::chord_template::ChordLabel;

/// Ordered chord labels describing a piece's harmonic movement.
pub type Progression = Vec<ChordLabel>;

/// Default sliding-window length in frames.
pub const DEFAULT_WINDOW: usize = 5;

/// What the smoother returns after the sliding-window pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SmoothingMode {
    /// Each distinct label once, in first-occurrence order. A return to an
    /// earlier chord (A, B, A) is collapsed to (A, B).
    #[default]
    DistinctLabels,
    /// The run sequence with adjacent repeats removed, so returns to an
    /// earlier chord are kept (A, B, A).
    AdjacentRuns,
}

/// Sliding-window majority smoother.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProgressionSmoother {
    window: usize,
    mode: SmoothingMode,
}

impl ProgressionSmoother {
    /// Create a smoother. A `window` of 0 is treated as 1.
    pub fn new(window: usize, mode: SmoothingMode) -> Self {
        ProgressionSmoother {
            window: window.max(1),
            mode,
        }
    }

    /// Window length in frames.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Output mode.
    pub fn mode(&self) -> SmoothingMode {
        self.mode
    }

    /// Smooth a raw label sequence.
    ///
    /// Inputs no longer than the window collapse to their single most
    /// frequent label. Empty input gives an empty progression; any other
    /// input gives at least one label.
    pub fn smooth(&self, labels: &[ChordLabel]) -> Progression {
        if labels.is_empty() {
            return Vec::new();
        }
        if labels.len() <= self.window {
            return majority(labels).into_iter().collect();
        }

        let mut runs: Progression = Vec::new();
        let mut distinct: Progression = Vec::new();
        for window in labels.windows(self.window) {
            let Some(winner) = majority(window) else {
                continue;
            };
            if runs.last() != Some(&winner) {
                runs.push(winner);
                if !distinct.contains(&winner) {
                    distinct.push(winner);
                }
            }
        }

        log::debug!(
            "Smoothed {} frames into {} runs ({} distinct)",
            labels.len(),
            runs.len(),
            distinct.len()
        );

        match self.mode {
            SmoothingMode::DistinctLabels => distinct,
            SmoothingMode::AdjacentRuns => runs,
        }
    }
}

impl Default for ProgressionSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, SmoothingMode::default())
    }
}

/// Most frequent label; ties go to the label seen first.
fn majority(labels: &[ChordLabel]) -> Option<ChordLabel> {
    let mut counts: Vec<(ChordLabel, usize)> = Vec::new();
    for &l in labels {
        match counts.iter_mut().find(|(c, _)| *c == l) {
            Some((_, n)) => *n += 1,
            None => counts.push((l, 1)),
        }
    }
    let mut best: Option<(ChordLabel, usize)> = None;
    for (l, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((l, n));
        }
    }
    best.map(|(l, _)| l)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<ChordLabel> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    #[test]
    fn short_input_returns_global_mode() {
        let s = ProgressionSmoother::new(5, SmoothingMode::AdjacentRuns);
        assert_eq!(s.smooth(&labels(&["G", "C", "C", "G", "C"])), labels(&["C"]));
        // tie goes to the first seen
        assert_eq!(s.smooth(&labels(&["G", "C", "C", "G"])), labels(&["G"]));
    }

    #[test]
    fn empty_input() {
        assert!(ProgressionSmoother::default().smooth(&[]).is_empty());
    }

    #[test]
    fn adjacent_runs_keep_returns() {
        let input = labels(&["A", "A", "A", "B", "B", "B", "B", "A", "A", "A"]);
        let s = ProgressionSmoother::new(3, SmoothingMode::AdjacentRuns);
        assert_eq!(s.smooth(&input), labels(&["A", "B", "A"]));
    }

    #[test]
    fn distinct_labels_collapse_returns() {
        let input = labels(&["A", "A", "A", "B", "B", "B", "B", "A", "A", "A"]);
        let s = ProgressionSmoother::new(3, SmoothingMode::DistinctLabels);
        assert_eq!(s.smooth(&input), labels(&["A", "B"]));
    }

    #[test]
    fn transients_are_voted_out() {
        let input = labels(&["C", "C", "F#", "C", "C", "G", "G", "Db", "G", "G"]);
        let s = ProgressionSmoother::new(3, SmoothingMode::AdjacentRuns);
        let out = s.smooth(&input);
        assert_eq!(out, labels(&["C", "G"]));
        assert!(out.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn zero_window_is_one() {
        let s = ProgressionSmoother::new(0, SmoothingMode::AdjacentRuns);
        assert_eq!(s.window(), 1);
        assert_eq!(s.smooth(&labels(&["C", "C", "G"])), labels(&["C", "G"]));
    }
}
