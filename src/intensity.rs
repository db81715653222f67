//! Intensity Tracker
//!
//! Framed RMS loudness normalized to the loudest frame of the track.

/// Converts audio into a 0..=1 loudness curve.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IntensityTracker {
    frame_length: f32,
}

impl IntensityTracker {
    /// Create a tracker with frames of `frame_length` seconds.
    pub fn new(frame_length: f32) -> Self {
        IntensityTracker { frame_length }
    }

    /// Frame length in seconds.
    pub fn frame_length(&self) -> f32 {
        self.frame_length
    }

    /// Frame size in samples at `sample_rate`; never less than one sample.
    pub fn frame_size(&self, sample_rate: u32) -> usize {
        ((self.frame_length * sample_rate as f32).round() as usize).max(1)
    }

    /// Build the loudness curve of `samples`.
    ///
    /// The peak RMS is found up front; per-frame values are computed lazily
    /// as the curve is iterated. A silent track keeps its all-zero RMS
    /// values rather than being divided by zero.
    pub fn track<'a>(&self, samples: &'a [f32], sample_rate: u32) -> IntensityCurve<'a> {
        let frame_size = self.frame_size(sample_rate);
        let peak = samples
            .chunks(frame_size)
            .map(rms)
            .fold(0.0f32, f32::max);
        log::debug!(
            "Tracking intensity over {} samples, frame size {}, peak RMS {:.4}",
            samples.len(),
            frame_size,
            peak
        );
        IntensityCurve {
            samples,
            frame_size,
            peak,
        }
    }
}

impl Default for IntensityTracker {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// A finite, restartable loudness curve: one value per frame, in time order.
#[derive(Debug, Copy, Clone)]
pub struct IntensityCurve<'a> {
    samples: &'a [f32],
    frame_size: usize,
    peak: f32,
}

impl<'a> IntensityCurve<'a> {
    /// Iterate from the first frame. Each call starts over.
    pub fn iter(&self) -> IntensityIter<'a> {
        IntensityIter {
            frames: self.samples.chunks(self.frame_size),
            peak: self.peak,
        }
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.samples.len().div_ceil(self.frame_size)
    }

    /// True for an empty track.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest frame RMS before normalization.
    pub fn peak(&self) -> f32 {
        self.peak
    }
}

impl<'a> IntoIterator for IntensityCurve<'a> {
    type Item = f32;
    type IntoIter = IntensityIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &IntensityCurve<'a> {
    type Item = f32;
    type IntoIter = IntensityIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over an [`IntensityCurve`].
#[derive(Debug, Clone)]
pub struct IntensityIter<'a> {
    frames: std::slice::Chunks<'a, f32>,
    peak: f32,
}

impl Iterator for IntensityIter<'_> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let value = rms(self.frames.next()?);
        if self.peak > 0.0 {
            Some(value / self.peak)
        } else {
            Some(value)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.frames.size_hint()
    }
}

impl ExactSizeIterator for IntensityIter<'_> {}

/// Root mean square of a frame.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|x| x * x).sum::<f32>() / frame.len() as f32).sqrt()
}
