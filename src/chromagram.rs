//! Chromagram
//!
//! FFT-based 12-bin chromagram extraction over fixed-length, 50%-overlapping
//! frames of audio.
//!
//! The spectral peak picking is adapted from the Chord Detector and
//! Chromagram by Adam Stark, Queen Mary University of London.
//! https://github.com/adamstark/Chord-Detector-and-Chromagram

use std::{f32::consts::PI, sync::Arc};

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

use crate::chroma::{ChromaVector, FrameSequence, SEMITONES};

/// Smallest FFT length (after downsampling) the extractor accepts.
const MIN_FFT_LEN: usize = 16;

/// Reference frequency of pitch class 0 (C3).
const REFERENCE_C: f32 = 130.8127;

/// Errors returned while turning audio into features.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The signal had no samples.
    #[error("audio signal is empty")]
    EmptySignal,

    /// A raw byte buffer could not be read as little-endian `f32` samples.
    #[error("malformed sample buffer: {0}")]
    MalformedBuffer(String),

    /// The source's container format cannot be decoded.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Reading the source failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The decoder rejected the stream.
    #[error("decode error: {0}")]
    Decode(String),

    /// An error occurred during the configuration of the extractor.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Builder for a [`ChromaExtractor`].
#[derive(Debug, Clone)]
pub struct ChromaExtractorBuilder {
    sample_rate: u32,
    frame_size: usize,
    frame_length: Option<f32>,
    downsample_factor: usize,
    num_harmonics: usize,
    num_octaves: usize,
    search_width: usize,
}

impl ChromaExtractorBuilder {
    /// Start with default parameters:
    /// sample_rate = 22_050, frame_size = 8192,
    /// downsample_factor = 4, num_harmonics = 2,
    /// num_octaves = 2, search_width = 2.
    pub fn new() -> Self {
        ChromaExtractorBuilder {
            sample_rate: 22_050,
            frame_size: 8192,
            frame_length: None,
            downsample_factor: 4,
            num_harmonics: 2,
            num_octaves: 2,
            search_width: 2,
        }
    }

    /// Set the sampling rate of the audio.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the analysis frame size in samples.
    pub fn frame_size(mut self, size: usize) -> Self {
        self.frame_size = size;
        self.frame_length = None;
        self
    }

    /// Set the analysis frame length in seconds; overrides `frame_size`
    /// once the sample rate is known.
    pub fn frame_length(mut self, seconds: f32) -> Self {
        self.frame_length = Some(seconds);
        self
    }

    /// Set the downsample factor applied before the FFT.
    pub fn downsample_factor(mut self, factor: usize) -> Self {
        self.downsample_factor = factor;
        self
    }

    /// Set the number of harmonics summed per pitch class.
    pub fn num_harmonics(mut self, n: usize) -> Self {
        self.num_harmonics = n;
        self
    }

    /// Set the number of octaves summed per pitch class.
    pub fn num_octaves(mut self, n: usize) -> Self {
        self.num_octaves = n;
        self
    }

    /// Set the search width (in bins) for finding spectral peaks.
    pub fn search_width(mut self, w: usize) -> Self {
        self.search_width = w;
        self
    }

    /// Finalize and create the extractor.
    pub fn build(self) -> Result<ChromaExtractor, FeatureError> {
        if self.sample_rate == 0 {
            return Err(FeatureError::Configuration("sample_rate cannot be zero".into()));
        }
        if self.downsample_factor == 0 {
            return Err(FeatureError::Configuration(
                "downsample_factor cannot be zero".into(),
            ));
        }
        let frame_size = match self.frame_length {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                (secs * self.sample_rate as f32).round() as usize
            }
            Some(secs) => {
                return Err(FeatureError::Configuration(format!(
                    "frame_length must be positive, got {secs}"
                )))
            }
            None => self.frame_size,
        };
        let fft_len = frame_size / self.downsample_factor;
        if fft_len < MIN_FFT_LEN {
            return Err(FeatureError::Configuration(format!(
                "frame_size {frame_size} is too small for downsample_factor {}",
                self.downsample_factor
            )));
        }

        // Prepare FFT plan once
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_len);

        let mut note_frequencies = [0.0; SEMITONES];
        for (i, freq) in note_frequencies.iter_mut().enumerate() {
            *freq = REFERENCE_C * 2f32.powf(i as f32 / 12.0);
        }

        Ok(ChromaExtractor {
            sample_rate: self.sample_rate,
            frame_size,
            downsample_factor: self.downsample_factor,
            num_harmonics: self.num_harmonics,
            num_octaves: self.num_octaves,
            search_width: self.search_width,
            window: hamming_window(fft_len),
            fft,
            note_frequencies,
        })
    }
}

impl Default for ChromaExtractorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame-based chromagram calculator.
///
/// Holds no per-call state, so one extractor can serve several threads.
#[derive(Clone)]
pub struct ChromaExtractor {
    sample_rate: u32,
    frame_size: usize,
    downsample_factor: usize,
    num_harmonics: usize,
    num_octaves: usize,
    search_width: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    note_frequencies: [f32; SEMITONES],
}

impl std::fmt::Debug for ChromaExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromaExtractor")
            .field("sample_rate", &self.sample_rate)
            .field("frame_size", &self.frame_size)
            .field("downsample_factor", &self.downsample_factor)
            .field("num_harmonics", &self.num_harmonics)
            .field("num_octaves", &self.num_octaves)
            .field("search_width", &self.search_width)
            .finish()
    }
}

impl ChromaExtractor {
    /// Start customizing with a builder.
    pub fn builder() -> ChromaExtractorBuilder {
        ChromaExtractorBuilder::new()
    }

    /// Analysis frame size in samples.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Distance between frame starts: half a frame.
    pub fn hop_size(&self) -> usize {
        (self.frame_size / 2).max(1)
    }

    /// Chroma for every frame of `samples`, 50% overlap.
    ///
    /// A signal shorter than one frame is zero-padded to a single frame.
    pub fn frames(&self, samples: &[f32]) -> Result<FrameSequence, FeatureError> {
        if samples.is_empty() {
            return Err(FeatureError::EmptySignal);
        }
        if samples.len() < self.frame_size {
            let mut padded = samples.to_vec();
            padded.resize(self.frame_size, 0.0);
            return Ok(vec![self.compute(&padded)]);
        }

        let hop = self.hop_size();
        let count = (samples.len() - self.frame_size) / hop + 1;
        let frames: FrameSequence = (0..count)
            .map(|i| self.compute(&samples[i * hop..i * hop + self.frame_size]))
            .collect();
        log::debug!(
            "Extracted {} chroma frames (frame {}, hop {})",
            frames.len(),
            self.frame_size,
            hop
        );
        Ok(frames)
    }

    /// Mean chroma across all frames of `samples`.
    pub fn mean_chroma(&self, samples: &[f32]) -> Result<ChromaVector, FeatureError> {
        let frames = self.frames(samples)?;
        ChromaVector::mean(&frames).ok_or(FeatureError::EmptySignal)
    }

    /// Chroma of a single frame of exactly `frame_size` samples.
    pub fn compute(&self, frame: &[f32]) -> ChromaVector {
        let filtered = self.downsample_frame(frame);
        let magnitude = self.compute_spectrum(&filtered);
        self.compute_chromagram(&magnitude)
    }

    #[inline]
    fn downsample_frame(&self, input: &[f32]) -> Vec<f32> {
        let (b0, b1, b2) = (0.2929, 0.5858, 0.2929);
        let (a1, a2) = (-0.0, 0.1716);
        let mut x1 = 0.0;
        let mut x2 = 0.0;
        let mut y1 = 0.0;
        let mut y2 = 0.0;
        let mut out = Vec::with_capacity(self.window.len());

        for (i, &x0) in input.iter().enumerate() {
            let y0 = b0 * x0 + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;

            if i % self.downsample_factor == 0 && out.len() < self.window.len() {
                out.push(y0);
            }
        }
        out.resize(self.window.len(), 0.0);
        out
    }

    #[inline]
    fn compute_spectrum(&self, filtered: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = filtered
            .iter()
            .zip(self.window.iter())
            .map(|(&s, &w)| Complex { re: s * w, im: 0.0 })
            .collect();

        self.fft.process(&mut buffer);

        buffer[..=buffer.len() / 2]
            .iter()
            .map(|c| (c.re * c.re + c.im * c.im).sqrt())
            .collect()
    }

    #[inline]
    fn compute_chromagram(&self, magnitude: &[f32]) -> ChromaVector {
        let bin_width =
            (self.sample_rate as f32 / self.downsample_factor as f32) / self.window.len() as f32;
        let max_bin = magnitude.len() - 1;
        let mut chroma = [0.0f32; SEMITONES];

        for (n, c) in chroma.iter_mut().enumerate() {
            let mut c_sum = 0.0;
            for octave in 1..=self.num_octaves {
                let mut note_sum = 0.0;
                for harm in 1..=self.num_harmonics {
                    let freq = self.note_frequencies[n] * octave as f32 * harm as f32;
                    let center = (freq / bin_width).round() as usize;
                    if center > max_bin {
                        continue;
                    }
                    let lo = center.saturating_sub(self.search_width * harm);
                    let hi = (center + self.search_width * harm).min(max_bin);

                    let peak = magnitude[lo..=hi].iter().cloned().fold(0.0_f32, f32::max);
                    note_sum += peak / harm as f32;
                }
                c_sum += note_sum;
            }
            *c = c_sum;
        }
        ChromaVector::new(chroma)
    }
}

/// Hamming window of length `len`.
fn hamming_window(len: usize) -> Vec<f32> {
    let denom = (len.max(2) - 1) as f32;
    (0..len)
        .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f32 / denom).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_mix(freqs: &[f32], sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() / freqs.len() as f32
            })
            .collect()
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(ChromaExtractor::builder().sample_rate(0).build().is_err());
        assert!(ChromaExtractor::builder().downsample_factor(0).build().is_err());
        assert!(ChromaExtractor::builder().frame_size(32).build().is_err());
        assert!(ChromaExtractor::builder().frame_length(-1.0).build().is_err());
    }

    #[test]
    fn frame_length_uses_sample_rate() {
        let ex = ChromaExtractor::builder()
            .frame_length(0.5)
            .sample_rate(44_100)
            .build()
            .unwrap();
        assert_eq!(ex.frame_size(), 22_050);
        assert_eq!(ex.hop_size(), 11_025);
    }

    #[test]
    fn overlapping_frame_count() {
        let ex = ChromaExtractor::builder().frame_size(1024).build().unwrap();
        let samples = vec![0.0; 4096];
        // starts at 0, 512, ..., 3072
        assert_eq!(ex.frames(&samples).unwrap().len(), 7);
    }

    #[test]
    fn short_signal_is_padded() {
        let ex = ChromaExtractor::builder().frame_size(1024).build().unwrap();
        assert_eq!(ex.frames(&[0.1; 100]).unwrap().len(), 1);
        assert!(matches!(ex.frames(&[]), Err(FeatureError::EmptySignal)));
    }

    #[test]
    fn silence_has_no_chroma() {
        let ex = ChromaExtractor::builder().build().unwrap();
        let c = ex.mean_chroma(&vec![0.0; 10_000]).unwrap();
        assert!(c.is_silent());
    }

    #[test]
    fn c_major_triad_peaks_on_c_e_g() {
        let sr = 22_050;
        let ex = ChromaExtractor::builder()
            .sample_rate(sr)
            .frame_size(16_384)
            .build()
            .unwrap();
        let samples = sine_mix(&[261.63, 329.63, 392.0], sr, 32_768);
        let chroma = ex.mean_chroma(&samples).unwrap();

        let mut order: Vec<usize> = (0..SEMITONES).collect();
        order.sort_by(|&a, &b| chroma[b].total_cmp(&chroma[a]));
        let mut top = order[..3].to_vec();
        top.sort();
        assert_eq!(top, vec![0, 4, 7]);
    }
}
