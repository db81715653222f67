//! Audio frontend
//!
//! The boundary between raw audio and the harmonic estimators: decoding a
//! source into mono samples and turning those samples into chroma frames.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::chroma::{ChromaVector, FrameSequence};
use crate::chromagram::{ChromaExtractor, FeatureError};

/// Frame size in samples used for live buffers.
pub const LIVE_FRAME_SIZE: usize = 8192;

/// Where audio comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// An audio file on disk.
    File(PathBuf),
    /// Already-decoded mono samples.
    Samples {
        /// Mono samples in -1..=1.
        samples: Vec<f32>,
        /// Sampling rate in Hz.
        sample_rate: u32,
    },
    /// Little-endian `f32` PCM bytes, as delivered by an audio callback.
    Bytes {
        /// Raw bytes; length must be a multiple of 4.
        data: Vec<u8>,
        /// Sampling rate in Hz.
        sample_rate: u32,
    },
}

impl AudioSource {
    /// Source for a file path.
    pub fn file(path: impl AsRef<Path>) -> Self {
        AudioSource::File(path.as_ref().to_path_buf())
    }

    /// Source for decoded samples.
    pub fn samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        AudioSource::Samples {
            samples,
            sample_rate,
        }
    }
}

/// Mono samples plus their rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono samples in -1..=1.
    pub samples: Vec<f32>,
    /// Sampling rate in Hz.
    pub sample_rate: u32,
}

/// Decoding and feature extraction used by the analyzer.
///
/// Only `decode` is required; the feature methods default to the FFT
/// chromagram.
pub trait AudioFrontend: Debug + Send + Sync {
    /// Decode a source into mono samples.
    fn decode(&self, source: &AudioSource) -> Result<DecodedAudio, FeatureError>;

    /// Chroma frames of `frame_length` seconds with 50% overlap.
    fn chroma_frames(
        &self,
        audio: &DecodedAudio,
        frame_length: f32,
    ) -> Result<FrameSequence, FeatureError> {
        ChromaExtractor::builder()
            .sample_rate(audio.sample_rate)
            .frame_length(frame_length)
            .build()?
            .frames(&audio.samples)
    }

    /// Mean chroma of a short live buffer.
    fn mean_chroma(&self, audio: &DecodedAudio) -> Result<ChromaVector, FeatureError> {
        ChromaExtractor::builder()
            .sample_rate(audio.sample_rate)
            .frame_size(LIVE_FRAME_SIZE)
            .build()?
            .mean_chroma(&audio.samples)
    }
}

/// The default frontend: FFT chromagram, raw PCM bytes, and Ogg Vorbis files
/// (with the `ogg` feature).
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralFrontend;

impl AudioFrontend for SpectralFrontend {
    fn decode(&self, source: &AudioSource) -> Result<DecodedAudio, FeatureError> {
        let audio = match source {
            AudioSource::Samples {
                samples,
                sample_rate,
            } => DecodedAudio {
                samples: samples.clone(),
                sample_rate: *sample_rate,
            },
            AudioSource::Bytes { data, sample_rate } => DecodedAudio {
                samples: samples_from_le_bytes(data)?,
                sample_rate: *sample_rate,
            },
            AudioSource::File(path) => decode_file(path)?,
        };
        if audio.samples.is_empty() {
            return Err(FeatureError::EmptySignal);
        }
        if audio.sample_rate == 0 {
            return Err(FeatureError::Configuration("sample_rate cannot be zero".into()));
        }
        Ok(audio)
    }
}

/// Read little-endian `f32` samples.
pub fn samples_from_le_bytes(data: &[u8]) -> Result<Vec<f32>, FeatureError> {
    if data.len() % 4 != 0 {
        return Err(FeatureError::MalformedBuffer(format!(
            "{} bytes is not a whole number of f32 samples",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn decode_file(path: &Path) -> Result<DecodedAudio, FeatureError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        #[cfg(feature = "ogg")]
        "ogg" => decode_ogg(path),
        _ => Err(FeatureError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Decode an Ogg Vorbis file and mix it down to mono.
#[cfg(feature = "ogg")]
fn decode_ogg(path: &Path) -> Result<DecodedAudio, FeatureError> {
    use lewton::inside_ogg::OggStreamReader;

    let file = std::fs::File::open(path)?;
    let mut ogg = OggStreamReader::new(file).map_err(|e| FeatureError::Decode(e.to_string()))?;
    let channels = (ogg.ident_hdr.audio_channels as usize).max(1);
    let sample_rate = ogg.ident_hdr.audio_sample_rate;
    let mut samples = Vec::new();

    while let Some(pcm) = ogg
        .read_dec_packet_itl()
        .map_err(|e| FeatureError::Decode(e.to_string()))?
    {
        for frame in pcm.chunks(channels) {
            let sum: f32 = frame.iter().map(|&s| (s as f32) / (i16::MAX as f32)).sum();
            samples.push(sum / channels as f32);
        }
    }

    log::debug!(
        "Decoded {} ({} samples at {} Hz, {} channels)",
        path.display(),
        samples.len(),
        sample_rate,
        channels
    );
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_little_endian_f32() {
        let mut data = Vec::new();
        for s in [0.5f32, -0.25, 1.0] {
            data.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(samples_from_le_bytes(&data).unwrap(), vec![0.5, -0.25, 1.0]);
        assert!(matches!(
            samples_from_le_bytes(&data[..5]),
            Err(FeatureError::MalformedBuffer(_))
        ));
    }

    #[test]
    fn unsupported_and_missing_files() {
        let fe = SpectralFrontend;
        assert!(matches!(
            fe.decode(&AudioSource::file("song.mp3")),
            Err(FeatureError::UnsupportedFormat(_))
        ));
        #[cfg(feature = "ogg")]
        assert!(matches!(
            fe.decode(&AudioSource::file("/nonexistent/dir/song.ogg")),
            Err(FeatureError::Io(_))
        ));
    }

    #[test]
    fn empty_samples_are_rejected() {
        let fe = SpectralFrontend;
        assert!(matches!(
            fe.decode(&AudioSource::samples(vec![], 22_050)),
            Err(FeatureError::EmptySignal)
        ));
    }
}
