//! Deterministic stand-ins for the DSP and model backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::audio::{BeatTrack, FrameParams, MelParams, SignalAnalysis, Spectrogram};
use crate::error::Result;
use crate::model::Classifier;
use crate::pipeline::{FeatureTensor, SAMPLE_RATE};

/// Analysis that ignores the signal and returns fixed-size grids.
pub struct StubAnalysis {
    frames: usize,
    mel_rows: Option<usize>,
    beats: BeatTrack,
}

impl StubAnalysis {
    pub fn with_frames(frames: usize) -> Self {
        Self {
            frames,
            mel_rows: None,
            beats: BeatTrack::default(),
        }
    }

    pub fn mel_rows(mut self, rows: usize) -> Self {
        self.mel_rows = Some(rows);
        self
    }

    pub fn beats(mut self, beats: BeatTrack) -> Self {
        self.beats = beats;
        self
    }

    fn grid(&self, rows: usize) -> Spectrogram {
        let data = (0..rows * self.frames)
            .map(|i| 1e-3 * ((i % 97) as f32 + 1.0))
            .collect();
        Spectrogram::new(rows, self.frames, data)
    }

    fn ramp(&self, step: f32) -> Vec<f32> {
        (0..self.frames).map(|t| t as f32 * step).collect()
    }
}

impl SignalAnalysis for StubAnalysis {
    fn mel_spectrogram(&self, _samples: &[f32], _sr: u32, params: &MelParams) -> Result<Spectrogram> {
        Ok(self.grid(self.mel_rows.unwrap_or(params.n_mels)))
    }

    fn spectral_centroid(&self, _samples: &[f32], _sr: u32, _frame: &FrameParams) -> Result<Vec<f32>> {
        Ok(self.ramp(1000.0))
    }

    fn spectral_rolloff(&self, _samples: &[f32], _sr: u32, _frame: &FrameParams) -> Result<Vec<f32>> {
        Ok(self.ramp(1000.0))
    }

    fn rms(&self, _samples: &[f32], _frame: &FrameParams) -> Result<Vec<f32>> {
        Ok((0..self.frames).map(|t| 0.01 * (t + 1) as f32).collect())
    }

    fn chroma(&self, _samples: &[f32], _sr: u32, _frame: &FrameParams) -> Result<Spectrogram> {
        Ok(self.grid(12))
    }

    fn mfcc(&self, _samples: &[f32], _sr: u32, n_mfcc: usize, _frame: &FrameParams) -> Result<Spectrogram> {
        Ok(self.grid(n_mfcc))
    }

    fn beat_track(&self, _samples: &[f32], _sr: u32) -> Result<BeatTrack> {
        Ok(self.beats.clone())
    }
}

/// Classifier that maps each tensor to a softmax over shifted tensor means,
/// and records every batch it receives.
#[derive(Default)]
pub struct StubClassifier {
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl StubClassifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl Classifier for StubClassifier {
    fn predict(&self, batch: &[FeatureTensor]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(batch.len());
        }
        Ok(batch
            .iter()
            .map(|tensor| {
                let values = tensor.values();
                let mean = values.iter().sum::<f32>() / values.len().max(1) as f32;
                let logits: Vec<f32> = (0..10).map(|k| (mean / 10.0) * (k as f32 - 4.5) / 4.5).collect();
                let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
                let total: f32 = exp.iter().sum();
                exp.iter().map(|e| e / total).collect()
            })
            .collect())
    }
}

/// 16-bit mono WAV file bytes.
pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Three-partial tone at the model sample rate.
pub fn chord(seconds: f32) -> Vec<f32> {
    (0..(seconds * SAMPLE_RATE as f32) as usize)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            0.3 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 330.0 * t).sin()
                + 0.1 * (2.0 * std::f32::consts::PI * 2200.0 * t).sin()
        })
        .collect()
}
