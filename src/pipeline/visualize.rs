//! Downsampled descriptors of a whole clip, sized for client-side plotting.
//!
//! Every series is reduced with [`evenly_spaced_indices`], so grids, curves
//! and the time axis stay on matching sampling grids.

use serde::Serialize;

use crate::audio::filters::{power_to_db, DbReference};
use crate::audio::{AudioBuffer, FrameParams, MelParams, SignalAnalysis, Spectrogram};
use crate::error::Result;

pub const VIZ_MEL_BINS: usize = 64;
pub const MAX_GRID_FRAMES: usize = 200;
pub const WAVEFORM_POINTS: usize = 1000;
pub const MAX_SERIES_POINTS: usize = 100;
pub const MAX_BEATS: usize = 50;
pub const N_MFCC: usize = 13;
pub const DEFAULT_TEMPO: f32 = 120.0;
const ENERGY_EPSILON: f32 = 1e-8;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationBundle {
    pub mel_spectrogram: Vec<Vec<f32>>,
    pub waveform: Vec<f32>,
    pub spectral_centroid: Vec<f32>,
    pub spectral_rolloff: Vec<f32>,
    pub rms: Vec<f32>,
    pub tempo: f32,
    pub beats: Vec<f32>,
    pub chromagram: Vec<Vec<f32>>,
    pub mfcc: Vec<Vec<f32>>,
    pub time_axis: Vec<f32>,
}

/// `count` indices evenly spanning `[0, n - 1]`, rounded to nearest.
pub fn evenly_spaced_indices(n: usize, count: usize) -> Vec<usize> {
    if n == 0 || count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![0];
    }
    let last = (n - 1) as f64;
    (0..count)
        .map(|i| (last * i as f64 / (count - 1) as f64).round() as usize)
        .collect()
}

/// Indices that thin a series of length `n` down to at most `cap` points.
pub fn capped_indices(n: usize, cap: usize) -> Vec<usize> {
    evenly_spaced_indices(n, n.min(cap))
}

fn pick(series: &[f32], indices: &[usize]) -> Vec<f32> {
    indices.iter().map(|&i| series[i]).collect()
}

fn thin_grid(grid: &Spectrogram, cap: usize) -> Vec<Vec<f32>> {
    grid.select_frames(&capped_indices(grid.frames(), cap)).to_rows()
}

/// `count` evenly spaced values covering `[start, end]` inclusive.
pub fn linspace(start: f32, end: f32, count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..count)
            .map(|i| start + (end - start) * i as f32 / (count - 1) as f32)
            .collect(),
    }
}

pub struct VisualizationSampler<'a> {
    analysis: &'a dyn SignalAnalysis,
    frame: FrameParams,
}

impl<'a> VisualizationSampler<'a> {
    pub fn new(analysis: &'a dyn SignalAnalysis) -> Self {
        Self {
            analysis,
            frame: FrameParams::default(),
        }
    }

    pub fn sample(&self, audio: &AudioBuffer) -> Result<VisualizationBundle> {
        let samples = audio.samples();
        let sr = audio.sample_rate();
        let nyquist = sr as f32 / 2.0;

        let mel_params = MelParams {
            n_mels: VIZ_MEL_BINS,
            frame: self.frame,
        };
        let mel = self.analysis.mel_spectrogram(samples, sr, &mel_params)?;
        let mel_db = power_to_db(&mel, DbReference::Max);

        let waveform = pick(samples, &evenly_spaced_indices(samples.len(), WAVEFORM_POINTS));

        let centroid = self.analysis.spectral_centroid(samples, sr, &self.frame)?;
        let rolloff = self.analysis.spectral_rolloff(samples, sr, &self.frame)?;
        let rms = self.analysis.rms(samples, &self.frame)?;

        // One index set for all three curves, driven by the centroid length.
        let series_len = centroid.len().min(rolloff.len()).min(rms.len());
        let indices = capped_indices(series_len, MAX_SERIES_POINTS);
        let spectral_centroid: Vec<f32> = pick(&centroid, &indices).iter().map(|c| c / nyquist).collect();
        let spectral_rolloff: Vec<f32> = pick(&rolloff, &indices).iter().map(|r| r / nyquist).collect();
        let rms = pick(&rms, &indices);
        let peak_rms = rms.iter().copied().fold(0.0f32, f32::max);
        let rms: Vec<f32> = rms.iter().map(|e| e / (peak_rms + ENERGY_EPSILON)).collect();

        let track = self.analysis.beat_track(samples, sr)?;
        let tempo = track.tempo_bpm.unwrap_or(DEFAULT_TEMPO);
        let beats: Vec<f32> = track.beat_times.into_iter().take(MAX_BEATS).collect();

        let chroma = self.analysis.chroma(samples, sr, &self.frame)?;
        let mfcc = self.analysis.mfcc(samples, sr, N_MFCC, &self.frame)?;

        let time_axis = linspace(0.0, audio.duration(), spectral_centroid.len());

        Ok(VisualizationBundle {
            mel_spectrogram: thin_grid(&mel_db, MAX_GRID_FRAMES),
            waveform,
            spectral_centroid,
            spectral_rolloff,
            rms,
            tempo,
            beats,
            chromagram: thin_grid(&chroma, MAX_GRID_FRAMES),
            mfcc: thin_grid(&mfcc, MAX_GRID_FRAMES),
            time_axis,
        })
    }
}
