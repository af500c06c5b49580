use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::features::{BeatTrack, FrameParams, MelParams, Spectrogram};
use super::filters::{self, DbReference};
use crate::error::{Error, Result};

const ROLLOFF_PERCENT: f32 = 0.85;
const MFCC_MELS: usize = 128;

/// Spectral and rhythm primitives the pipeline consumes.
///
/// Every method is a pure function of its input; implementations must be
/// shareable across the rayon pool.
pub trait SignalAnalysis: Send + Sync {
    /// Mel power spectrogram, `n_mels × frames`.
    fn mel_spectrogram(&self, samples: &[f32], sample_rate: u32, params: &MelParams) -> Result<Spectrogram>;

    /// Per-frame spectral centroid in Hz.
    fn spectral_centroid(&self, samples: &[f32], sample_rate: u32, frame: &FrameParams) -> Result<Vec<f32>>;

    /// Per-frame roll-off frequency in Hz.
    fn spectral_rolloff(&self, samples: &[f32], sample_rate: u32, frame: &FrameParams) -> Result<Vec<f32>>;

    /// Per-frame root-mean-square energy.
    fn rms(&self, samples: &[f32], frame: &FrameParams) -> Result<Vec<f32>>;

    /// Pitch-class energy, `12 × frames`.
    fn chroma(&self, samples: &[f32], sample_rate: u32, frame: &FrameParams) -> Result<Spectrogram>;

    /// Cepstral coefficients, `n_mfcc × frames`.
    fn mfcc(&self, samples: &[f32], sample_rate: u32, n_mfcc: usize, frame: &FrameParams) -> Result<Spectrogram>;

    fn beat_track(&self, samples: &[f32], sample_rate: u32) -> Result<BeatTrack>;
}

/// rustfft-backed analysis using centered, zero-padded frames and a
/// periodic Hann window. Frame count is `1 + len / hop`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StftAnalysis;

impl StftAnalysis {
    pub fn new() -> Self {
        Self
    }

    /// `|X|^power` for every frame, `(n_fft / 2 + 1) × frames`.
    fn spectrum(&self, samples: &[f32], frame: &FrameParams, power: i32) -> Result<Spectrogram> {
        check_frame(frame)?;
        let n_fft = frame.n_fft;
        let hop = frame.hop_length;
        let half = n_fft / 2;
        let bins = half + 1;
        let num_frames = 1 + samples.len() / hop;
        let hann = hann_window(n_fft);

        let columns: Vec<Vec<f32>> = (0..num_frames)
            .into_par_iter()
            .map(|frame_idx| {
                // Frame t is centred on sample t * hop.
                let center = frame_idx * hop;
                let mut buffer: Vec<Complex<f32>> = (0..n_fft)
                    .map(|i| {
                        let s = (center + i)
                            .checked_sub(half)
                            .and_then(|idx| samples.get(idx))
                            .copied()
                            .unwrap_or(0.0);
                        Complex::new(s * hann[i], 0.0)
                    })
                    .collect();

                // Per-thread FFT planner (rayon-safe)
                let mut planner = FftPlanner::<f32>::new();
                let fft = planner.plan_fft_forward(n_fft);
                fft.process(&mut buffer);

                buffer[..bins]
                    .iter()
                    .map(|c| if power == 2 { c.norm_sqr() } else { c.norm() })
                    .collect()
            })
            .collect();

        Ok(Spectrogram::from_columns(bins, &columns))
    }

    fn frames_of(&self, samples: &[f32], frame: &FrameParams) -> Vec<Vec<f32>> {
        let half = frame.n_fft / 2;
        let num_frames = 1 + samples.len() / frame.hop_length;
        (0..num_frames)
            .map(|t| {
                let center = t * frame.hop_length;
                (0..frame.n_fft)
                    .map(|i| {
                        (center + i)
                            .checked_sub(half)
                            .and_then(|idx| samples.get(idx))
                            .copied()
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect()
    }
}

impl SignalAnalysis for StftAnalysis {
    fn mel_spectrogram(&self, samples: &[f32], sample_rate: u32, params: &MelParams) -> Result<Spectrogram> {
        let power = self.spectrum(samples, &params.frame, 2)?;
        let bank = filters::mel_filterbank(sample_rate, params.frame.n_fft, params.n_mels);
        Ok(filters::apply_filterbank(&bank, &power))
    }

    fn spectral_centroid(&self, samples: &[f32], sample_rate: u32, frame: &FrameParams) -> Result<Vec<f32>> {
        let mag = self.spectrum(samples, frame, 1)?;
        let freqs = filters::fft_frequencies(sample_rate, frame.n_fft);
        Ok((0..mag.frames())
            .map(|t| {
                let total: f32 = (0..mag.rows()).map(|b| mag.get(b, t)).sum();
                if total <= f32::MIN_POSITIVE {
                    return 0.0;
                }
                (0..mag.rows()).map(|b| freqs[b] * mag.get(b, t)).sum::<f32>() / total
            })
            .collect())
    }

    fn spectral_rolloff(&self, samples: &[f32], sample_rate: u32, frame: &FrameParams) -> Result<Vec<f32>> {
        let mag = self.spectrum(samples, frame, 1)?;
        let freqs = filters::fft_frequencies(sample_rate, frame.n_fft);
        Ok((0..mag.frames())
            .map(|t| {
                let total: f32 = (0..mag.rows()).map(|b| mag.get(b, t)).sum();
                let threshold = ROLLOFF_PERCENT * total;
                let mut cumulative = 0.0f32;
                for b in 0..mag.rows() {
                    cumulative += mag.get(b, t);
                    if cumulative >= threshold {
                        return freqs[b];
                    }
                }
                freqs[mag.rows() - 1]
            })
            .collect())
    }

    fn rms(&self, samples: &[f32], frame: &FrameParams) -> Result<Vec<f32>> {
        check_frame(frame)?;
        Ok(self
            .frames_of(samples, frame)
            .iter()
            .map(|f| (f.iter().map(|s| s * s).sum::<f32>() / f.len() as f32).sqrt())
            .collect())
    }

    fn chroma(&self, samples: &[f32], sample_rate: u32, frame: &FrameParams) -> Result<Spectrogram> {
        let power = self.spectrum(samples, frame, 2)?;
        let bank = filters::chroma_filterbank(sample_rate, frame.n_fft);
        let raw = filters::apply_filterbank(&bank, &power);

        // Normalize each frame so its strongest pitch class is 1.
        let mut columns = Vec::with_capacity(raw.frames());
        for t in 0..raw.frames() {
            let column: Vec<f32> = (0..raw.rows()).map(|c| raw.get(c, t)).collect();
            let peak = column.iter().copied().fold(0.0f32, f32::max);
            if peak > 1e-10 {
                columns.push(column.iter().map(|v| v / peak).collect());
            } else {
                columns.push(vec![0.0; raw.rows()]);
            }
        }
        Ok(Spectrogram::from_columns(raw.rows(), &columns))
    }

    fn mfcc(&self, samples: &[f32], sample_rate: u32, n_mfcc: usize, frame: &FrameParams) -> Result<Spectrogram> {
        let params = MelParams {
            n_mels: MFCC_MELS,
            frame: *frame,
        };
        let mel = self.mel_spectrogram(samples, sample_rate, &params)?;
        let log_mel = filters::power_to_db(&mel, DbReference::Fixed(1.0));
        Ok(filters::dct_rows(&log_mel, n_mfcc))
    }

    fn beat_track(&self, samples: &[f32], sample_rate: u32) -> Result<BeatTrack> {
        let frame = FrameParams::default();
        let params = MelParams { n_mels: MFCC_MELS, frame };
        let mel = self.mel_spectrogram(samples, sample_rate, &params)?;
        let log_mel = filters::power_to_db(&mel, DbReference::Max);

        // Onset strength: mean positive log-mel flux per frame.
        let mut flux_values: Vec<(f32, f32)> = Vec::with_capacity(log_mel.frames());
        for t in 1..log_mel.frames() {
            let flux = (0..log_mel.rows())
                .map(|m| (log_mel.get(m, t) - log_mel.get(m, t - 1)).max(0.0))
                .sum::<f32>()
                / log_mel.rows() as f32;
            let time = (t * frame.hop_length) as f32 / sample_rate as f32;
            flux_values.push((time, flux));
        }

        let beat_times = detect_beats(&flux_values);
        let tempo_bpm = estimate_tempo(&beat_times);

        log::debug!(
            "Beat tracking: {} beats, tempo={:?}",
            beat_times.len(),
            tempo_bpm
        );

        Ok(BeatTrack { tempo_bpm, beat_times })
    }
}

fn check_frame(frame: &FrameParams) -> Result<()> {
    if frame.n_fft == 0 || frame.hop_length == 0 {
        return Err(Error::processing(format!(
            "invalid framing: n_fft={}, hop_length={}",
            frame.n_fft, frame.hop_length
        )));
    }
    Ok(())
}

/// Adaptive-threshold peak picking over an onset envelope of `(time, strength)`.
fn detect_beats(flux_values: &[(f32, f32)]) -> Vec<f32> {
    if flux_values.is_empty() {
        return Vec::new();
    }

    let window = 20;
    let mut beat_times = Vec::new();

    for i in 0..flux_values.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(flux_values.len());
        let local_mean: f32 = flux_values[start..end].iter().map(|(_, f)| f).sum::<f32>()
            / (end - start) as f32;

        let threshold = local_mean * 1.5 + 0.01;

        if flux_values[i].1 > threshold {
            let is_peak = (i == 0 || flux_values[i].1 >= flux_values[i - 1].1)
                && (i == flux_values.len() - 1 || flux_values[i].1 >= flux_values[i + 1].1);

            // Minimum gap between beats (100ms)
            let far_enough = beat_times
                .last()
                .map_or(true, |&last: &f32| flux_values[i].0 - last > 0.1);

            if is_peak && far_enough {
                beat_times.push(flux_values[i].0);
            }
        }
    }

    beat_times
}

/// Median inter-beat interval within 60-200 BPM, or `None`.
fn estimate_tempo(beat_times: &[f32]) -> Option<f32> {
    if beat_times.len() < 2 {
        return None;
    }

    let mut reasonable: Vec<f32> = beat_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (0.3..=1.0).contains(&i))
        .collect();

    if reasonable.is_empty() {
        return None;
    }

    reasonable.sort_by(|a, b| a.total_cmp(b));
    Some(60.0 / reasonable[reasonable.len() / 2])
}

/// Periodic Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}
