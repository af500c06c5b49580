//! Filterbanks and scalings applied on top of a power spectrogram.

use super::features::Spectrogram;

/// Smallest power considered when converting to decibels.
pub const AMIN: f32 = 1e-10;

/// Dynamic range kept below the peak by [`power_to_db`].
pub const TOP_DB: f32 = 80.0;

/// Reference level for [`power_to_db`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DbReference {
    /// The spectrogram's own maximum maps to 0 dB.
    Max,
    Fixed(f32),
}

/// Convert a power grid to decibels, clamped to `TOP_DB` below the peak.
pub fn power_to_db(power: &Spectrogram, reference: DbReference) -> Spectrogram {
    let ref_value = match reference {
        DbReference::Max => power.max().max(0.0),
        DbReference::Fixed(v) => v.abs(),
    };
    let ref_db = 10.0 * ref_value.max(AMIN).log10();
    let db = power.clone().map(|p| 10.0 * p.max(AMIN).log10() - ref_db);
    let floor = db.max() - TOP_DB;
    db.map(|v| v.max(floor))
}

const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4f32.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Centre frequency of each real-FFT bin.
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    let bins = n_fft / 2 + 1;
    (0..bins)
        .map(|b| b as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// Area-normalized triangular mel filters spanning 0 Hz to Nyquist,
/// `n_mels × (n_fft / 2 + 1)` row-major.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);
    let mel_max = hz_to_mel(sample_rate as f32 / 2.0);

    let mel_f: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (mel_f[m], mel_f[m + 1], mel_f[m + 2]);
            let enorm = 2.0 / (right - left);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - left) / (center - left);
                    let upper = (right - f) / (right - center);
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// Pitch-class filters (C first): each bin is assigned to its nearest
/// equal-tempered semitone (A4 = 440 Hz). The DC bin is ignored.
pub fn chroma_filterbank(sample_rate: u32, n_fft: usize) -> Vec<Vec<f32>> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);
    let mut filters = vec![vec![0.0f32; fft_freqs.len()]; 12];
    for (b, &f) in fft_freqs.iter().enumerate().skip(1) {
        let midi = 69.0 + 12.0 * (f / 440.0).log2();
        let class = (midi.round() as i64).rem_euclid(12) as usize;
        filters[class][b] = 1.0;
    }
    filters
}

/// Apply a filterbank to every column of a spectrogram.
pub fn apply_filterbank(filters: &[Vec<f32>], spectrum: &Spectrogram) -> Spectrogram {
    let frames = spectrum.frames();
    let mut data = vec![0.0f32; filters.len() * frames];
    for (m, filter) in filters.iter().enumerate() {
        for (b, &w) in filter.iter().enumerate() {
            if w == 0.0 || b >= spectrum.rows() {
                continue;
            }
            let row = spectrum.row(b);
            let out = &mut data[m * frames..(m + 1) * frames];
            for (o, &p) in out.iter_mut().zip(row) {
                *o += w * p;
            }
        }
    }
    Spectrogram::new(filters.len(), frames, data)
}

/// Orthonormal DCT-II along rows, keeping the first `n_out` coefficients.
pub fn dct_rows(input: &Spectrogram, n_out: usize) -> Spectrogram {
    let n = input.rows();
    let frames = input.frames();
    let mut data = vec![0.0f32; n_out * frames];
    if n == 0 {
        return Spectrogram::new(n_out, frames, data);
    }
    for k in 0..n_out {
        let scale = if k == 0 {
            (1.0 / n as f32).sqrt()
        } else {
            (2.0 / n as f32).sqrt()
        };
        for r in 0..n {
            let basis = (std::f32::consts::PI * k as f32 * (2 * r + 1) as f32 / (2 * n) as f32).cos();
            let row = input.row(r);
            let out = &mut data[k * frames..(k + 1) * frames];
            for (o, &v) in out.iter_mut().zip(row) {
                *o += scale * basis * v;
            }
        }
    }
    Spectrogram::new(n_out, frames, data)
}
