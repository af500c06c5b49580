use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 1024;

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
///
/// Output sample `n` lines up with source time `n / to_rate` and the result
/// is trimmed to `round(len * to_rate / from_rate)` samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::decode("sample rate is zero"));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_SIZE, 1)
        .map_err(|e| Error::processing(format!("failed to create resampler: {}", e)))?;

    // SincFixedIn centers its first output one output period into the input
    // (its history buffer already covers the filter's left half), so lead in
    // with that much silence rather than skipping `output_delay()` frames.
    let lead = (1.0 / ratio).round() as usize;
    let mut input = Vec::with_capacity(lead + samples.len());
    input.resize(lead, 0.0);
    input.extend_from_slice(samples);

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected + CHUNK_SIZE);

    let mut pos = 0;
    // The filter holds back about half its length, so keep feeding
    // zero-padded chunks until every expected frame has been emitted.
    while output.len() < expected {
        let mut chunk = vec![0.0f32; CHUNK_SIZE];
        if pos < input.len() {
            let end = (pos + CHUNK_SIZE).min(input.len());
            chunk[..end - pos].copy_from_slice(&input[pos..end]);
        }
        pos += CHUNK_SIZE;

        let resampled = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::processing(format!("resampling failed: {}", e)))?;
        if let Some(channel) = resampled.into_iter().next() {
            output.extend_from_slice(&channel);
        }
    }

    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passthrough() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 22050, 22050).unwrap(), samples);
    }

    #[test]
    fn output_length_follows_ratio() {
        let samples = vec![0.0f32; 44100 * 3];
        let out = resample(&samples, 44100, 22050).unwrap();
        assert_eq!(out.len(), 22050 * 3);

        let out = resample(&samples[..48000], 48000, 22050).unwrap();
        assert_eq!(out.len(), 22050);
    }

    #[test]
    fn preserves_low_frequency_tone() {
        let sr = 44100;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / sr as f32).sin())
            .collect();
        let out = resample(&samples, sr as u32, 22050).unwrap();
        // Aligned output tracks the source at the shared instants.
        for &i in &[2000usize, 5000, 10000] {
            assert!((out[i] - samples[i * 2]).abs() < 0.1, "mismatch at {}", i);
        }
    }

    fn tone_mix(t: f64) -> f32 {
        use std::f64::consts::PI;
        (0.5 * (2.0 * PI * 97.0 * t).sin()
            + 0.3 * (2.0 * PI * 331.0 * t).sin()
            + 0.2 * (2.0 * PI * 1013.0 * t).sin()) as f32
    }

    /// Output-sample offset at which the resampled mix best matches the
    /// analytic signal.
    fn best_lag(from_rate: u32, to_rate: u32) -> isize {
        let samples: Vec<f32> = (0..from_rate as usize * 2)
            .map(|i| tone_mix(i as f64 / from_rate as f64))
            .collect();
        let out = resample(&samples, from_rate, to_rate).unwrap();

        (-8isize..=8)
            .map(|lag| {
                let err: f64 = (2000..out.len() - 2000)
                    .map(|i| {
                        let t = (i as isize + lag) as f64 / to_rate as f64;
                        (out[i] as f64 - tone_mix(t) as f64).powi(2)
                    })
                    .sum();
                (lag, err)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(lag, _)| lag)
            .unwrap()
    }

    #[test]
    fn output_has_no_lag_against_source() {
        assert_eq!(best_lag(44100, 22050), 0);
        assert_eq!(best_lag(48000, 22050), 0);
        assert_eq!(best_lag(16000, 22050), 0);
    }

    #[test]
    fn tail_carries_source_audio() {
        let sr = 44100usize;
        let samples: Vec<f32> = (0..sr).map(|i| tone_mix(i as f64 / sr as f64)).collect();
        let out = resample(&samples, sr as u32, 22050).unwrap();
        let last = out.len() - 300;
        for i in last..out.len() - 200 {
            assert!((out[i] - samples[i * 2]).abs() < 0.1, "tail mismatch at {}", i);
        }
    }
}
