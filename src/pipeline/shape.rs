use crate::audio::filters::{power_to_db, DbReference};
use crate::audio::{MelParams, SignalAnalysis, Spectrogram};
use crate::error::{Error, Result};

use super::segment::Segment;

/// Classifier input: `[mel_bins, frames, 1]` log-power values, row-major
/// over `(mel, frame)` with the channel axis innermost.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTensor {
    mel_bins: usize,
    frames: usize,
    data: Vec<f32>,
}

impl FeatureTensor {
    pub fn from_spectrogram(spec: Spectrogram) -> Self {
        let mel_bins = spec.rows();
        let frames = spec.frames();
        Self {
            mel_bins,
            frames,
            data: spec.values().to_vec(),
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.mel_bins, self.frames, 1]
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }
}

/// Turns segments into the fixed-shape tensors the classifier expects.
pub struct FeatureShaper<'a> {
    analysis: &'a dyn SignalAnalysis,
    sample_rate: u32,
    params: MelParams,
    expected_frames: usize,
}

impl<'a> FeatureShaper<'a> {
    pub fn new(
        analysis: &'a dyn SignalAnalysis,
        sample_rate: u32,
        params: MelParams,
        expected_frames: usize,
    ) -> Self {
        Self {
            analysis,
            sample_rate,
            params,
            expected_frames,
        }
    }

    pub fn shape(&self, segment: &Segment) -> Result<FeatureTensor> {
        let mel = self
            .analysis
            .mel_spectrogram(&segment.samples, self.sample_rate, &self.params)?;
        if mel.is_empty() {
            return Err(Error::processing(format!(
                "empty mel spectrogram for segment {}",
                segment.index
            )));
        }
        if mel.rows() != self.params.n_mels {
            return Err(Error::processing(format!(
                "expected {} mel bins, analysis produced {}",
                self.params.n_mels,
                mel.rows()
            )));
        }

        let log_mel = power_to_db(&mel, DbReference::Max);
        Ok(FeatureTensor::from_spectrogram(fit_frames(
            &log_mel,
            self.expected_frames,
        )))
    }
}

/// Truncate from the end, or pad with the grid's minimum value, so the grid
/// has exactly `target` frames.
pub fn fit_frames(spec: &Spectrogram, target: usize) -> Spectrogram {
    let frames = spec.frames();
    if frames == target {
        return spec.clone();
    }
    if frames > target {
        let keep: Vec<usize> = (0..target).collect();
        return spec.select_frames(&keep);
    }

    let floor = spec.min();
    let mut data = Vec::with_capacity(spec.rows() * target);
    for r in 0..spec.rows() {
        data.extend_from_slice(spec.row(r));
        data.extend(std::iter::repeat(floor).take(target - frames));
    }
    Spectrogram::new(spec.rows(), target, data)
}
