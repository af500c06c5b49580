/// Dense time-frequency grid, `rows × frames`, stored row-major.
///
/// Rows are mel bands, pitch classes or cepstral coefficients depending on
/// which analysis produced it; columns are STFT frames.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrogram {
    rows: usize,
    frames: usize,
    data: Vec<f32>,
}

impl Spectrogram {
    pub fn new(rows: usize, frames: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), rows * frames, "spectrogram data does not match its shape");
        Self { rows, frames, data }
    }

    #[cfg(test)]
    pub fn filled(rows: usize, frames: usize, value: f32) -> Self {
        Self::new(rows, frames, vec![value; rows * frames])
    }

    /// Build from per-frame columns (each `rows` long).
    pub fn from_columns(rows: usize, columns: &[Vec<f32>]) -> Self {
        let frames = columns.len();
        let mut data = vec![0.0f32; rows * frames];
        for (t, column) in columns.iter().enumerate() {
            for (r, &v) in column.iter().take(rows).enumerate() {
                data[r * frames + t] = v;
            }
        }
        Self { rows, frames, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.frames == 0
    }

    pub fn get(&self, row: usize, frame: usize) -> f32 {
        self.data[row * self.frames + frame]
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.frames..(row + 1) * self.frames]
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    pub fn map(mut self, f: impl Fn(f32) -> f32) -> Self {
        for v in &mut self.data {
            *v = f(*v);
        }
        self
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Keep only the given frame columns, in order.
    pub fn select_frames(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.rows * indices.len());
        for r in 0..self.rows {
            let row = self.row(r);
            data.extend(indices.iter().map(|&t| row[t]));
        }
        Self::new(self.rows, indices.len(), data)
    }

    /// Nested `[row][frame]` vectors, the layout clients render as a heatmap.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }
}

/// STFT framing shared by every spectral descriptor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameParams {
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MelParams {
    pub n_mels: usize,
    pub frame: FrameParams,
}

/// Beat tracker output. `tempo_bpm` is `None` when no tempo could be estimated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeatTrack {
    pub tempo_bpm: Option<f32>,
    /// Beat onsets in seconds, ascending.
    pub beat_times: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_round_trip_through_rows() {
        let spec = Spectrogram::from_columns(2, &[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
        assert_eq!(spec.rows(), 2);
        assert_eq!(spec.frames(), 3);
        assert_eq!(spec.to_rows(), vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
    }

    #[test]
    fn select_frames_picks_columns() {
        let spec = Spectrogram::new(2, 4, vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0]);
        let picked = spec.select_frames(&[0, 3]);
        assert_eq!(picked.to_rows(), vec![vec![0.0, 3.0], vec![10.0, 13.0]]);
        assert_eq!(spec.min(), 0.0);
        assert_eq!(spec.max(), 13.0);
    }
}
