use crate::audio::AudioBuffer;

/// A clip shorter than one segment is still classified when it holds at
/// least `segment_samples / SHORT_CLIP_DIVISOR` samples (half a segment).
pub const SHORT_CLIP_DIVISOR: usize = 2;

/// One fixed-length classifier window, owned independently of its source.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub samples: Vec<f32>,
    /// Whether the window ran past the end of the clip and was zero-filled.
    pub padded: bool,
}

/// Output of [`segment`]: the windows plus the figures reported back to clients.
#[derive(Clone, Debug)]
pub struct Segmentation {
    pub segments: Vec<Segment>,
    pub duration: f32,
    pub num_segments: usize,
}

impl Segmentation {
    pub fn is_empty(&self) -> bool {
        self.num_segments == 0
    }
}

/// Minimum clip length, in samples, that yields a segment.
pub fn min_samples(segment_samples: usize) -> usize {
    segment_samples / SHORT_CLIP_DIVISOR
}

/// How many segments a clip of `total_samples` is split into.
///
/// Whole segments count as-is. A clip with no whole segment counts as one
/// when it reaches [`min_samples`], otherwise as zero.
pub fn segment_count(total_samples: usize, segment_samples: usize) -> usize {
    if segment_samples == 0 {
        return 0;
    }
    let full = total_samples / segment_samples;
    if full == 0 && total_samples >= min_samples(segment_samples) {
        return 1;
    }
    full
}

/// Copy `tail` into the front of a zeroed window of `len` samples.
pub fn pad_segment(tail: &[f32], len: usize) -> Vec<f32> {
    let mut window = vec![0.0f32; len];
    let n = tail.len().min(len);
    window[..n].copy_from_slice(&tail[..n]);
    window
}

/// Split a clip into consecutive, non-overlapping windows of `segment_samples`.
pub fn segment(audio: &AudioBuffer, segment_samples: usize) -> Segmentation {
    let samples = audio.samples();
    let num_segments = segment_count(samples.len(), segment_samples);

    let segments = (0..num_segments)
        .map(|index| {
            let start = index * segment_samples;
            let end = start + segment_samples;
            if end <= samples.len() {
                Segment {
                    index,
                    samples: samples[start..end].to_vec(),
                    padded: false,
                }
            } else {
                Segment {
                    index,
                    samples: pad_segment(&samples[start.min(samples.len())..], segment_samples),
                    padded: true,
                }
            }
        })
        .collect();

    Segmentation {
        segments,
        duration: audio.duration(),
        num_segments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22050;
    const SEG: usize = 22050 * 3;

    fn clip(len: usize) -> AudioBuffer {
        AudioBuffer::new((0..len).map(|i| (i % 100) as f32 / 100.0 + 0.01).collect(), SR)
    }

    #[test]
    fn thirty_seconds_is_ten_exact_segments() {
        let result = segment(&clip(661_500), SEG);
        assert_eq!(result.num_segments, 10);
        assert_eq!(result.segments.len(), 10);
        assert!(result.segments.iter().all(|s| !s.padded && s.samples.len() == SEG));
        assert!((result.duration - 30.0).abs() < 1e-4);
    }

    #[test]
    fn segments_are_consecutive_slices() {
        let audio = clip(SEG * 2);
        let result = segment(&audio, SEG);
        assert_eq!(result.segments[1].samples[..], audio.samples()[SEG..SEG * 2]);
        assert_eq!(result.segments[1].index, 1);
    }

    #[test]
    fn two_seconds_is_one_padded_segment() {
        let audio = clip(44_100);
        let result = segment(&audio, SEG);
        assert_eq!(result.num_segments, 1);
        let only = &result.segments[0];
        assert!(only.padded);
        assert_eq!(only.samples.len(), SEG);
        assert_eq!(only.samples[..44_100], audio.samples()[..]);
        assert!(only.samples[44_100..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn one_second_is_rejected() {
        let result = segment(&clip(22_050), SEG);
        assert!(result.is_empty());
        assert!(result.segments.is_empty());
    }

    #[test]
    fn half_segment_boundary() {
        assert_eq!(min_samples(SEG), 33_075);
        assert_eq!(segment_count(33_075, SEG), 1);
        assert_eq!(segment_count(33_074, SEG), 0);
        assert_eq!(segment_count(0, SEG), 0);
    }

    #[test]
    fn remainder_past_whole_segments_is_dropped() {
        // 7.5 s: two whole segments; the 1.5 s tail is not classified
        assert_eq!(segment_count(SEG * 2 + SEG / 2, SEG), 2);
        let result = segment(&clip(SEG * 2 + SEG / 2), SEG);
        assert!(result.segments.iter().all(|s| !s.padded));
    }

    #[test]
    fn pad_segment_right_pads_with_zero() {
        assert_eq!(pad_segment(&[1.0, 2.0], 4), vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(pad_segment(&[1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    }
}
