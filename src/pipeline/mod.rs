//! Decode → segment → shape → classify → aggregate, with visualization
//! sampled alongside.

pub mod aggregate;
pub mod segment;
pub mod shape;
pub mod visualize;

#[cfg(test)]
pub mod testing;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::audio::{decode, AudioBuffer, FrameParams, MelParams, SignalAnalysis};
use crate::error::{Error, Result};
use crate::model::Classifier;

pub use aggregate::{AggregatedPrediction, GenrePrediction};
pub use segment::Segment;
pub use shape::{FeatureShaper, FeatureTensor};
pub use visualize::{VisualizationBundle, VisualizationSampler};

/// The classifier was trained on this exact preprocessing; none of these
/// are runtime-configurable.
pub const SAMPLE_RATE: u32 = 22050;
pub const N_MELS: usize = 128;
pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const SEGMENT_SECONDS: usize = 3;
pub const EXPECTED_FRAMES: usize = 130;
pub const SEGMENT_SAMPLES: usize = SAMPLE_RATE as usize * SEGMENT_SECONDS;

pub fn model_params() -> MelParams {
    MelParams {
        n_mels: N_MELS,
        frame: FrameParams {
            n_fft: N_FFT,
            hop_length: HOP_LENGTH,
        },
    }
}

/// Shortest clip accepted, in seconds.
pub fn min_duration_seconds() -> f32 {
    segment::min_samples(SEGMENT_SAMPLES) as f32 / SAMPLE_RATE as f32
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInfo {
    pub duration: f32,
    pub num_segments: usize,
    pub sample_rate: u32,
}

/// Everything returned for one classified clip.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationReport {
    #[serde(flatten)]
    pub prediction: AggregatedPrediction,
    /// Ranked classifier output for each segment, in segment order.
    pub segment_predictions: Vec<Vec<GenrePrediction>>,
    pub audio_info: AudioInfo,
    pub visualization: VisualizationBundle,
}

pub struct Pipeline {
    analysis: Arc<dyn SignalAnalysis>,
}

impl Pipeline {
    pub fn new(analysis: Arc<dyn SignalAnalysis>) -> Self {
        Self { analysis }
    }

    pub fn decode(&self, bytes: Vec<u8>, hint: Option<&str>) -> Result<AudioBuffer> {
        decode::decode_bytes(bytes, hint, SAMPLE_RATE)
    }

    /// Full request: decode the upload, then [`Pipeline::classify_audio`].
    /// `started` marks when the request arrived.
    pub fn classify_bytes(
        &self,
        bytes: Vec<u8>,
        hint: Option<&str>,
        classifier: &dyn Classifier,
        started: Instant,
    ) -> Result<ClassificationReport> {
        let audio = self.decode(bytes, hint)?;
        self.classify_audio(&audio, classifier, started)
    }

    /// Decode a file on disk, then [`Pipeline::classify_audio`].
    pub fn classify_file(
        &self,
        path: &Path,
        classifier: &dyn Classifier,
    ) -> Result<ClassificationReport> {
        let started = Instant::now();
        let audio = decode::decode_file(path, SAMPLE_RATE)?;
        self.classify_audio(&audio, classifier, started)
    }

    pub fn classify_audio(
        &self,
        audio: &AudioBuffer,
        classifier: &dyn Classifier,
        started: Instant,
    ) -> Result<ClassificationReport> {
        let segmentation = segment::segment(audio, SEGMENT_SAMPLES);
        if segmentation.is_empty() {
            return Err(Error::TooShort {
                min_seconds: min_duration_seconds(),
            });
        }

        log::info!(
            "Classifying {:.1}s clip in {} segment(s)",
            segmentation.duration,
            segmentation.num_segments
        );

        let (scored, visualization) = rayon::join(
            || self.score_segments(&segmentation.segments, classifier),
            || VisualizationSampler::new(self.analysis.as_ref()).sample(audio),
        );
        let (mut prediction, segment_predictions) = scored?;
        let visualization = visualization?;

        prediction.processing_time = started.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "Top genre: {} ({:.1}%) in {:.0}ms",
            prediction.top_genre,
            prediction.top_confidence * 100.0,
            prediction.processing_time
        );

        Ok(ClassificationReport {
            prediction,
            segment_predictions,
            audio_info: AudioInfo {
                duration: segmentation.duration,
                num_segments: segmentation.num_segments,
                sample_rate: audio.sample_rate(),
            },
            visualization,
        })
    }

    /// Shape every segment, then run the classifier once on the whole batch.
    fn score_segments(
        &self,
        segments: &[Segment],
        classifier: &dyn Classifier,
    ) -> Result<(AggregatedPrediction, Vec<Vec<GenrePrediction>>)> {
        let shaper = FeatureShaper::new(
            self.analysis.as_ref(),
            SAMPLE_RATE,
            model_params(),
            EXPECTED_FRAMES,
        );
        let batch = segments
            .par_iter()
            .map(|s| shaper.shape(s))
            .collect::<Result<Vec<FeatureTensor>>>()?;

        let scores = classifier.predict(&batch)?;
        if scores.len() != batch.len() {
            return Err(Error::processing(format!(
                "classifier returned {} results for {} segments",
                scores.len(),
                batch.len()
            )));
        }

        let prediction = aggregate::aggregate(&scores)?;
        let per_segment = scores.iter().map(|s| aggregate::rank(s)).collect();
        Ok((prediction, per_segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StftAnalysis;
    use testing::{chord, wav_bytes, StubAnalysis, StubClassifier};

    #[test]
    fn ten_second_clip_end_to_end() {
        let pipeline = Pipeline::new(Arc::new(StftAnalysis::new()));
        let classifier = StubClassifier::default();
        let report = pipeline
            .classify_bytes(
                wav_bytes(&chord(10.0), SAMPLE_RATE),
                Some("wav"),
                &classifier,
                Instant::now(),
            )
            .unwrap();

        let total: f32 = report.prediction.predictions.iter().map(|p| p.confidence).sum();
        assert!((total - 1.0).abs() < 1e-4, "confidences sum to {}", total);
        assert_eq!(report.prediction.top_genre, report.prediction.predictions[0].genre);
        assert_eq!(report.audio_info.num_segments, 3);
        assert_eq!(report.audio_info.sample_rate, SAMPLE_RATE);
        assert!((report.audio_info.duration - 10.0).abs() < 1e-3);
        assert!(report.prediction.processing_time > 0.0);
        assert_eq!(report.segment_predictions.len(), 3);
        for ranked in &report.segment_predictions {
            assert_eq!(ranked.len(), 10);
            assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        }
    }

    #[test]
    fn classifier_sees_one_full_batch() {
        let pipeline = Pipeline::new(Arc::new(StubAnalysis::with_frames(130)));
        let classifier = StubClassifier::default();
        let audio = AudioBuffer::new(vec![0.1; SEGMENT_SAMPLES * 4 + 100], SAMPLE_RATE);
        pipeline.classify_audio(&audio, &classifier, Instant::now()).unwrap();
        assert_eq!(classifier.calls(), 1);
        assert_eq!(classifier.batch_sizes(), vec![4]);
    }

    #[test]
    fn one_second_clip_is_too_short() {
        let pipeline = Pipeline::new(Arc::new(StubAnalysis::with_frames(130)));
        let classifier = StubClassifier::default();
        let audio = AudioBuffer::new(vec![0.1; 22_050], SAMPLE_RATE);
        let err = pipeline.classify_audio(&audio, &classifier, Instant::now()).unwrap_err();
        match err {
            Error::TooShort { min_seconds } => assert!((min_seconds - 1.5).abs() < 1e-6),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(classifier.calls(), 0);
    }

    #[test]
    fn two_second_clip_classifies_one_segment() {
        let pipeline = Pipeline::new(Arc::new(StubAnalysis::with_frames(87)));
        let classifier = StubClassifier::default();
        let audio = AudioBuffer::new(vec![0.1; 44_100], SAMPLE_RATE);
        let report = pipeline.classify_audio(&audio, &classifier, Instant::now()).unwrap();
        assert_eq!(report.audio_info.num_segments, 1);
        assert_eq!(classifier.batch_sizes(), vec![1]);
    }

    #[test]
    fn serialized_report_matches_response_contract() {
        let pipeline = Pipeline::new(Arc::new(StubAnalysis::with_frames(130)));
        let classifier = StubClassifier::default();
        let audio = AudioBuffer::new(vec![0.1; SEGMENT_SAMPLES], SAMPLE_RATE);
        let report = pipeline.classify_audio(&audio, &classifier, Instant::now()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        for key in ["predictions", "topGenre", "topConfidence", "processingTime", "audioInfo", "visualization"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["audioInfo"]["numSegments"], 1);
        assert_eq!(json["audioInfo"]["sampleRate"], 22050);
        assert_eq!(json["predictions"].as_array().map(|a| a.len()), Some(10));
        let segments = json["segmentPredictions"].as_array().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].as_array().map(|a| a.len()), Some(10));
        assert_eq!(segments[0][0]["genre"], json["topGenre"]);
    }

    #[test]
    fn processing_time_counts_from_request_start() {
        let pipeline = Pipeline::new(Arc::new(StubAnalysis::with_frames(130)));
        let classifier = StubClassifier::default();
        let audio = AudioBuffer::new(vec![0.1; SEGMENT_SAMPLES], SAMPLE_RATE);
        let arrived = Instant::now() - std::time::Duration::from_millis(1500);
        let report = pipeline.classify_audio(&audio, &classifier, arrived).unwrap();
        assert!(report.prediction.processing_time >= 1500.0);
    }

    #[test]
    fn corrupt_upload_is_a_decode_error() {
        let pipeline = Pipeline::new(Arc::new(StftAnalysis::new()));
        let classifier = StubClassifier::default();
        let err = pipeline
            .classify_bytes(vec![0u8; 512], Some("mp3"), &classifier, Instant::now())
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
