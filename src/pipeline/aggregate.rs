use serde::Serialize;

use crate::error::{Error, Result};

/// The genre set the classifier was trained on, in output-vector order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Genre {
    Blues,
    Classical,
    Country,
    Disco,
    Hiphop,
    Jazz,
    Metal,
    Pop,
    Reggae,
    Rock,
}

impl Genre {
    pub const ALL: [Genre; 10] = [
        Genre::Blues,
        Genre::Classical,
        Genre::Country,
        Genre::Disco,
        Genre::Hiphop,
        Genre::Jazz,
        Genre::Metal,
        Genre::Pop,
        Genre::Reggae,
        Genre::Rock,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Genre::Blues => "blues",
            Genre::Classical => "classical",
            Genre::Country => "country",
            Genre::Disco => "disco",
            Genre::Hiphop => "hiphop",
            Genre::Jazz => "jazz",
            Genre::Metal => "metal",
            Genre::Pop => "pop",
            Genre::Reggae => "reggae",
            Genre::Rock => "rock",
        }
    }
}

impl std::fmt::Display for Genre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenrePrediction {
    pub genre: Genre,
    pub confidence: f32,
}

/// Ranked distribution over every genre, best first.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPrediction {
    pub predictions: Vec<GenrePrediction>,
    pub top_genre: Genre,
    pub top_confidence: f32,
    /// Wall-clock time for the whole request, in milliseconds.
    pub processing_time: f64,
}

/// Element-wise mean of per-segment probability vectors.
pub fn mean_probabilities(batch: &[Vec<f32>]) -> Result<Vec<f32>> {
    if batch.is_empty() {
        return Err(Error::processing("no segment predictions to aggregate"));
    }
    let classes = Genre::ALL.len();
    let mut sums = vec![0.0f64; classes];
    for (i, probs) in batch.iter().enumerate() {
        if probs.len() != classes {
            return Err(Error::processing(format!(
                "segment {} has {} class scores, expected {}",
                i,
                probs.len(),
                classes
            )));
        }
        for (sum, &p) in sums.iter_mut().zip(probs) {
            *sum += p as f64;
        }
    }
    Ok(sums.iter().map(|s| (s / batch.len() as f64) as f32).collect())
}

/// Rank averaged scores. Ties keep genre order.
pub fn rank(mean: &[f32]) -> Vec<GenrePrediction> {
    let mut ranked: Vec<GenrePrediction> = Genre::ALL
        .iter()
        .zip(mean)
        .map(|(&genre, &confidence)| GenrePrediction { genre, confidence })
        .collect();
    // Stable: equal confidences stay in enumeration order.
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked
}

pub fn aggregate(batch: &[Vec<f32>]) -> Result<AggregatedPrediction> {
    let mean = mean_probabilities(batch)?;
    let predictions = rank(&mean);
    let top = predictions[0].clone();
    Ok(AggregatedPrediction {
        predictions,
        top_genre: top.genre,
        top_confidence: top.confidence,
        processing_time: 0.0,
    })
}
