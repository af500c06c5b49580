pub mod analysis;
pub mod decode;
pub mod features;
pub mod filters;
pub mod resample;

pub use analysis::{SignalAnalysis, StftAnalysis};
pub use decode::AudioBuffer;
pub use features::{BeatTrack, FrameParams, MelParams, Spectrogram};
