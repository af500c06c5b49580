use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::resample::resample;
use crate::error::{Error, Result};

/// Decoded mono PCM. Immutable once built.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode an encoded clip held in memory, downmix to mono and resample to
/// `target_rate`. `hint` is an optional file extension used to speed up probing.
pub fn decode_bytes(bytes: Vec<u8>, hint: Option<&str>, target_rate: u32) -> Result<AudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut probe_hint = Hint::new();
    if let Some(ext) = hint {
        probe_hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&probe_hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::decode(format!("unsupported or corrupt audio ({})", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| Error::decode("no audio tracks found"))?;

    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::decode("unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::decode(format!("no decoder for track ({})", e)))?;

    let mut mono: Vec<f32> = Vec::new();
    let mut rejected = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => break,
            Err(e) => return Err(Error::decode(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(msg)) => {
                log::debug!("Skipping undecodable packet: {}", msg);
                rejected += 1;
                continue;
            }
            Err(e) => return Err(Error::decode(e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        downmix_into(sample_buf.samples(), channels, &mut mono);
    }

    ensure_decoded(&mono, rejected)?;

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        mono.len(),
        source_rate,
        mono.len() as f32 / source_rate as f32
    );

    let samples = resample(&mono, source_rate, target_rate)?;
    Ok(AudioBuffer::new(samples, target_rate))
}

/// Read and decode an audio file, using its extension as probe hint.
pub fn decode_file(path: &Path, target_rate: u32) -> Result<AudioBuffer> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::decode(format!("failed to read {}: {}", path.display(), e)))?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_bytes(bytes, ext, target_rate)
}

/// A stream whose every packet was rejected is corrupt, not merely short.
fn ensure_decoded(mono: &[f32], rejected: usize) -> Result<()> {
    if mono.is_empty() && rejected > 0 {
        return Err(Error::decode(format!(
            "no decodable audio ({} packet(s) rejected)",
            rejected
        )));
    }
    Ok(())
}

/// Average interleaved frames down to one channel.
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
