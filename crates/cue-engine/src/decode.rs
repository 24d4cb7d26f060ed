//! Whole-file clip loading.
//!
//! Uses Symphonia to:
//! - detect the input container/codec
//! - decode every packet of the default track
//! - collect interleaved 16-bit PCM into an [`AudioClip`]

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::clip::AudioClip;

/// Bytes per sample of decoded clips.
const CLIP_SAMPLE_WIDTH: usize = 2;

/// Decode the file at `path` into memory.
pub fn load_clip(path: &Path) -> Result<AudioClip> {
    let file = File::open(path).with_context(|| format!("open {:?}", path))?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    load_clip_from_media_source(Box::new(file), hint)
        .with_context(|| format!("decode {:?}", path))
}

/// Decode an arbitrary Symphonia [`MediaSource`] into memory.
pub fn load_clip_from_media_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<AudioClip> {
    let mss = MediaSourceStream::new(source, Default::default());
    let detected = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = detected.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let codec_params: CodecParameters = track.codec_params.clone();
    let track_id = track.id;
    let rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;

    let (channels, data) = decode_all(format.as_mut(), track_id, &codec_params)?;
    let clip = AudioClip::new(rate, channels, CLIP_SAMPLE_WIDTH, data)?;

    tracing::info!(
        codec = codec_name_from_params(&codec_params).unwrap_or("unknown"),
        rate_hz = rate,
        channels,
        frames = clip.frames(),
        duration_ms = clip.duration().as_millis() as u64,
        expected_ms = ?duration_ms_from_codec_params(&codec_params),
        "clip loaded"
    );
    Ok(clip)
}

/// Decode every packet of `track_id` into interleaved little-endian `i16` bytes.
fn decode_all(
    format: &mut dyn FormatReader,
    track_id: u32,
    codec_params: &CodecParameters,
) -> Result<(u16, Vec<u8>)> {
    let mut decoder =
        symphonia::default::get_codecs().make(codec_params, &DecoderOptions::default())?;
    let mut channels = codec_params.channels.map(|c| c.count() as u16);
    let mut data = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(e).context("decode packet"),
        };

        let spec = *decoded.spec();
        channels.get_or_insert(spec.channels.count() as u16);
        let mut buf = SampleBuffer::<i16>::new(decoded.frames() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        data.reserve(buf.samples().len() * CLIP_SAMPLE_WIDTH);
        for s in buf.samples() {
            data.extend_from_slice(&s.to_le_bytes());
        }
    }

    let channels = channels.ok_or_else(|| anyhow!("Unknown channels"))?;
    Ok((channels, data))
}

/// Best-effort duration in milliseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Best-effort codec label for the load log line.
fn codec_name_from_params(params: &CodecParameters) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use symphonia::core::codecs::*;

    use crate::clip::SampleFormat;

    fn wav_bytes(rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut v = Vec::new();
        v.extend_from_slice(b"RIFF");
        v.extend_from_slice(&(36 + data_len).to_le_bytes());
        v.extend_from_slice(b"WAVE");
        v.extend_from_slice(b"fmt ");
        v.extend_from_slice(&16u32.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(&channels.to_le_bytes());
        v.extend_from_slice(&rate.to_le_bytes());
        v.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
        v.extend_from_slice(&(channels * 2).to_le_bytes());
        v.extend_from_slice(&16u16.to_le_bytes());
        v.extend_from_slice(b"data");
        v.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            v.extend_from_slice(&s.to_le_bytes());
        }
        v
    }

    fn wav_hint() -> Hint {
        let mut hint = Hint::new();
        hint.with_extension("wav");
        hint
    }

    #[test]
    fn loads_pcm_wav_exactly() {
        let samples: Vec<i16> = (0..8_000).map(|i| ((i % 200) * 100 - 10_000) as i16).collect();
        let bytes = wav_bytes(8_000, 2, &samples);
        let clip = load_clip_from_media_source(Box::new(Cursor::new(bytes)), wav_hint()).unwrap();

        assert_eq!(clip.sample_rate(), 8_000);
        assert_eq!(clip.channels(), 2);
        assert_eq!(clip.format(), SampleFormat::I16);
        assert_eq!(clip.frames(), 4_000);
        assert_eq!(clip.duration().as_millis(), 500);
        let expected: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(clip.data(), expected.as_slice());
    }

    #[test]
    fn rejects_non_audio_input() {
        let junk = b"definitely not audio data".to_vec();
        assert!(load_clip_from_media_source(Box::new(Cursor::new(junk)), Hint::new()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_clip(Path::new("/nonexistent/cue.wav")).unwrap_err();
        assert!(format!("{err:#}").contains("open"));
    }

    #[test]
    fn duration_ms_from_codec_params_computes() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        params.n_frames = Some(96_000);
        assert_eq!(duration_ms_from_codec_params(&params), Some(2000));
        params.sample_rate = Some(0);
        assert!(duration_ms_from_codec_params(&params).is_none());
    }

    #[test]
    fn codec_name_from_params_maps_known_codecs() {
        let mut params = CodecParameters::new();
        params.codec = CODEC_TYPE_FLAC;
        assert_eq!(codec_name_from_params(&params), Some("FLAC"));
        params.codec = CODEC_TYPE_PCM_S16LE;
        assert_eq!(codec_name_from_params(&params), Some("PCM_S16"));
        assert!(codec_name_from_params(&CodecParameters::new()).is_none());
    }
}
