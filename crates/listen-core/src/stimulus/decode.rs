//! Stimulus file probing and decoding (Symphonia)
//!
//! Two entry points, matching the two passes of a trial load:
//! - [`read_header`] reads the container header only (channel count, declared length)
//! - [`decode`] decodes every packet to channel-separated f32

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{LoadError, LoadResult};
use crate::types::Sample;

/// Header information for a stimulus file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StimulusInfo {
    /// Channel count, if the container declares one
    pub channels: Option<usize>,
    /// Declared length in frames, if known before decoding
    pub frames: Option<u64>,
    /// Sample rate in Hz, if declared
    pub sample_rate: Option<u32>,
}

/// Fully decoded PCM for one file
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// One vector per channel, all the same length
    pub channels: Vec<Vec<Sample>>,
    /// Sample rate in Hz (0 if the file did not declare one)
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of frames per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
}

/// Open a file and return the format reader and its default audio track id
fn open(path: &Path) -> LoadResult<(Box<dyn FormatReader>, u32)> {
    let file = File::open(path).map_err(|e| LoadError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let opened = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let format = opened.format;
    let track_id = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| t.id)
        .ok_or_else(|| LoadError::NoAudioTrack(path.to_path_buf()))?;

    Ok((format, track_id))
}

/// Read channel count and length from the container header without decoding
pub fn read_header(path: &Path) -> LoadResult<StimulusInfo> {
    let (format, track_id) = open(path)?;
    let params = &format
        .tracks()
        .iter()
        .find(|t| t.id == track_id)
        .ok_or_else(|| LoadError::NoAudioTrack(path.to_path_buf()))?
        .codec_params;

    Ok(StimulusInfo {
        channels: params.channels.map(|c| c.count()),
        frames: params.n_frames,
        sample_rate: params.sample_rate,
    })
}

/// Decode a whole file into channel-separated samples
pub fn decode(path: &Path) -> LoadResult<DecodedAudio> {
    let (mut format, track_id) = open(path)?;

    let params = format
        .tracks()
        .iter()
        .find(|t| t.id == track_id)
        .map(|t| t.codec_params.clone())
        .ok_or_else(|| LoadError::NoAudioTrack(path.to_path_buf()))?;

    let mut decoder: Box<dyn Decoder> = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| LoadError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut channel_count = params.channels.map(|c| c.count());
    let reserve = params.n_frames.unwrap_or(0) as usize;
    let mut channels: Vec<Vec<Sample>> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<Sample>> = None;
    let mut sample_buf_frames = 0u64;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(LoadError::Decode {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {:?}: {}", path, e);
                continue;
            }
            Err(e) => {
                return Err(LoadError::Decode {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let spec = *decoded.spec();
        let n_channels = *channel_count.get_or_insert(spec.channels.count());
        if channels.is_empty() {
            channels = (0..n_channels).map(|_| Vec::with_capacity(reserve)).collect();
        }

        // Packets may grow (e.g. FLAC block size changes); re-create on demand
        let capacity = decoded.capacity() as u64;
        if sample_buf.is_none() || capacity > sample_buf_frames {
            sample_buf = Some(SampleBuffer::new(capacity, spec));
            sample_buf_frames = capacity;
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            for frame in buf.samples().chunks_exact(n_channels) {
                for (lane, &s) in channels.iter_mut().zip(frame) {
                    lane.push(s);
                }
            }
        }
    }

    if channel_count.is_none() {
        return Err(LoadError::UnknownChannelCount(path.to_path_buf()));
    }

    Ok(DecodedAudio {
        channels,
        sample_rate: params.sample_rate.unwrap_or(0),
    })
}
