use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;
use crate::models::video_models::TextureHandle;
use crate::processing::wav_format::{self, SampleEncoding};
use crate::timing::media_clock::MediaTime;
use crate::traits::media_sink::MediaSink;

struct WriterState {
    file: Option<BufWriter<File>>,
    data_bytes: u64,
    audio_frames: u64,
    video_frames: u64,
    last_audio: Option<MediaTime>,
    checksum: Option<String>,
}

/// Streaming WAV writer behind the `MediaSink` interface.
///
/// Audio buffers are appended in arrival order after a 44-byte header whose
/// size fields are patched by `finalize`. Video frames are only counted;
/// encoding them is left to a platform sink.
///
/// ```text
/// [44-byte WAV header]
/// [interleaved PCM / float data...]
/// ```
pub struct WavFileSink {
    file_path: PathBuf,
    format: AudioFormat,
    state: Mutex<WriterState>,
}

impl WavFileSink {
    /// Create the file (and its directory) and write the initial header.
    pub fn create(
        file_path: impl Into<PathBuf>,
        format: AudioFormat,
        encoding: SampleEncoding,
    ) -> Result<Self, CaptureError> {
        let file_path = file_path.into();
        if !wav_format::is_supported(&format, encoding) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported WAV format {:?} ({:?})",
                format, encoding
            )));
        }

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }
        let file = File::create(&file_path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;
        let mut file = BufWriter::new(file);

        let header = wav_format::generate_wav_header(&format, encoding, 0);
        file.write_all(&header)
            .map_err(|e| CaptureError::StorageError(format!("failed to write header: {}", e)))?;

        log::info!("Recording audio to {}", file_path.display());
        Ok(Self {
            file_path,
            format,
            state: Mutex::new(WriterState {
                file: Some(file),
                data_bytes: 0,
                audio_frames: 0,
                video_frames: 0,
                last_audio: None,
                checksum: None,
            }),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Audio payload bytes written so far, header excluded.
    pub fn data_bytes(&self) -> u64 {
        self.state.lock().data_bytes
    }

    pub fn audio_frames(&self) -> u64 {
        self.state.lock().audio_frames
    }

    pub fn video_frames(&self) -> u64 {
        self.state.lock().video_frames
    }

    /// SHA-256 of the finished file, hex encoded. `None` until finalized.
    pub fn checksum(&self) -> Option<String> {
        self.state.lock().checksum.clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().file.is_none()
    }
}

impl MediaSink for WavFileSink {
    fn write_audio_sample(&self, data: &[u8], frame_count: u32, timestamp: MediaTime) -> Result<(), CaptureError> {
        let expected = self.format.bytes_for_frames(frame_count);
        if data.len() != expected {
            return Err(CaptureError::WriteFailed(format!(
                "buffer of {} bytes does not hold {} frames ({} bytes)",
                data.len(),
                frame_count,
                expected
            )));
        }

        let mut state = self.state.lock();
        if let Some(last) = state.last_audio {
            if timestamp < last {
                log::warn!("Audio timestamp went backwards: {} after {}", timestamp, last);
            }
        }
        let file = state.file.as_mut().ok_or(CaptureError::SinkFinalized)?;
        file.write_all(data)
            .map_err(|e| CaptureError::WriteFailed(format!("audio write failed: {}", e)))?;
        state.data_bytes += data.len() as u64;
        state.audio_frames += frame_count as u64;
        state.last_audio = Some(timestamp);
        Ok(())
    }

    fn write_frame(&self, _texture: &TextureHandle, _timestamp: MediaTime) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.file.is_none() {
            return Err(CaptureError::SinkFinalized);
        }
        state.video_frames += 1;
        Ok(())
    }

    /// Patch the header sizes, flush, close and checksum the file.
    fn finalize(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        let writer = state.file.take().ok_or(CaptureError::SinkFinalized)?;
        let mut file = writer
            .into_inner()
            .map_err(|e| CaptureError::StorageError(format!("flush failed: {}", e.error())))?;

        let data_bytes = state.data_bytes;
        patch_u32(&mut file, 4, wav_format::riff_chunk_size(data_bytes))?;
        patch_u32(&mut file, 40, wav_format::data_chunk_size(data_bytes))?;
        file.flush().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.sync_all().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        drop(file);

        let checksum = sha256_file(&self.file_path)?;
        log::info!(
            "Finalized {}: {} audio frames, {} video frames, sha256 {}",
            self.file_path.display(),
            state.audio_frames,
            state.video_frames,
            checksum
        );
        state.checksum = Some(checksum);
        Ok(())
    }
}

fn patch_u32(file: &mut File, offset: u64, value: u32) -> Result<(), CaptureError> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| CaptureError::StorageError(e.to_string()))?;
    file.write_all(&value.to_le_bytes())
        .map_err(|e| CaptureError::StorageError(e.to_string()))
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data =
        fs::read(path).map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
