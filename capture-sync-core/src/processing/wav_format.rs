//! WAV file format utilities.
//!
//! Generates the standard 44-byte RIFF header and patches its size fields
//! once recording completes.

use crate::models::audio_models::AudioFormat;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Sample encoding stored in the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Integer PCM (format code 1).
    Pcm,
    /// 32-bit IEEE float (format code 3), the shared-mode WASAPI mix format.
    IeeeFloat,
}

impl SampleEncoding {
    pub fn format_code(self) -> u16 {
        match self {
            Self::Pcm => 1,
            Self::IeeeFloat => 3,
        }
    }
}

/// Whether `format` can be stored with `encoding`.
pub fn is_supported(format: &AudioFormat, encoding: SampleEncoding) -> bool {
    if format.sample_rate == 0 || format.channels == 0 {
        return false;
    }
    match encoding {
        SampleEncoding::Pcm => matches!(format.bits_per_sample, 16 | 24 | 32),
        SampleEncoding::IeeeFloat => format.bits_per_sample == 32,
    }
}

/// Generate a 44-byte WAV RIFF header, little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (format chunk size)
/// [20-21]  format code
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * block_align
/// [32-33]  block_align = channels * bits_per_sample / 8
/// [34-35]  bits_per_sample
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(format: &AudioFormat, encoding: SampleEncoding, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let block_align = format.block_align() as u16;
    let byte_rate = format.sample_rate * block_align as u32;
    let chunk_size = 36u32.saturating_add(data_size);

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&encoding.format_code().to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// RIFF chunk size field (offset 4) for a file holding `data_size` bytes.
/// Saturates at the 4 GiB format limit.
pub fn riff_chunk_size(data_size: u64) -> u32 {
    (data_size + 36).min(u32::MAX as u64) as u32
}

/// Data chunk size field (offset 40).
pub fn data_chunk_size(data_size: u64) -> u32 {
    data_size.min(u32::MAX as u64) as u32
}

/// Patch both size fields of an in-memory header.
pub fn patch_sizes(header: &mut [u8], data_size: u64) {
    header[4..8].copy_from_slice(&riff_chunk_size(data_size).to_le_bytes());
    header[40..44].copy_from_slice(&data_chunk_size(data_size).to_le_bytes());
}
