//! WASAPI audio device for the capture loop.
//!
//! Opens either the default render endpoint with
//! `AUDCLNT_STREAMFLAGS_LOOPBACK` (system audio) or a capture endpoint
//! (microphone) in shared mode, and hands packets to the core one at a time.
//!
//! ## Threading
//! `initialize` and `start` run on the control thread; `read_samples`,
//! `release_buffer` and `stop` run on the core's audio capture thread. The
//! interfaces live in the multithreaded apartment, which `ComSubsystem`
//! keeps alive for the whole session, so they may be used from both.
//!
//! ## Loopback notes
//! - No permissions needed; DRM-protected audio is silenced
//! - The endpoint delivers no packets at all while nothing plays, which the
//!   core fills with virtual silence

use windows::core::PCWSTR;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use capture_sync_core::models::audio_models::{AudioBufferFlags, AudioFormat, AudioPacket, CaptureMode};
use capture_sync_core::models::error::CaptureError;
use capture_sync_core::traits::audio_device::AudioDevice;

/// Shared-mode buffer duration: 100ms in 100ns units.
const BUFFER_DURATION: i64 = 1_000_000;

/// WASAPI endpoint behind the `AudioDevice` interface.
pub struct WasapiAudioDevice {
    device_id: Option<String>,
    client: Option<IAudioClient>,
    capture: Option<IAudioCaptureClient>,
    format: AudioFormat,
    mmcss: Option<HANDLE>,
    running: bool,
}

// SAFETY: the COM interfaces are MTA objects, and the device is only ever
// used by one thread at a time (moved onto the capture thread after start).
unsafe impl Send for WasapiAudioDevice {}

impl WasapiAudioDevice {
    /// The default endpoint for whichever mode `initialize` is given.
    pub fn default_endpoint() -> Self {
        Self {
            device_id: None,
            client: None,
            capture: None,
            format: AudioFormat::default(),
            mmcss: None,
            running: false,
        }
    }

    /// A specific capture endpoint by MMDevice id. Only used for microphone
    /// mode; loopback always opens the default render endpoint.
    pub fn with_device(id: String) -> Self {
        Self {
            device_id: Some(id),
            ..Self::default_endpoint()
        }
    }

    fn endpoint(&self, enumerator: &IMMDeviceEnumerator, mode: CaptureMode) -> Result<IMMDevice, CaptureError> {
        unsafe {
            match (mode, &self.device_id) {
                (CaptureMode::Loopback, _) => enumerator.GetDefaultAudioEndpoint(eRender, eConsole),
                (CaptureMode::Microphone, Some(id)) => {
                    let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                    enumerator.GetDevice(PCWSTR(wide_id.as_ptr()))
                }
                (CaptureMode::Microphone, None) => enumerator.GetDefaultAudioEndpoint(eCapture, eConsole),
            }
            .map_err(|_| CaptureError::DeviceNotAvailable)
        }
    }

    /// Register the calling thread with MMCSS once.
    fn boost_capture_thread(&mut self) {
        if self.mmcss.is_some() {
            return;
        }
        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        match unsafe { AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) } {
            Ok(handle) => self.mmcss = Some(handle),
            Err(e) => {
                log::warn!("MMCSS registration failed: {}", e);
                self.mmcss = Some(HANDLE::default());
            }
        }
    }
}

impl AudioDevice for WasapiAudioDevice {
    fn initialize(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|_| CaptureError::DeviceNotAvailable)?;
            let device = self.endpoint(&enumerator, mode)?;

            let client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::ConfigurationFailed(format!("Activate failed: {}", e)))?;

            let mix_format_ptr = client
                .GetMixFormat()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?;
            let mix_format = &*mix_format_ptr;
            self.format = AudioFormat {
                sample_rate: mix_format.nSamplesPerSec,
                channels: mix_format.nChannels,
                bits_per_sample: mix_format.wBitsPerSample,
            };

            let flags = match mode {
                CaptureMode::Loopback => AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                CaptureMode::Microphone => AUDCLNT_STREAMFLAGS_NOPERSIST,
            };
            let initialized = client.Initialize(AUDCLNT_SHAREMODE_SHARED, flags, BUFFER_DURATION, 0, mix_format, None);
            CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
            initialized.map_err(|e| {
                CaptureError::ConfigurationFailed(format!("IAudioClient::Initialize ({:?}) failed: {}", mode, e))
            })?;

            let capture: IAudioCaptureClient = client
                .GetService()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

            self.client = Some(client);
            self.capture = Some(capture);
        }
        log::info!("WASAPI {:?} endpoint opened: {:?}", mode, self.format);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let client = self.client.as_ref().ok_or(CaptureError::DeviceNotAvailable)?;
        unsafe { client.Start() }.map_err(|e| CaptureError::DeviceStartFailed(format!("IAudioClient::Start failed: {}", e)))?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            if let Some(client) = &self.client {
                if let Err(e) = unsafe { client.Stop() } {
                    log::warn!("IAudioClient::Stop failed: {}", e);
                }
            }
            self.running = false;
        }
        if let Some(handle) = self.mmcss.take() {
            if !handle.is_invalid() {
                let _ = unsafe { AvRevertMmThreadCharacteristics(handle) };
            }
        }
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read_samples(&mut self) -> Result<Option<AudioPacket>, CaptureError> {
        self.boost_capture_thread();
        let capture = self.capture.as_ref().ok_or(CaptureError::DeviceNotAvailable)?;

        unsafe {
            let packet_length = capture
                .GetNextPacketSize()
                .map_err(|e| CaptureError::ReadFailed(format!("GetNextPacketSize failed: {}", e)))?;
            if packet_length == 0 {
                return Ok(None);
            }

            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;
            let mut position: u64 = 0;
            capture
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, Some(&mut position), None)
                .map_err(|e| CaptureError::ReadFailed(format!("GetBuffer failed: {}", e)))?;

            let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
            let discontinuity = flags & (AUDCLNT_BUFFERFLAGS_DATA_DISCONTINUITY.0 as u32) != 0;
            let bytes = self.format.bytes_for_frames(num_frames);
            let data = if silent || buffer_ptr.is_null() {
                vec![0u8; bytes]
            } else {
                std::slice::from_raw_parts(buffer_ptr, bytes).to_vec()
            };
            if discontinuity {
                log::debug!("WASAPI reported a data discontinuity at position {}", position);
            }

            Ok(Some(AudioPacket {
                data,
                frame_count: num_frames,
                flags: AudioBufferFlags { silent, discontinuity },
                device_position: position,
            }))
        }
    }

    fn release_buffer(&mut self, frames_read: u32) -> Result<(), CaptureError> {
        let capture = self.capture.as_ref().ok_or(CaptureError::DeviceNotAvailable)?;
        unsafe { capture.ReleaseBuffer(frames_read) }
            .map_err(|e| CaptureError::ReadFailed(format!("ReleaseBuffer failed: {}", e)))
    }
}

impl Drop for WasapiAudioDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
