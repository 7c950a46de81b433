//! # capture-sync-windows
//!
//! Windows backend for capture-sync.
//!
//! Provides:
//! - `WasapiAudioDevice`: loopback or microphone capture via WASAPI shared mode
//! - `ComSubsystem`: process-wide COM apartment for `PlatformRuntime`
//!
//! ## Platform Requirements
//! - Windows 8+ (`CoIncrementMTAUsage`)
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use capture_sync_core::{CaptureConfiguration, CaptureSession, PlatformRuntime};
//! use capture_sync_windows::{ComSubsystem, WasapiAudioDevice};
//!
//! let runtime = PlatformRuntime::new(Arc::new(ComSubsystem::new()));
//! let session = CaptureSession::new(
//!     CaptureConfiguration::default(),
//!     runtime,
//!     Box::new(WasapiAudioDevice::default_endpoint()),
//!     video_source,
//!     sink,
//! );
//! session.initialize()?;
//! session.start()?;
//! ```

#[cfg(target_os = "windows")]
pub mod com_runtime;
#[cfg(target_os = "windows")]
pub mod wasapi_device;

#[cfg(target_os = "windows")]
pub use com_runtime::ComSubsystem;
#[cfg(target_os = "windows")]
pub use wasapi_device::WasapiAudioDevice;
