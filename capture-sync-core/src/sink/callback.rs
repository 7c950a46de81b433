use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::error::CaptureError;
use crate::models::video_models::TextureHandle;
use crate::timing::media_clock::MediaTime;
use crate::traits::media_sink::MediaSink;

pub type AudioSampleFn = Box<dyn Fn(&[u8], u32, MediaTime) -> Result<(), CaptureError> + Send + Sync>;
pub type FrameFn = Box<dyn Fn(&TextureHandle, MediaTime) -> Result<(), CaptureError> + Send + Sync>;
pub type FinalizeFn = Box<dyn Fn() -> Result<(), CaptureError> + Send + Sync>;

/// Sink that forwards every call to host-supplied closures.
///
/// Unset closures accept and discard. Calls after `finalize` fail with
/// `SinkFinalized`.
#[derive(Default)]
pub struct CallbackSink {
    on_audio: Option<AudioSampleFn>,
    on_frame: Option<FrameFn>,
    on_finalize: Option<FinalizeFn>,
    finalized: AtomicBool,
}

impl CallbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_audio<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8], u32, MediaTime) -> Result<(), CaptureError> + Send + Sync + 'static,
    {
        self.on_audio = Some(Box::new(callback));
        self
    }

    pub fn on_frame<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TextureHandle, MediaTime) -> Result<(), CaptureError> + Send + Sync + 'static,
    {
        self.on_frame = Some(Box::new(callback));
        self
    }

    pub fn on_finalize<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> Result<(), CaptureError> + Send + Sync + 'static,
    {
        self.on_finalize = Some(Box::new(callback));
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), CaptureError> {
        if self.is_finalized() {
            Err(CaptureError::SinkFinalized)
        } else {
            Ok(())
        }
    }
}

impl MediaSink for CallbackSink {
    fn write_audio_sample(&self, data: &[u8], frame_count: u32, timestamp: MediaTime) -> Result<(), CaptureError> {
        self.ensure_open()?;
        match &self.on_audio {
            Some(callback) => callback(data, frame_count, timestamp),
            None => Ok(()),
        }
    }

    fn write_frame(&self, texture: &TextureHandle, timestamp: MediaTime) -> Result<(), CaptureError> {
        self.ensure_open()?;
        match &self.on_frame {
            Some(callback) => callback(texture, timestamp),
            None => Ok(()),
        }
    }

    fn finalize(&self) -> Result<(), CaptureError> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Err(CaptureError::SinkFinalized);
        }
        match &self.on_finalize {
            Some(callback) => callback(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::texture;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn forwards_each_call() {
        let audio = Arc::new(Mutex::new(Vec::new()));
        let frames = Arc::new(AtomicUsize::new(0));
        let finals = Arc::new(AtomicUsize::new(0));

        let audio_log = Arc::clone(&audio);
        let frame_count = Arc::clone(&frames);
        let final_count = Arc::clone(&finals);
        let sink = CallbackSink::new()
            .on_audio(move |data, frames, ts| {
                audio_log.lock().push((data.len(), frames, ts));
                Ok(())
            })
            .on_frame(move |_, _| {
                frame_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_finalize(move || {
                final_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        sink.write_audio_sample(&[0u8; 8], 1, MediaTime::from_ticks(5)).unwrap();
        sink.write_frame(&texture(1), MediaTime::from_ticks(6)).unwrap();
        sink.finalize().unwrap();

        assert_eq!(*audio.lock(), vec![(8, 1, MediaTime::from_ticks(5))]);
        assert_eq!(frames.load(Ordering::SeqCst), 1);
        assert_eq!(finals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_errors_pass_through() {
        let sink = CallbackSink::new().on_frame(|_, _| Err(CaptureError::WriteFailed("encoder busy".into())));
        assert_eq!(
            sink.write_frame(&texture(1), MediaTime::ZERO),
            Err(CaptureError::WriteFailed("encoder busy".into()))
        );
    }

    #[test]
    fn closed_after_finalize() {
        let sink = CallbackSink::new();
        sink.write_audio_sample(&[], 0, MediaTime::ZERO).unwrap();
        sink.finalize().unwrap();

        assert_eq!(sink.finalize(), Err(CaptureError::SinkFinalized));
        assert_eq!(
            sink.write_audio_sample(&[], 0, MediaTime::ZERO),
            Err(CaptureError::SinkFinalized)
        );
    }
}
