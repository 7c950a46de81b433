pub mod audio_capture_loop;
pub mod frame_dispatcher;
pub mod lifecycle;
