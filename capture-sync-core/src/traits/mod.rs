pub mod audio_device;
pub mod media_sink;
pub mod platform_subsystem;
pub mod video_source;
