pub mod media_clock;
pub mod silence;
