pub mod callback;
pub mod wav_file;
