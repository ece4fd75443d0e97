//! External format conversion (ffmpeg).

pub mod audio;

pub use audio::convert_to_mp3;
