mod command;
mod ffmpeg;

pub use ffmpeg::{Ffmpeg, MediaInfo, StreamSplitter};
