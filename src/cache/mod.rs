mod playback;

pub use playback::PlaybackCache;
