pub mod clients;
pub mod health;
pub mod midi;
pub mod playback;
pub mod scene;
pub mod stream;
pub mod tracks;
