pub mod bearing;
pub mod track;

pub use bearing::{handle_bearing, handle_phrase};
pub use track::{TrackOptions, handle_track};
