pub mod event_types;
pub mod events;
pub mod frames;

pub use events::Event;
pub use frames::{parse_frame, Envelope, FrameError};
