//! Concrete speech engines behind `SpeechEngine`.

pub mod command;
pub mod mock_audio;

pub use command::CommandSpeechEngine;
pub use mock_audio::MockSpeechEngine;
