pub mod announce;
pub mod audio;
pub mod commands;
pub mod config;
pub mod events;
pub mod pipeline;
pub mod relay;
pub mod repeater;
pub mod stream;
pub mod telemetry;

pub use config::{AppConfig, RecordingMode, RepeaterSettings};
pub use events::{EngineEvent, EventBus};
pub use pipeline::{ControlRequest, Pipeline};
