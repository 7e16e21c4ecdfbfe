//! Slider Bridge
//!
//! Ingests slider position reports from a multi-slider mixer device, detects
//! which sliders actually moved, and fans the moves out to volume-binding
//! consumers.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod reload;
pub mod slider;
pub mod transport;

pub use bridge::{BridgeController, BridgeState};
pub use config::{BridgeConfig, ConfigWatcher};
pub use dispatch::{EventDispatcher, PublishMode};
pub use error::{BridgeError, MalformedLineError, TransportError};
pub use reload::{ReloadCoordinator, ReloadEpoch};
pub use slider::{SliderLine, SliderMoveEvent, SliderStateTracker, TrackerSettings};
pub use transport::{HttpLineSource, Line, LineSource, StreamLineSource};
