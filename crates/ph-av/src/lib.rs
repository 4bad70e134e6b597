//! External encoder toolchain integration.
//!
//! This crate owns everything that talks to ffmpeg/ffprobe/dovi_tool short
//! of running a playback session: bounded command execution
//! ([`ToolCommand`]), tool discovery ([`ToolRegistry`]), functional
//! capability probing ([`CapabilityProber`] → [`CapabilityManifest`]) and
//! transcode planning ([`plan`] → [`EncodingPlan`]).

pub mod capabilities;
pub mod command;
pub mod planner;
pub mod tools;

pub use capabilities::{
    CapabilityManifest, CapabilityProber, DecoderSupport, DolbyVisionSupport, EncoderSupport,
    FilterSupport, HwAccelSupport, ManifestStore,
};
pub use command::{ToolCommand, ToolOutput};
pub use planner::{plan, EncodingPlan};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
