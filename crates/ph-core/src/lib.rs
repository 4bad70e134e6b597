//! Core types shared across the playhead workspace.
//!
//! This crate is dependency-light on purpose: errors, configuration, typed
//! identifiers and the media model live here so that every other crate can
//! agree on them without pulling in the AV or HTTP stacks.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

pub use error::{Error, Result};
pub use ids::{MediaId, SessionId, UserId};
pub use media::{
    AudioCodec, FieldOrder, HdrFormat, MediaSource, MediaType, PlaybackProfile, VideoCodec,
};
