//! council-voice - read-aloud playback for LLM council chat responses
//!
//! This crate provides:
//! - Cached retrieval of synthesized response audio from the council backend
//! - A single-device player with manual (preemptive) and auto-read (queued) playback
//! - Download of response audio to disk
//! - TOML configuration and the `council-voice` CLI

pub mod config;
pub mod voice;

pub use config::Config;
