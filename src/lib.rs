//! scoreboard-reader - Region-based scoreboard screenshot recognition
//!
//! Reads stats out of game scoreboard screenshots using per-layout region
//! profiles: portrait regions are identified by perceptual hash, text
//! regions by batched OCR.

pub mod app;
pub mod config;
pub mod error;
pub mod storage;
pub mod vision;
