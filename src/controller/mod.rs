//! API Controller modules
//!
//! Consolidated controllers organized by domain.

pub mod misc;
pub mod portfolio;
pub mod rewards;
