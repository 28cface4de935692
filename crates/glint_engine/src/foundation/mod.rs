//! Foundation utilities shared by every engine layer
//!
//! Math aliases and camera helpers, plus logging setup.

pub mod logging;
pub mod math;
