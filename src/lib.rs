//! NDVI time-series exploration for burn-scar analysis.
//!
//! The crate is split like the viewer that sits on top of it:
//! [`data`] turns files into grids and back, [`analysis`] computes on those
//! grids, and [`walkthrough`] chains everything into the headless lesson.

pub mod analysis;
pub mod config;
pub mod data;
pub mod ramp;
pub mod rng;
pub mod walkthrough;
