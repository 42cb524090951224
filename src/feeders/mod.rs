//! Feeder backends

mod list;

pub use list::{ListFeeder, TrackingRow};
