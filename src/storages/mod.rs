//! Storage backends

mod local;

pub use local::LocalStorage;
