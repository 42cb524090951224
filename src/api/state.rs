//! Application state for the intake API

use crate::jobs::JobController;
use std::sync::Arc;

/// Shared state handed to every route handler
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<JobController>,
}

impl AppState {
    pub fn new(controller: Arc<JobController>) -> Self {
        Self { controller }
    }
}
