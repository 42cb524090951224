use crate::error::{Error, Result};
use crate::types::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One inbound job message
///
/// ```json
/// {"jobId": "1AbC", "projectName": "proj", "sheetName": "Links", "driveFolderId": "xyz"}
/// ```
///
/// `spreadsheetId` is accepted in place of `jobId`. Unknown fields are kept in
/// [`extra`](Self::extra).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Identity that serializes operations of this job
    #[serde(alias = "spreadsheetId")]
    pub job_id: JobId,

    /// Overrides the configured project name for this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Tab of the tracking store to read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,

    /// Top-level destination folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_folder_id: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl JobRequest {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            project_name: None,
            sheet_name: None,
            drive_folder_id: None,
            extra: BTreeMap::new(),
        }
    }

    /// Decode a raw message body
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON object with a non-empty job id.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let request: Self = serde_json::from_slice(body)?;
        if request.job_id.as_str().trim().is_empty() {
            return Err(Error::Other("job request has an empty job id".into()));
        }
        Ok(request)
    }

    /// Project name for this job, falling back to `default`
    pub fn project_name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.project_name
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(default)
    }
}
