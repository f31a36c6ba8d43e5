//! Result descriptor returned for every successful operation.

use serde::{Deserialize, Serialize};

/// JSON body of a successful `POST /api/process/{operation}`.
///
/// `output_path` is an output-store filename, suitable for
/// `GET /api/download/{filename}`. Operations that write several files
/// (split, pdf-to-jpg) also list all of them, in page order, in
/// `output_paths`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub output_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_paths: Vec<String>,
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OperationResult {
    /// Build a success descriptor from the produced filenames.
    ///
    /// Returns `None` when `names` is empty; a success must reference a file.
    pub fn from_outputs(names: Vec<String>, message: Option<String>) -> Option<Self> {
        let first = names.first()?.clone();
        let output_paths = if names.len() > 1 { names } else { Vec::new() };
        Some(Self {
            success: true,
            download_url: download_url(&first),
            output_path: first,
            output_paths,
            message,
        })
    }

    /// Every produced filename, the primary one first.
    pub fn all_outputs(&self) -> Vec<&str> {
        if self.output_paths.is_empty() {
            vec![self.output_path.as_str()]
        } else {
            self.output_paths.iter().map(String::as_str).collect()
        }
    }
}

/// Download route for an output-store filename.
pub fn download_url(file_name: &str) -> String {
    format!("/api/download/{file_name}")
}
