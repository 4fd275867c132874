use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::policy::sanitize_filename;
use super::UploadError;

/// The file part of a multipart upload request.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Filename the multipart part declared for itself
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Protocol fields of one upload request (`qq*` fields plus the file part).
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// `qqfilename`
    pub filename: Option<String>,
    /// `qquuid`
    pub uuid: String,
    /// `qqtotalparts`, 1 for a whole-file upload
    pub total_parts: u32,
    /// `qqpartindex`
    pub part_index: u32,
    /// `qqtotalfilesize`
    pub total_file_size: Option<u64>,
    pub file: Option<FilePart>,
}

impl Default for UploadRequest {
    fn default() -> Self {
        Self {
            filename: None,
            uuid: String::new(),
            total_parts: 1,
            part_index: 0,
            total_file_size: None,
            file: None,
        }
    }
}

impl UploadRequest {
    /// Client filename, falling back to the file part's own name.
    pub fn name(&self) -> Option<String> {
        self.filename
            .as_deref()
            .or_else(|| self.file.as_ref().and_then(|f| f.file_name.as_deref()))
            .and_then(sanitize_filename)
    }

    /// MIME type of the file part, guessed from the filename when the client
    /// sent none or only the generic binary type.
    pub fn mime_type(&self) -> Option<String> {
        self.file
            .as_ref()
            .and_then(|f| f.content_type.clone())
            .filter(|ct| ct != "application/octet-stream")
            .or_else(|| {
                self.name()
                    .and_then(|n| mime_guess::from_path(n).first())
                    .map(|m| m.to_string())
            })
            .or_else(|| self.file.as_ref().and_then(|f| f.content_type.clone()))
    }
}

/// Form body of the finalize call that assembles a chunked upload.
#[derive(Debug, Clone, Deserialize)]
pub struct CombineRequest {
    #[serde(rename = "qquuid")]
    pub uuid: String,
    #[serde(rename = "qqfilename", default)]
    pub filename: Option<String>,
    #[serde(rename = "qqtotalparts", default = "default_total_parts")]
    pub total_parts: u32,
    #[serde(rename = "qqtotalfilesize", default)]
    pub total_file_size: Option<u64>,
}

fn default_total_parts() -> u32 {
    1
}

/// Response body understood by upload widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_retry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_name: Option<String>,
}

impl UploadResponse {
    pub fn success(uuid: impl Into<String>, upload_name: Option<String>) -> Self {
        Self {
            success: true,
            uuid: uuid.into(),
            error: None,
            prevent_retry: None,
            upload_name,
        }
    }

    pub fn failure(uuid: impl Into<String>, error: &UploadError) -> Self {
        Self {
            success: false,
            uuid: uuid.into(),
            error: Some(error.to_string()),
            prevent_retry: error.prevent_retry().then_some(true),
            upload_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response_omits_error_fields() {
        let json = serde_json::to_value(UploadResponse::success("U1", Some("a.txt".into()))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": true, "uuid": "U1", "uploadName": "a.txt" })
        );
    }

    #[test]
    fn test_size_failure_sets_prevent_retry() {
        let err = UploadError::TooLarge { limit: 10 };
        let json = serde_json::to_value(UploadResponse::failure("U1", &err)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["preventRetry"], true);
        assert_eq!(json["error"], "File is too large. The limit is 10 bytes.");

        let json = serde_json::to_value(UploadResponse::failure("U1", &UploadError::EmptyFile)).unwrap();
        assert!(json.get("preventRetry").is_none());
    }

    #[test]
    fn test_name_falls_back_to_part_filename() {
        let request = UploadRequest {
            file: Some(FilePart {
                file_name: Some("C:\\docs\\scan.PNG".to_string()),
                content_type: Some("application/octet-stream".to_string()),
                data: Bytes::from_static(b"x"),
            }),
            ..Default::default()
        };
        assert_eq!(request.name().as_deref(), Some("scan.PNG"));
        assert_eq!(request.mime_type().as_deref(), Some("image/png"));
    }

    #[test]
    fn test_combine_request_defaults() {
        let request: CombineRequest = serde_json::from_value(serde_json::json!({ "qquuid": "U1" })).unwrap();
        assert_eq!(request.total_parts, 1);
        assert!(request.filename.is_none());
    }
}
