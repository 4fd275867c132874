use std::path::Path;

use super::{UploadError, ValidationOutcome};
use crate::config::Config;

/// Filename, type and size rules applied before any bytes are stored.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    allowed_extensions: Vec<String>,
    allowed_mime_types: Vec<String>,
    size_limit: Option<u64>,
    max_request_size: u64,
}

impl ValidationPolicy {
    pub fn new(
        allowed_extensions: Vec<String>,
        allowed_mime_types: Vec<String>,
        size_limit: Option<u64>,
        max_request_size: u64,
    ) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            allowed_mime_types: allowed_mime_types
                .into_iter()
                .map(|m| m.to_lowercase())
                .collect(),
            size_limit,
            max_request_size,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.upload.allowed_extensions.clone(),
            config.upload.allowed_mime_types.clone(),
            config.upload.size_limit,
            config.node.max_request_size,
        )
    }

    pub fn size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    /// Run every rule in order; the first failure wins.
    pub fn validate(
        &self,
        upload_dir: &Path,
        content_type: Option<&str>,
        filename: Option<&str>,
        declared_size: u64,
        mime_type: Option<&str>,
    ) -> ValidationOutcome {
        self.check_server()?;
        self.check_directory(upload_dir)?;
        check_encoding(content_type)?;
        self.check_file(filename, declared_size, mime_type)
    }

    /// The transport must accept requests at least as large as the size limit.
    pub fn check_server(&self) -> ValidationOutcome {
        match self.size_limit {
            Some(limit) if self.max_request_size < limit => {
                let megabytes = (limit / 1024 / 1024).max(1);
                Err(UploadError::ServerMisconfigured {
                    required: format!("{megabytes}M"),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn check_directory(&self, upload_dir: &Path) -> ValidationOutcome {
        if is_accessible(upload_dir) {
            Ok(())
        } else {
            Err(UploadError::DirectoryInaccessible)
        }
    }

    pub fn check_encoding(&self, content_type: Option<&str>) -> ValidationOutcome {
        check_encoding(content_type)
    }

    /// Name, size, extension and MIME rules for one candidate file.
    pub fn check_file(
        &self,
        filename: Option<&str>,
        declared_size: u64,
        mime_type: Option<&str>,
    ) -> ValidationOutcome {
        let filename = filename.unwrap_or_default();
        if filename.is_empty() {
            return Err(UploadError::EmptyName);
        }

        if declared_size == 0 {
            return Err(UploadError::EmptyFile);
        }

        self.check_size(declared_size)?;
        self.check_extension(filename)?;

        if !self.allowed_mime_types.is_empty() {
            let mime_type = mime_type.unwrap_or_default().to_lowercase();
            if !self.allowed_mime_types.contains(&mime_type) {
                return Err(UploadError::InvalidMimeType {
                    allowed: self.allowed_mime_types.join(", "),
                });
            }
        }

        Ok(())
    }

    pub fn check_size(&self, size: u64) -> ValidationOutcome {
        match self.size_limit {
            Some(limit) if size > limit => Err(UploadError::TooLarge { limit }),
            _ => Ok(()),
        }
    }

    pub fn check_extension(&self, filename: &str) -> ValidationOutcome {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }

        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        if self.allowed_extensions.contains(&ext) {
            Ok(())
        } else {
            Err(UploadError::InvalidExtension {
                allowed: self.allowed_extensions.join(", "),
            })
        }
    }
}

fn check_encoding(content_type: Option<&str>) -> ValidationOutcome {
    match content_type {
        None => Err(UploadError::NoFileProvided),
        Some(ct) if ct.trim().to_lowercase().starts_with("multipart/") => Ok(()),
        Some(_) => Err(UploadError::NotMultipart),
    }
}

/// A directory is usable when it exists, is writable and, on unix, traversable
/// by this process. Mode bits alone describe the owner's rights, so unix also
/// asks the kernel whether we may write and search it.
pub fn is_accessible(dir: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(dir) else {
        return false;
    };
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return false;
    }

    #[cfg(unix)]
    {
        use rustix::fs::{access, Access};
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
            && access(dir, Access::WRITE_OK | Access::EXEC_OK).is_ok()
    }

    #[cfg(not(unix))]
    {
        true
    }
}

/// Reduce a client filename to its last path component.
///
/// Returns `None` when nothing usable is left (empty, `.` or `..`).
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}

/// Upload ids become directory names, so they must be one plain path component.
pub fn validate_upload_id(upload_id: &str) -> Result<&str, UploadError> {
    let valid = !upload_id.is_empty()
        && upload_id.len() <= 128
        && upload_id != "."
        && upload_id != ".."
        && !upload_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());

    if valid {
        Ok(upload_id)
    } else {
        Err(UploadError::InvalidUploadId(upload_id.to_string()))
    }
}
