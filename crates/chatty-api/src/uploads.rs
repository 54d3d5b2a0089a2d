use std::path::Path;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("payload is not a valid base64-encoded image")]
    Decode,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Decode => Self::BadRequest(e.to_string()),
            UploadError::Io(e) => Self::Internal(e.into()),
        }
    }
}

/// Decode a base64 image (raw or `data:image/...;base64,` URL), write it to
/// the upload directory under a generated name, and return its URL path.
pub fn save_base64_image(dir: &Path, payload: &str) -> Result<String, UploadError> {
    let encoded = payload
        .rsplit_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(payload);
    let bytes = B64.decode(encoded.trim()).map_err(|_| UploadError::Decode)?;

    // Trust the bytes, not the declared mime type
    let kind = infer::get(&bytes)
        .filter(|k| k.matcher_type() == infer::MatcherType::Image)
        .ok_or(UploadError::Decode)?;

    std::fs::create_dir_all(dir)?;
    let filename = format!("{}.{}", Uuid::new_v4(), kind.extension());
    std::fs::write(dir.join(&filename), &bytes)?;
    info!("Stored uploaded image {} ({} bytes)", filename, bytes.len());

    Ok(format!("/uploads/{filename}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Smallest valid PNG (1x1, truncated IDAT is fine for type sniffing)
    const PNG_BYTES: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1f, 0x15, 0xc4, 0x89,
    ];

    fn temp_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chatty-uploads-{}", Uuid::new_v4()))
    }

    #[test]
    fn stores_data_url_and_returns_url_path() {
        let dir = temp_dir();
        let payload = format!("data:image/png;base64,{}", B64.encode(PNG_BYTES));

        let url = save_base64_image(&dir, &payload).unwrap();
        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with(".png"));

        let stored = std::fs::read(dir.join(url.trim_start_matches("/uploads/"))).unwrap();
        assert_eq!(stored, PNG_BYTES);
    }

    #[test]
    fn rejects_non_image_payloads() {
        let dir = temp_dir();
        let err = save_base64_image(&dir, &B64.encode(b"just text")).unwrap_err();
        assert!(matches!(err, UploadError::Decode));

        let err = save_base64_image(&dir, "%%%not-base64%%%").unwrap_err();
        assert!(matches!(err, UploadError::Decode));
    }
}
