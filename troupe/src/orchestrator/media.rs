//! Image attachments for multimodal task prompts.
//!
//! Local files are base64-encoded into `data:` URLs typed by extension;
//! HTTP(S) URLs pass through. Video inputs are rejected before dispatch —
//! no frame-decoding backend ships in this stack — which marks the task
//! failed rather than sending an unreadable attachment.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::RuntimeError;
use crate::message::ContentPart;

/// Builds `image_url` parts for a task's attachments.
pub(crate) async fn build_image_parts(images: &[String]) -> Result<Vec<ContentPart>, RuntimeError> {
    let mut parts = Vec::with_capacity(images.len());
    for image in images {
        if image.starts_with("http://") || image.starts_with("https://") {
            parts.push(ContentPart::image_url(image.clone()));
            continue;
        }
        let path = Path::new(image);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if ext == "mp4" {
            return Err(RuntimeError::Resource(format!(
                "video decoding is unavailable, cannot attach {}",
                image
            )));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RuntimeError::Resource(format!("cannot read image {}: {}", image, e)))?;
        let encoded = STANDARD.encode(bytes);
        parts.push(ContentPart::image_url(format!(
            "data:image/{};base64,{}",
            ext, encoded
        )));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: remote URLs pass through; local files become typed data
    /// URLs.
    #[tokio::test]
    async fn remote_urls_pass_through_and_files_encode() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("pic.png");
        tokio::fs::write(&png, b"fakepng").await.unwrap();

        let parts = build_image_parts(&[
            "https://example.com/a.jpg".to_string(),
            png.to_string_lossy().to_string(),
        ])
        .await
        .unwrap();

        assert_eq!(parts.len(), 2);
        let urls: Vec<String> = parts
            .iter()
            .map(|p| match p {
                ContentPart::ImageUrl { image_url } => image_url.url.clone(),
                _ => panic!("expected image parts"),
            })
            .collect();
        assert_eq!(urls[0], "https://example.com/a.jpg");
        assert!(urls[1].starts_with("data:image/png;base64,"));
        assert!(urls[1].len() > "data:image/png;base64,".len());
    }

    /// **Scenario**: mp4 attachments are a Resource error.
    #[tokio::test]
    async fn mp4_is_rejected() {
        let err = build_image_parts(&["clip.mp4".to_string()]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Resource(_)));
        assert!(err.to_string().contains("clip.mp4"));
    }

    /// **Scenario**: a missing local file is a Resource error.
    #[tokio::test]
    async fn missing_file_is_resource_error() {
        let err = build_image_parts(&["/nonexistent/x.png".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Resource(_)));
    }
}
