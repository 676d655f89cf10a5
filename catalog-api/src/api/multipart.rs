use axum::extract::multipart::Field;

use crate::error::AppError;
use crate::infrastructure::media::MediaUpload;

pub(crate) async fn read_text(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart field: {}", e)))
}

/// 空串归一化为 `None`，调用方用它表达“显式清空”
pub(crate) fn optional_text(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// 浏览器没选文件时会提交空的文件域，按未提交处理
pub(crate) async fn read_image(field: Field<'_>) -> Result<Option<MediaUpload>, AppError> {
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid file upload: {}", e)))?;

    if bytes.is_empty() {
        return Ok(None);
    }

    Ok(Some(MediaUpload {
        bytes: bytes.to_vec(),
    }))
}
