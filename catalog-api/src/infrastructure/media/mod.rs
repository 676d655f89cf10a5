use async_trait::async_trait;

use crate::error::AppError;

pub mod cloudinary;

pub use cloudinary::CloudinaryClient;

/// 上传请求携带的文件内容
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
}

// 媒体托管接口：上传返回可持久化的 URL，释放按 URL 删除远端资源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        folder: &str,
        name_hint: Option<String>,
    ) -> Result<String, AppError>;

    async fn release(&self, url: &str) -> Result<(), AppError>;
}
