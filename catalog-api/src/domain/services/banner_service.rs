use std::sync::Arc;

use tracing::warn;

use crate::domain::models::banner::{Banner, NewBanner};
use crate::domain::repositories::BannerRepository;
use crate::error::AppError;
use crate::infrastructure::media::{MediaStore, MediaUpload};

const MEDIA_FOLDER: &str = "banners";

#[derive(Clone)]
pub struct BannerService {
    repo: Arc<dyn BannerRepository>,
    media: Arc<dyn MediaStore>,
}

impl BannerService {
    pub fn new(repo: Arc<dyn BannerRepository>, media: Arc<dyn MediaStore>) -> Self {
        Self { repo, media }
    }

    pub async fn list(&self) -> Result<Vec<Banner>, AppError> {
        self.repo.list_all().await
    }

    pub async fn create(
        &self,
        name: Option<String>,
        image: MediaUpload,
    ) -> Result<Banner, AppError> {
        if image.bytes.is_empty() {
            return Err(AppError::Validation("banner image is required".to_string()));
        }

        let image_url = self
            .media
            .upload(image.bytes, MEDIA_FOLDER, name.clone())
            .await?;

        let new_banner = NewBanner {
            name,
            image_url: image_url.clone(),
        };

        match self.repo.insert(&new_banner).await {
            Ok(banner) => Ok(banner),
            Err(e) => {
                // 落库失败时回收刚上传的图片
                if let Err(media_err) = self.media.release(&image_url).await {
                    warn!(
                        "failed to release uploaded banner image {}: {}",
                        image_url, media_err
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        let existing = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Banner {} not found", id)))?;

        // 释放失败不阻塞行删除
        if let Err(media_err) = self.media.release(&existing.image_url).await {
            warn!(
                "failed to release image {} for banner {}: {}",
                existing.image_url, id, media_err
            );
        }

        self.repo.delete(id).await
    }
}
