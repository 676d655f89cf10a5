use async_trait::async_trait;
use sqlx::MySqlPool;

use crate::domain::models::banner::{Banner, NewBanner};
use crate::domain::repositories::BannerRepository;
use crate::error::AppError;

#[derive(Clone)]
pub struct MySqlBannerRepository {
    pool: MySqlPool,
}

impl MySqlBannerRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<Banner>, AppError> {
        let banner = sqlx::query_as::<_, Banner>(
            r#"SELECT id, name, image_url, created_at FROM banners WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(banner)
    }
}

#[async_trait]
impl BannerRepository for MySqlBannerRepository {
    async fn list_all(&self) -> Result<Vec<Banner>, AppError> {
        let banners = sqlx::query_as::<_, Banner>(
            r#"SELECT id, name, image_url, created_at FROM banners ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(banners)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Banner>, AppError> {
        self.fetch_by_id(id).await
    }

    async fn insert(&self, banner: &NewBanner) -> Result<Banner, AppError> {
        let result = sqlx::query(r#"INSERT INTO banners (name, image_url) VALUES (?, ?)"#)
            .bind(&banner.name)
            .bind(&banner.image_url)
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_id() as i64;
        self.fetch_by_id(id).await?.ok_or_else(|| {
            AppError::Internal(format!("banner {} vanished right after insert", id))
        })
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(r#"DELETE FROM banners WHERE id = ?"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
