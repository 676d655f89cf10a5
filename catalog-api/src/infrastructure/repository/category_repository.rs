use async_trait::async_trait;
use sqlx::MySqlPool;

use crate::domain::models::category::Category;
use crate::domain::repositories::CategoryRepository;
use crate::error::AppError;

#[derive(Clone)]
pub struct MySqlCategoryRepository {
    pool: MySqlPool,
}

impl MySqlCategoryRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for MySqlCategoryRepository {
    async fn list_all(&self) -> Result<Vec<Category>, AppError> {
        let categories = sqlx::query_as::<_, Category>(
            r#"SELECT id, name, color, slug FROM categories ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }
}
