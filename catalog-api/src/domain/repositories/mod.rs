use async_trait::async_trait;

use crate::domain::models::banner::{Banner, NewBanner};
use crate::domain::models::category::Category;
use crate::domain::models::product::{NewProduct, Product, ProductChanges, ProductFilter};
use crate::error::AppError;

// 仓库接口，服务层只依赖接口，方便在测试里替换
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// 按数字 id 或 slug 解析产品；两个分支合在同一条查询里
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Product>, AppError>;

    async fn list(
        &self,
        filter: &ProductFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Product>, AppError>;

    async fn count(&self, filter: &ProductFilter) -> Result<u64, AppError>;

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool, AppError>;

    async fn insert(&self, product: &NewProduct) -> Result<Product, AppError>;

    async fn update(&self, id: i64, changes: &ProductChanges) -> Result<Product, AppError>;

    async fn delete(&self, id: i64) -> Result<(), AppError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Category>, AppError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BannerRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Banner>, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Banner>, AppError>;

    async fn insert(&self, banner: &NewBanner) -> Result<Banner, AppError>;

    async fn delete(&self, id: i64) -> Result<(), AppError>;
}
