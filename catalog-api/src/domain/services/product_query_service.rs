use std::sync::Arc;

use crate::domain::models::product::{Product, ProductFilter};
use crate::domain::repositories::ProductRepository;
use crate::error::AppError;
use crate::utils::pagination::{DEFAULT_LIMIT, DEFAULT_PAGE, Paginated};

#[derive(Clone)]
pub struct ProductQueryService {
    repo: Arc<dyn ProductRepository>,
}

impl ProductQueryService {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    /// 过滤 + 分页的产品列表；页数据和总数并发取回
    pub async fn list(&self, filter: ProductFilter) -> Result<Paginated<Product>, AppError> {
        let page = filter.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let limit = filter.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);
        let offset = (page - 1) * limit;

        let (items, total) = tokio::try_join!(
            self.repo.list(&filter, limit, offset),
            self.repo.count(&filter),
        )?;

        Ok(Paginated::new(items, page, limit, total))
    }

    /// 按 id 或 slug 解析单个产品
    pub async fn get(&self, identifier: &str) -> Result<Product, AppError> {
        self.repo
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product `{}` not found", identifier)))
    }
}
