use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::models::category::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub price: Decimal,
    pub category_id: i64,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 产品列表的查询条件，分页参数缺省时由查询服务补默认值
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category_id: Option<i64>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: String,
    pub video_url: Option<String>,
    pub price: Decimal,
    pub category_id: i64,
}

/// 部分更新的字段集合：外层 `None` 表示未提交该字段，
/// 内层 `None`（可清空字段）表示显式清空
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<Option<String>>,
    pub image_url: Option<String>,
    pub video_url: Option<Option<String>>,
    pub price: Option<Decimal>,
    pub category_id: Option<i64>,
}

impl ProductChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.slug.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
            && self.video_url.is_none()
            && self.price.is_none()
            && self.category_id.is_none()
    }
}
