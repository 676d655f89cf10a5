use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::api::categories::CategoryResponse;
use crate::api::multipart::{optional_text, read_image, read_text};
use crate::domain::models::product::{Product, ProductFilter};
use crate::domain::services::product_mutation_service::{NewProductInput, ProductPatch};
use crate::error::AppError;
use crate::infrastructure::media::MediaUpload;
use crate::server::AppState;
use crate::utils::pagination::Paginated;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/{identifier}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub price: Decimal,
    pub category_id: i64,
    pub category: CategoryResponse,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            slug: product.slug,
            description: product.description,
            image_url: product.image_url,
            video_url: product.video_url,
            price: product.price,
            category_id: product.category_id,
            category: product.category.into(),
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub pagination: PaginationMeta,
}

impl From<Paginated<Product>> for ProductListResponse {
    fn from(page: Paginated<Product>) -> Self {
        Self {
            pagination: PaginationMeta {
                page: page.page,
                limit: page.limit,
                total: page.total,
                total_pages: page.total_pages,
            },
            products: page.items.into_iter().map(ProductResponse::from).collect(),
        }
    }
}

/// 查询参数统一按字符串收，是否数字由这里裁决
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    pub category_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub price: Decimal,
    pub category_id: i64,
}

async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ProductListResponse>, AppError> {
    let category_id = match query
        .category_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            AppError::Validation("categoryId must be a numeric id".to_string())
        })?),
        None => None,
    };

    let filter = ProductFilter {
        category_id,
        search: query.search.filter(|s| !s.trim().is_empty()),
        // 非数字或非正数在查询服务里回退到默认值
        page: query.page.as_deref().and_then(|s| s.trim().parse().ok()),
        limit: query.limit.as_deref().and_then(|s| s.trim().parse().ok()),
    };

    let page = state.product_query.list(filter).await?;

    Ok(Json(ProductListResponse::from(page)))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<Json<ProductResponse>, AppError> {
    let product = state.product_query.get(&identifier).await?;

    Ok(Json(ProductResponse::from(product)))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    let form = ProductForm::from_multipart(multipart).await?;

    let name = form
        .name
        .ok_or_else(|| AppError::Validation("name is required".to_string()))?;
    let price = form
        .price
        .ok_or_else(|| AppError::Validation("price is required".to_string()))?;
    let category_id = form
        .category_id
        .ok_or_else(|| AppError::Validation("categoryId is required".to_string()))?;
    let image = form
        .image
        .ok_or_else(|| AppError::Validation("product image is required".to_string()))?;

    let request = CreateProductRequest {
        name,
        description: form.description.flatten(),
        video_url: form.video_url.flatten(),
        price: parse_price(&price)?,
        category_id: parse_category_id(&category_id)?,
    };
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let product = state
        .product_mutation
        .create(NewProductInput {
            name: request.name,
            description: request.description,
            video_url: request.video_url,
            price: request.price,
            category_id: request.category_id,
            image,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
    multipart: Multipart,
) -> Result<Json<ProductResponse>, AppError> {
    let form = ProductForm::from_multipart(multipart).await?;

    let mut patch = ProductPatch {
        name: form.name,
        description: form.description,
        video_url: form.video_url,
        image: form.image,
        ..Default::default()
    };
    if let Some(raw) = form.price {
        patch.price = Some(parse_price(&raw)?);
    }
    if let Some(raw) = form.category_id {
        patch.category_id = Some(parse_category_id(&raw)?);
    }

    let product = state.product_mutation.update(&identifier, patch).await?;

    Ok(Json(ProductResponse::from(product)))
}

async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<(), AppError> {
    state.product_mutation.delete(&identifier).await?;

    Ok(())
}

fn parse_price(raw: &str) -> Result<Decimal, AppError> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|_| AppError::Validation("price must be a decimal number".to_string()))
}

fn parse_category_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::Validation("categoryId must be a numeric id".to_string()))
}

/// 产品表单的 multipart 载荷；创建和更新共用，
/// 更新时未出现的字段保持 `None`
#[derive(Default)]
struct ProductForm {
    name: Option<String>,
    description: Option<Option<String>>,
    video_url: Option<Option<String>>,
    price: Option<String>,
    category_id: Option<String>,
    image: Option<MediaUpload>,
}

impl ProductForm {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            AppError::Validation(format!("Invalid multipart payload: {}", e))
        })? {
            let Some(field_name) = field.name().map(str::to_string) else {
                continue;
            };

            match field_name.as_str() {
                "name" => form.name = Some(read_text(field).await?),
                // 提交空串表示清空该字段
                "description" => form.description = Some(optional_text(read_text(field).await?)),
                "videoUrl" => form.video_url = Some(optional_text(read_text(field).await?)),
                "price" => form.price = Some(read_text(field).await?),
                "categoryId" => form.category_id = Some(read_text(field).await?),
                "image" => {
                    if let Some(upload) = read_image(field).await? {
                        form.image = Some(upload);
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }
}
