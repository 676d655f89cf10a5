use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use serde::Serialize;
use std::sync::Arc;

use crate::api::multipart::{optional_text, read_image, read_text};
use crate::domain::models::banner::Banner;
use crate::error::AppError;
use crate::infrastructure::media::MediaUpload;
use crate::server::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_banners).post(create_banner))
        .route("/{id}", delete(delete_banner))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerResponse {
    pub id: i64,
    pub name: Option<String>,
    pub image_url: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Banner> for BannerResponse {
    fn from(banner: Banner) -> Self {
        Self {
            id: banner.id,
            name: banner.name,
            image_url: banner.image_url,
            created_at: banner.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BannerListResponse {
    pub banners: Vec<BannerResponse>,
    pub total: u64,
}

async fn list_banners(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BannerListResponse>, AppError> {
    let banners = state.banners.list().await?;
    let total = banners.len() as u64;

    Ok(Json(BannerListResponse {
        banners: banners.into_iter().map(BannerResponse::from).collect(),
        total,
    }))
}

async fn create_banner(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BannerResponse>), AppError> {
    let mut name: Option<String> = None;
    let mut image: Option<MediaUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {}", e)))?
    {
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };

        match field_name.as_str() {
            "name" => name = optional_text(read_text(field).await?),
            "image" => {
                if let Some(upload) = read_image(field).await? {
                    image = Some(upload);
                }
            }
            _ => {}
        }
    }

    let image =
        image.ok_or_else(|| AppError::Validation("banner image is required".to_string()))?;

    let banner = state.banners.create(name, image).await?;

    Ok((StatusCode::CREATED, Json(BannerResponse::from(banner))))
}

async fn delete_banner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(), AppError> {
    state.banners.delete(id).await?;

    Ok(())
}
