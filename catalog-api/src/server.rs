use axum::{Router, extract::DefaultBodyLimit, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api::{banners, categories, products};
use crate::config::Config;
use crate::domain::repositories::{BannerRepository, CategoryRepository, ProductRepository};
use crate::domain::services::banner_service::BannerService;
use crate::domain::services::product_mutation_service::ProductMutationService;
use crate::domain::services::product_query_service::ProductQueryService;
use crate::error::AppError;
use crate::infrastructure::media::MediaStore;
use crate::infrastructure::repository::{
    MySqlBannerRepository, MySqlCategoryRepository, MySqlProductRepository,
};

// 上传的是商品图，10MB 封顶
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: sqlx::MySqlPool,
    pub product_query: ProductQueryService,
    pub product_mutation: ProductMutationService,
    pub banners: BannerService,
    pub categories: Arc<dyn CategoryRepository>,
}

impl AppState {
    pub fn new(config: Config, db: sqlx::MySqlPool, media: Arc<dyn MediaStore>) -> Self {
        // 仓储和服务只装配一次，请求各自共享
        let products: Arc<dyn ProductRepository> =
            Arc::new(MySqlProductRepository::new(db.clone()));
        let banner_repo: Arc<dyn BannerRepository> =
            Arc::new(MySqlBannerRepository::new(db.clone()));
        let categories: Arc<dyn CategoryRepository> =
            Arc::new(MySqlCategoryRepository::new(db.clone()));

        Self {
            product_query: ProductQueryService::new(products.clone()),
            product_mutation: ProductMutationService::new(products, media.clone()),
            banners: BannerService::new(banner_repo, media),
            categories,
            config,
            db,
        }
    }
}

pub async fn create_app(state: AppState) -> Result<Router, AppError> {
    let app_state = Arc::new(state);

    // 健康检查路由
    let health_route = Router::new().route("/health", get(|| async { "OK" }));

    // API 路由
    let api_routes = Router::new()
        .nest("/products", products::routes())
        .nest("/categories", categories::routes())
        .nest("/banners", banners::routes());

    // 组合所有路由
    let app = Router::new()
        .nest("/api/v1", api_routes)
        .merge(health_route)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state);

    Ok(app)
}
