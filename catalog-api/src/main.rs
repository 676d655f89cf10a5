use std::sync::Arc;

use catalog_api::config::Config;
use catalog_api::error::AppError;
use catalog_api::infrastructure::database::init_mysql;
use catalog_api::infrastructure::media::{CloudinaryClient, MediaStore};
use catalog_api::logging::init_logging;
use catalog_api::server::{AppState, create_app};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    init_logging(&config)?;

    tracing::info!("Starting catalog API service");

    // 初始化数据库连接
    let db_pool = init_mysql(&config).await?;

    // 初始化媒体托管客户端
    let media: Arc<dyn MediaStore> = Arc::new(CloudinaryClient::new(&config.media)?);

    // 创建应用状态
    let state = AppState::new(config.clone(), db_pool, media);

    // 创建并启动服务器
    let app = create_app(state).await?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", &addr);

    axum::serve(listener, app).await?;

    Ok(())
}
