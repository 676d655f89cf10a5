use crate::error::AppError;

pub mod banner_repository;
pub mod category_repository;
pub mod product_repository;

pub use banner_repository::MySqlBannerRepository;
pub use category_repository::MySqlCategoryRepository;
pub use product_repository::MySqlProductRepository;

/// 写入错误归类：唯一索引冲突和外键失败要区分出来，其余原样上抛
pub(crate) fn map_write_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::DuplicateSlug("a product with this slug already exists".to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::Validation("referenced category does not exist".to_string())
        }
        _ => AppError::Database(e),
    }
}
