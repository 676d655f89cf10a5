use crate::domain::repositories::ProductRepository;
use crate::error::AppError;

/// 把展示名归一化成 slug：小写、去掉字母数字下划线连字符以外的字符、
/// 空白串折叠成单个连字符
pub fn slugify(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join("-")
}

/// 从基础 slug 开始探测，被占用就追加递增后缀，直到找到空位。
/// 并发创建的竞态由 products.slug 上的唯一索引兜底。
pub async fn unique_slug(
    repo: &dyn ProductRepository,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<String, AppError> {
    let base = slugify(name);
    if base.is_empty() {
        return Err(AppError::Validation(
            "name must contain at least one letter or digit".to_string(),
        ));
    }

    let mut slug = base.clone();
    let mut counter = 1u32;
    while repo.slug_exists(&slug, exclude_id).await? {
        slug = format!("{}-{}", base, counter);
        counter += 1;
    }

    Ok(slug)
}
