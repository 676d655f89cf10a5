use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::models::product::{NewProduct, Product, ProductChanges};
use crate::domain::repositories::ProductRepository;
use crate::domain::services::slug::unique_slug;
use crate::error::AppError;
use crate::infrastructure::media::{MediaStore, MediaUpload};

const MEDIA_FOLDER: &str = "products";

/// 创建产品的完整入参；图片是必填项
#[derive(Debug, Clone)]
pub struct NewProductInput {
    pub name: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub price: Decimal,
    pub category_id: i64,
    pub image: MediaUpload,
}

/// 部分更新入参：外层 `None` 表示字段未提交，
/// `description`/`video_url` 的内层 `None` 表示显式清空
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub video_url: Option<Option<String>>,
    pub price: Option<Decimal>,
    pub category_id: Option<i64>,
    pub image: Option<MediaUpload>,
}

#[derive(Clone)]
pub struct ProductMutationService {
    repo: Arc<dyn ProductRepository>,
    media: Arc<dyn MediaStore>,
}

impl ProductMutationService {
    pub fn new(repo: Arc<dyn ProductRepository>, media: Arc<dyn MediaStore>) -> Self {
        Self { repo, media }
    }

    pub async fn create(&self, input: NewProductInput) -> Result<Product, AppError> {
        // 必填字段检查
        if input.name.trim().is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }
        if input.price < Decimal::ZERO {
            return Err(AppError::Validation(
                "price must not be negative".to_string(),
            ));
        }
        if input.image.bytes.is_empty() {
            return Err(AppError::Validation(
                "product image is required".to_string(),
            ));
        }

        let slug = unique_slug(self.repo.as_ref(), &input.name, None).await?;

        // 先上传，拿到 URL 才落库；上传失败直接中断
        let image_url = self
            .media
            .upload(input.image.bytes, MEDIA_FOLDER, Some(slug.clone()))
            .await?;

        let mut new_product = NewProduct {
            name: input.name.clone(),
            slug,
            description: input.description,
            image_url: image_url.clone(),
            video_url: input.video_url,
            price: input.price,
            category_id: input.category_id,
        };

        let inserted = match self.repo.insert(&new_product).await {
            // 并发创建撞上唯一索引：重新探测一次再试
            Err(AppError::DuplicateSlug(_)) => {
                new_product.slug = unique_slug(self.repo.as_ref(), &input.name, None).await?;
                self.repo.insert(&new_product).await
            }
            other => other,
        };

        match inserted {
            Ok(product) => Ok(product),
            Err(e) => {
                // 落库失败时回收刚上传的图片，回收失败只记日志
                if let Err(media_err) = self.media.release(&image_url).await {
                    warn!(
                        "failed to release uploaded image {}: {}",
                        image_url, media_err
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn update(&self, identifier: &str, patch: ProductPatch) -> Result<Product, AppError> {
        let existing = self
            .repo
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product `{}` not found", identifier)))?;

        if let Some(price) = patch.price {
            if price < Decimal::ZERO {
                return Err(AppError::Validation(
                    "price must not be negative".to_string(),
                ));
            }
        }

        let mut changes = ProductChanges::default();

        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("name must not be empty".to_string()));
            }
            // 名字真的变了才重新生成 slug
            if name != existing.name {
                changes.slug =
                    Some(unique_slug(self.repo.as_ref(), &name, Some(existing.id)).await?);
            }
            changes.name = Some(name);
        }
        changes.description = patch.description;
        changes.video_url = patch.video_url;
        changes.price = patch.price;
        changes.category_id = patch.category_id;

        // 换图时新图先上传入库，旧图最后释放，中间不存在没有有效图片的窗口
        let mut uploaded_url: Option<String> = None;
        if let Some(image) = patch.image {
            let name_hint = changes.slug.clone().unwrap_or_else(|| existing.slug.clone());
            let url = self
                .media
                .upload(image.bytes, MEDIA_FOLDER, Some(name_hint))
                .await?;
            changes.image_url = Some(url.clone());
            uploaded_url = Some(url);
        }

        // 空提交：不写库，slug 不动
        if changes.is_empty() {
            return Ok(existing);
        }

        let updated = match self.repo.update(existing.id, &changes).await {
            Ok(product) => product,
            Err(e) => {
                // 行没写成，新图成了孤儿，回收掉
                if let Some(url) = uploaded_url {
                    if let Err(media_err) = self.media.release(&url).await {
                        warn!(
                            "failed to release replacement image {}: {}",
                            url, media_err
                        );
                    }
                }
                return Err(e);
            }
        };

        // 新图已入库，释放旧图；失败不影响本次更新
        if uploaded_url.is_some() {
            if let Some(old_url) = existing.image_url.as_deref() {
                if let Err(media_err) = self.media.release(old_url).await {
                    warn!("failed to release replaced image {}: {}", old_url, media_err);
                }
            }
        }

        Ok(updated)
    }

    pub async fn delete(&self, identifier: &str) -> Result<(), AppError> {
        let existing = self
            .repo
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product `{}` not found", identifier)))?;

        // 释放失败不阻塞行删除
        if let Some(image_url) = existing.image_url.as_deref() {
            if let Err(media_err) = self.media.release(image_url).await {
                warn!(
                    "failed to release image {} for product {}: {}",
                    image_url, existing.id, media_err
                );
            }
        }

        self.repo.delete(existing.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::category::Category;
    use crate::domain::repositories::MockProductRepository;
    use crate::infrastructure::media::MockMediaStore;
    use chrono::Utc;
    use mockall::Sequence;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    const OLD_URL: &str = "https://res.cloudinary.com/demo/image/upload/v1/products/old.png";
    const NEW_URL: &str = "https://res.cloudinary.com/demo/image/upload/v1/products/new.png";

    fn category() -> Category {
        Category {
            id: 1,
            name: "Energizante".to_string(),
            color: "#e10833".to_string(),
            slug: "energizante".to_string(),
        }
    }

    fn existing_product(id: i64, name: &str, slug: &str) -> Product {
        Product {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            description: Some("desc".to_string()),
            image_url: Some(OLD_URL.to_string()),
            video_url: None,
            price: dec!(49.90),
            category_id: 1,
            category: category(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn product_from_new(id: i64, new: &NewProduct) -> Product {
        Product {
            id,
            name: new.name.clone(),
            slug: new.slug.clone(),
            description: new.description.clone(),
            image_url: Some(new.image_url.clone()),
            video_url: new.video_url.clone(),
            price: new.price,
            category_id: new.category_id,
            category: category(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn apply_changes(product: &Product, changes: &ProductChanges) -> Product {
        let mut updated = product.clone();
        if let Some(name) = &changes.name {
            updated.name = name.clone();
        }
        if let Some(slug) = &changes.slug {
            updated.slug = slug.clone();
        }
        if let Some(description) = &changes.description {
            updated.description = description.clone();
        }
        if let Some(image_url) = &changes.image_url {
            updated.image_url = Some(image_url.clone());
        }
        if let Some(video_url) = &changes.video_url {
            updated.video_url = video_url.clone();
        }
        if let Some(price) = changes.price {
            updated.price = price;
        }
        if let Some(category_id) = changes.category_id {
            updated.category_id = category_id;
        }
        updated
    }

    fn image() -> MediaUpload {
        MediaUpload {
            bytes: vec![0xde, 0xad, 0xbe, 0xef],
        }
    }

    fn input(name: &str) -> NewProductInput {
        NewProductInput {
            name: name.to_string(),
            description: None,
            video_url: None,
            price: dec!(49.90),
            category_id: 1,
            image: image(),
        }
    }

    #[tokio::test]
    async fn create_uploads_then_inserts() {
        let mut repo = MockProductRepository::new();
        repo.expect_slug_exists().returning(|_, _| Ok(false));
        repo.expect_insert()
            .withf(|p| p.slug == "omega-3" && p.image_url == NEW_URL)
            .returning(|p| Ok(product_from_new(1, p)));

        let mut media = MockMediaStore::new();
        media
            .expect_upload()
            .withf(|_, folder, hint| folder == "products" && hint.as_deref() == Some("omega-3"))
            .returning(|_, _, _| Ok(NEW_URL.to_string()));
        media.expect_release().never();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let product = service.create(input("Omega 3")).await.unwrap();

        assert_eq!(product.slug, "omega-3");
        assert_eq!(product.image_url.as_deref(), Some(NEW_URL));
    }

    #[tokio::test]
    async fn create_keeps_accented_name_but_strips_it_from_slug() {
        let mut repo = MockProductRepository::new();
        repo.expect_slug_exists().returning(|_, _| Ok(false));
        repo.expect_insert()
            .withf(|p| p.name == "Café Verde" && p.slug == "caf-verde")
            .returning(|p| Ok(product_from_new(1, p)));

        let mut media = MockMediaStore::new();
        media
            .expect_upload()
            .returning(|_, _, _| Ok(NEW_URL.to_string()));

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let product = service.create(input("Café Verde")).await.unwrap();

        assert_eq!(product.name, "Café Verde");
        assert_eq!(product.slug, "caf-verde");
        assert_eq!(product.price, dec!(49.90));
    }

    #[tokio::test]
    async fn sequential_creates_with_same_name_get_distinct_slugs() {
        let taken: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let next_id = Arc::new(AtomicI64::new(1));

        let mut repo = MockProductRepository::new();
        let probe_taken = taken.clone();
        repo.expect_slug_exists()
            .returning(move |slug, _| Ok(probe_taken.lock().unwrap().contains(slug)));
        let insert_taken = taken.clone();
        repo.expect_insert().returning(move |p| {
            insert_taken.lock().unwrap().insert(p.slug.clone());
            Ok(product_from_new(next_id.fetch_add(1, Ordering::SeqCst), p))
        });

        let mut media = MockMediaStore::new();
        media
            .expect_upload()
            .returning(|_, _, _| Ok(NEW_URL.to_string()));

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));

        let first = service.create(input("Omega 3")).await.unwrap();
        let second = service.create(input("Omega 3")).await.unwrap();

        assert_eq!(first.slug, "omega-3");
        assert_eq!(second.slug, "omega-3-1");
    }

    #[tokio::test]
    async fn create_retries_once_on_slug_conflict() {
        let mut repo = MockProductRepository::new();
        repo.expect_slug_exists().returning(|_, _| Ok(false));

        let attempts = Arc::new(AtomicI64::new(0));
        let counter = attempts.clone();
        repo.expect_insert().times(2).returning(move |p| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::DuplicateSlug("taken".to_string()))
            } else {
                Ok(product_from_new(1, p))
            }
        });

        let mut media = MockMediaStore::new();
        media
            .expect_upload()
            .returning(|_, _, _| Ok(NEW_URL.to_string()));
        media.expect_release().never();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let product = service.create(input("Omega 3")).await.unwrap();
        assert_eq!(product.slug, "omega-3");
    }

    #[tokio::test]
    async fn create_rejects_blank_name_before_any_side_effect() {
        let mut repo = MockProductRepository::new();
        repo.expect_slug_exists().never();
        repo.expect_insert().never();

        let mut media = MockMediaStore::new();
        media.expect_upload().never();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let err = service.create(input("  ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_negative_price() {
        let repo = MockProductRepository::new();
        let media = MockMediaStore::new();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let mut bad = input("Omega 3");
        bad.price = dec!(-1);
        let err = service.create(bad).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_releases_upload_when_insert_fails() {
        let mut repo = MockProductRepository::new();
        repo.expect_slug_exists().returning(|_, _| Ok(false));
        repo.expect_insert()
            .returning(|_| Err(AppError::Internal("insert failed".to_string())));

        let mut media = MockMediaStore::new();
        media
            .expect_upload()
            .returning(|_, _, _| Ok(NEW_URL.to_string()));
        media
            .expect_release()
            .withf(|url| url == NEW_URL)
            .times(1)
            .returning(|_| Ok(()));

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let err = service.create(input("Omega 3")).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn empty_patch_is_a_no_op() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));
        repo.expect_update().never();

        let media = MockMediaStore::new();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let product = service.update("omega-3", ProductPatch::default()).await.unwrap();

        assert_eq!(product.slug, "omega-3");
        assert_eq!(product.name, "Omega 3");
    }

    #[tokio::test]
    async fn patching_category_leaves_name_and_slug_alone() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));
        repo.expect_slug_exists().never();
        repo.expect_update()
            .withf(|id, changes| {
                *id == 5
                    && changes.category_id == Some(2)
                    && changes.name.is_none()
                    && changes.slug.is_none()
                    && changes.image_url.is_none()
            })
            .returning(|_, changes| {
                Ok(apply_changes(&existing_product(5, "Omega 3", "omega-3"), changes))
            });

        let media = MockMediaStore::new();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let patch = ProductPatch {
            category_id: Some(2),
            ..Default::default()
        };
        let product = service.update("omega-3", patch).await.unwrap();

        assert_eq!(product.category_id, 2);
        assert_eq!(product.name, "Omega 3");
        assert_eq!(product.slug, "omega-3");
    }

    #[tokio::test]
    async fn renaming_regenerates_slug_excluding_self() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));
        repo.expect_slug_exists()
            .withf(|slug, exclude| slug == "omega-forte" && *exclude == Some(5))
            .returning(|_, _| Ok(false));
        repo.expect_update()
            .withf(|_, changes| {
                changes.name.as_deref() == Some("Omega Forte")
                    && changes.slug.as_deref() == Some("omega-forte")
            })
            .returning(|_, changes| {
                Ok(apply_changes(&existing_product(5, "Omega 3", "omega-3"), changes))
            });

        let media = MockMediaStore::new();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let patch = ProductPatch {
            name: Some("Omega Forte".to_string()),
            ..Default::default()
        };
        let product = service.update("omega-3", patch).await.unwrap();

        assert_eq!(product.slug, "omega-forte");
    }

    #[tokio::test]
    async fn resubmitting_same_name_keeps_slug() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));
        repo.expect_slug_exists().never();
        repo.expect_update()
            .withf(|_, changes| {
                changes.name.as_deref() == Some("Omega 3") && changes.slug.is_none()
            })
            .returning(|_, changes| {
                Ok(apply_changes(&existing_product(5, "Omega 3", "omega-3"), changes))
            });

        let media = MockMediaStore::new();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let patch = ProductPatch {
            name: Some("Omega 3".to_string()),
            ..Default::default()
        };
        let product = service.update("omega-3", patch).await.unwrap();

        assert_eq!(product.slug, "omega-3");
    }

    #[tokio::test]
    async fn replacing_image_uploads_before_releasing_old() {
        let mut seq = Sequence::new();

        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));

        let mut media = MockMediaStore::new();
        media
            .expect_upload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(NEW_URL.to_string()));
        repo.expect_update()
            .withf(|_, changes| changes.image_url.as_deref() == Some(NEW_URL))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, changes| {
                Ok(apply_changes(&existing_product(5, "Omega 3", "omega-3"), changes))
            });
        media
            .expect_release()
            .withf(|url| url == OLD_URL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let patch = ProductPatch {
            image: Some(image()),
            ..Default::default()
        };
        let product = service.update("omega-3", patch).await.unwrap();

        assert_eq!(product.image_url.as_deref(), Some(NEW_URL));
    }

    #[tokio::test]
    async fn old_image_release_failure_does_not_fail_update() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));
        repo.expect_update().returning(|_, changes| {
            Ok(apply_changes(&existing_product(5, "Omega 3", "omega-3"), changes))
        });

        let mut media = MockMediaStore::new();
        media
            .expect_upload()
            .returning(|_, _, _| Ok(NEW_URL.to_string()));
        media
            .expect_release()
            .returning(|_| Err(AppError::Media("remote hiccup".to_string())));

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let patch = ProductPatch {
            image: Some(image()),
            ..Default::default()
        };
        let product = service.update("omega-3", patch).await.unwrap();

        assert_eq!(product.image_url.as_deref(), Some(NEW_URL));
    }

    #[tokio::test]
    async fn failed_row_update_releases_replacement_image() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));
        repo.expect_update()
            .returning(|_, _| Err(AppError::Internal("update failed".to_string())));

        let mut media = MockMediaStore::new();
        media
            .expect_upload()
            .returning(|_, _, _| Ok(NEW_URL.to_string()));
        media
            .expect_release()
            .withf(|url| url == NEW_URL)
            .times(1)
            .returning(|_| Ok(()));

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let patch = ProductPatch {
            image: Some(image()),
            ..Default::default()
        };
        let err = service.update("omega-3", patch).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn update_unknown_identifier_is_not_found() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier().returning(|_| Ok(None));
        repo.expect_update().never();

        let media = MockMediaStore::new();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let err = service
            .update("missing", ProductPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_releases_media_then_removes_row() {
        let mut seq = Sequence::new();

        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));

        let mut media = MockMediaStore::new();
        media
            .expect_release()
            .withf(|url| url == OLD_URL)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        repo.expect_delete()
            .withf(|id| *id == 5)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        service.delete("5").await.unwrap();
    }

    #[tokio::test]
    async fn delete_proceeds_when_release_fails() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier()
            .returning(|_| Ok(Some(existing_product(5, "Omega 3", "omega-3"))));
        repo.expect_delete().times(1).returning(|_| Ok(()));

        let mut media = MockMediaStore::new();
        media
            .expect_release()
            .returning(|_| Err(AppError::Media("remote hiccup".to_string())));

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        service.delete("omega-3").await.unwrap();
    }

    #[tokio::test]
    async fn delete_unknown_identifier_is_not_found() {
        let mut repo = MockProductRepository::new();
        repo.expect_find_by_identifier().returning(|_| Ok(None));
        repo.expect_delete().never();

        let media = MockMediaStore::new();

        let service = ProductMutationService::new(Arc::new(repo), Arc::new(media));
        let err = service.delete("404").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
