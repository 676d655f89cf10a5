use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_query::{
    Alias, Cond, ConditionalStatement, Expr, Func, Iden, MysqlQueryBuilder, Order,
    OrderedStatement, Query, SelectStatement,
};
use sea_query_binder::SqlxBinder;
use sqlx::{FromRow, MySqlPool};
use tracing::debug;

use crate::domain::models::category::Category;
use crate::domain::models::product::{NewProduct, Product, ProductChanges, ProductFilter};
use crate::domain::repositories::ProductRepository;
use crate::error::AppError;
use crate::infrastructure::repository::map_write_error;

#[derive(Iden)]
enum Products {
    Table,
    Id,
    Name,
    Slug,
    Description,
    ImageUrl,
    VideoUrl,
    Price,
    CategoryId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Categories {
    Table,
    Id,
    Name,
    Color,
    Slug,
}

/// 产品行连同所属分类的展开列
#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    image_url: Option<String>,
    video_url: Option<String>,
    price: Decimal,
    category_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    category_name: String,
    category_color: String,
    category_slug: String,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            image_url: row.image_url,
            video_url: row.video_url,
            price: row.price,
            category_id: row.category_id,
            category: Category {
                id: row.category_id,
                name: row.category_name,
                color: row.category_color,
                slug: row.category_slug,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct MySqlProductRepository {
    pool: MySqlPool,
}

impl MySqlProductRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn select_with_category() -> SelectStatement {
        Query::select()
            .columns([
                (Products::Table, Products::Id),
                (Products::Table, Products::Name),
                (Products::Table, Products::Slug),
                (Products::Table, Products::Description),
                (Products::Table, Products::ImageUrl),
                (Products::Table, Products::VideoUrl),
                (Products::Table, Products::Price),
                (Products::Table, Products::CategoryId),
                (Products::Table, Products::CreatedAt),
                (Products::Table, Products::UpdatedAt),
            ])
            .expr_as(
                Expr::col((Categories::Table, Categories::Name)),
                Alias::new("category_name"),
            )
            .expr_as(
                Expr::col((Categories::Table, Categories::Color)),
                Alias::new("category_color"),
            )
            .expr_as(
                Expr::col((Categories::Table, Categories::Slug)),
                Alias::new("category_slug"),
            )
            .from(Products::Table)
            .inner_join(
                Categories::Table,
                Expr::col((Categories::Table, Categories::Id))
                    .equals((Products::Table, Products::CategoryId)),
            )
            .to_owned()
    }

    /// 分类过滤和模糊搜索叠加为 AND 条件，搜索对 name/description 两列取 OR
    fn apply_filter(stmt: &mut SelectStatement, filter: &ProductFilter) {
        if let Some(category_id) = filter.category_id {
            stmt.and_where(Expr::col((Products::Table, Products::CategoryId)).eq(category_id));
        }

        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            stmt.cond_where(
                Cond::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            Products::Table,
                            Products::Name,
                        ))))
                        .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            Products::Table,
                            Products::Description,
                        ))))
                        .like(pattern),
                    ),
            );
        }
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<Product>, AppError> {
        let mut stmt = Self::select_with_category();
        stmt.and_where(Expr::col((Products::Table, Products::Id)).eq(id));

        let (sql, values) = stmt.build_sqlx(MysqlQueryBuilder);
        let row = sqlx::query_as_with::<_, ProductRow, _>(&sql, values)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Product::from))
    }
}

#[async_trait]
impl ProductRepository for MySqlProductRepository {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Product>, AppError> {
        // id 分支只在输入确实是非负整数时加入，和 slug 分支合成一条 OR 查询，
        // 避免两次独立读之间的竞态
        let mut cond =
            Cond::any().add(Expr::col((Products::Table, Products::Slug)).eq(identifier));
        if let Some(id) = identifier.trim().parse::<i64>().ok().filter(|v| *v >= 0) {
            cond = cond.add(Expr::col((Products::Table, Products::Id)).eq(id));
        }

        let mut stmt = Self::select_with_category();
        stmt.cond_where(cond).limit(1);

        let (sql, values) = stmt.build_sqlx(MysqlQueryBuilder);
        debug!("resolve sql: {}", sql);

        let row = sqlx::query_as_with::<_, ProductRow, _>(&sql, values)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Product::from))
    }

    async fn list(
        &self,
        filter: &ProductFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Product>, AppError> {
        let mut stmt = Self::select_with_category();
        Self::apply_filter(&mut stmt, filter);
        stmt.order_by((Products::Table, Products::Id), Order::Desc)
            .limit(limit)
            .offset(offset);

        let (sql, values) = stmt.build_sqlx(MysqlQueryBuilder);
        debug!("list sql: {}", sql);

        let rows = sqlx::query_as_with::<_, ProductRow, _>(&sql, values)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn count(&self, filter: &ProductFilter) -> Result<u64, AppError> {
        let mut stmt = Query::select()
            .expr(Func::count(Expr::col((Products::Table, Products::Id))))
            .from(Products::Table)
            .to_owned();
        Self::apply_filter(&mut stmt, filter);

        let (sql, values) = stmt.build_sqlx(MysqlQueryBuilder);
        let total: i64 = sqlx::query_scalar_with(&sql, values)
            .fetch_one(&self.pool)
            .await?;

        Ok(total as u64)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        let exists: i64 = match exclude_id {
            Some(id) => {
                sqlx::query_scalar(
                    r#"SELECT EXISTS(SELECT 1 FROM products WHERE slug = ? AND id <> ?)"#,
                )
                .bind(slug)
                .bind(id)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM products WHERE slug = ?)"#)
                    .bind(slug)
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(exists != 0)
    }

    async fn insert(&self, product: &NewProduct) -> Result<Product, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (name, slug, description, image_url, video_url, price, category_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(&product.image_url)
        .bind(&product.video_url)
        .bind(product.price)
        .bind(product.category_id)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        let id = result.last_insert_id() as i64;
        self.fetch_by_id(id).await?.ok_or_else(|| {
            AppError::Internal(format!("product {} vanished right after insert", id))
        })
    }

    async fn update(&self, id: i64, changes: &ProductChanges) -> Result<Product, AppError> {
        let mut stmt = Query::update();
        stmt.table(Products::Table);

        if let Some(name) = &changes.name {
            stmt.value(Products::Name, name.clone());
        }
        if let Some(slug) = &changes.slug {
            stmt.value(Products::Slug, slug.clone());
        }
        if let Some(description) = &changes.description {
            stmt.value(Products::Description, description.clone());
        }
        if let Some(image_url) = &changes.image_url {
            stmt.value(Products::ImageUrl, image_url.clone());
        }
        if let Some(video_url) = &changes.video_url {
            stmt.value(Products::VideoUrl, video_url.clone());
        }
        if let Some(price) = changes.price {
            stmt.value(Products::Price, price);
        }
        if let Some(category_id) = changes.category_id {
            stmt.value(Products::CategoryId, category_id);
        }

        stmt.and_where(Expr::col(Products::Id).eq(id));

        let (sql, values) = stmt.build_sqlx(MysqlQueryBuilder);
        debug!("update sql: {}", sql);

        sqlx::query_with(&sql, values)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;

        self.fetch_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(r#"DELETE FROM products WHERE id = ?"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// LIKE 模式里的通配符按字面匹配
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
