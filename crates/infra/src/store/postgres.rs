//! Postgres-backed implementation of every store trait.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | `StoreError` |
//! |------------|-----------------|--------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check violation) | `23514` | `Backend` |
//! | anything else | | `Backend` |
//!
//! Order placement runs in one transaction and locks the product rows it
//! decrements (`SELECT ... FOR UPDATE`), in product id order.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::instrument;
use uuid::Uuid;

use shopfront_auth::User;
use shopfront_basket::{BasketKey, BasketLine};
use shopfront_catalog::{Category, Discount, Percent, Producer, Product, Promocode};
use shopfront_core::{CategoryId, DiscountId, OrderId, ProducerId, ProductId, UserId};
use shopfront_orders::{Order, OrderLine, OrderStatus};

use super::{BasketStore, CatalogStore, OrderStore, ProductFilter, StoreError, StoreResult, UserStore};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const PRODUCT_COLUMNS: &str =
    "id, name, description, articul, price, stock, category_id, producer_id, discount_id";

#[derive(Debug, Clone)]
pub struct PostgresShopStore {
    pool: PgPool,
}

impl PostgresShopStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(|e| map_sqlx_error("decode row", e))
}

fn to_db_amount(value: u64, what: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::backend(format!("{what} {value} does not fit in BIGINT")))
}

fn from_db_u64(value: i64, what: &str) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::backend(format!("negative {what} in database: {value}")))
}

fn from_db_u32(value: i64, what: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::backend(format!("{what} out of range in database: {value}")))
}

fn percent_from_db(value: i16) -> StoreResult<Percent> {
    u8::try_from(value)
        .ok()
        .and_then(|v| Percent::new(v).ok())
        .ok_or_else(|| StoreError::backend(format!("percent out of range in database: {value}")))
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    Ok(Product {
        id: ProductId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        articul: column(row, "articul")?,
        price: from_db_u64(column(row, "price")?, "price")?,
        stock: from_db_u32(column(row, "stock")?, "stock")?,
        category_id: CategoryId::from_uuid(column(row, "category_id")?),
        producer_id: ProducerId::from_uuid(column(row, "producer_id")?),
        discount_id: column::<Option<Uuid>>(row, "discount_id")?.map(DiscountId::from_uuid),
    })
}

fn category_from_row(row: &PgRow) -> StoreResult<Category> {
    Ok(Category {
        id: CategoryId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
    })
}

fn producer_from_row(row: &PgRow) -> StoreResult<Producer> {
    Ok(Producer {
        id: ProducerId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
    })
}

fn discount_from_row(row: &PgRow) -> StoreResult<Discount> {
    Ok(Discount {
        id: DiscountId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        percent: percent_from_db(column(row, "percent")?)?,
        expire_date: column::<NaiveDate>(row, "expire_date")?,
    })
}

fn promocode_from_row(row: &PgRow) -> StoreResult<Promocode> {
    Ok(Promocode {
        id: shopfront_core::PromocodeId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        percent: percent_from_db(column(row, "percent")?)?,
        expire_date: column::<NaiveDate>(row, "expire_date")?,
    })
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        id: UserId::from_uuid(column(row, "id")?),
        email: column(row, "email")?,
        is_active: column(row, "is_active")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
    })
}

fn basket_line_from_row(row: &PgRow) -> StoreResult<BasketLine> {
    Ok(BasketLine {
        key: BasketKey::new(
            UserId::from_uuid(column(row, "user_id")?),
            ProductId::from_uuid(column(row, "product_id")?),
        ),
        quantity: from_db_u32(column(row, "quantity")?, "quantity")?,
    })
}

fn rows_to<T>(rows: &[PgRow], map: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

#[async_trait]
impl CatalogStore for PostgresShopStore {
    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self, filter: ProductFilter) -> StoreResult<Vec<Product>> {
        let (clause, param) = match filter {
            ProductFilter::All => ("", None),
            ProductFilter::Category(id) => ("WHERE category_id = $1", Some(Uuid::from(id))),
            ProductFilter::Producer(id) => ("WHERE producer_id = $1", Some(Uuid::from(id))),
            ProductFilter::Discount(id) => ("WHERE discount_id = $1", Some(Uuid::from(id))),
        };
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products {clause} ORDER BY name, id");

        let mut query = sqlx::query(&sql);
        if let Some(id) = param {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        rows_to(&rows, product_from_row)
    }

    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let row = sqlx::query("SELECT id, name, description FROM categories WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, description FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_categories", e))?;
        rows_to(&rows, category_from_row)
    }

    async fn get_producer(&self, id: ProducerId) -> StoreResult<Option<Producer>> {
        let row = sqlx::query("SELECT id, name, description FROM producers WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_producer", e))?;
        row.as_ref().map(producer_from_row).transpose()
    }

    async fn list_producers(&self) -> StoreResult<Vec<Producer>> {
        let rows = sqlx::query("SELECT id, name, description FROM producers ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_producers", e))?;
        rows_to(&rows, producer_from_row)
    }

    async fn get_discount(&self, id: DiscountId) -> StoreResult<Option<Discount>> {
        let row = sqlx::query("SELECT id, name, percent, expire_date FROM discounts WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_discount", e))?;
        row.as_ref().map(discount_from_row).transpose()
    }

    async fn list_discounts(&self) -> StoreResult<Vec<Discount>> {
        let rows = sqlx::query("SELECT id, name, percent, expire_date FROM discounts ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_discounts", e))?;
        rows_to(&rows, discount_from_row)
    }

    async fn list_promocodes(&self) -> StoreResult<Vec<Promocode>> {
        let rows = sqlx::query("SELECT id, name, percent, expire_date FROM promocodes ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_promocodes", e))?;
        rows_to(&rows, promocode_from_row)
    }

    async fn find_promocode(&self, code: &str) -> StoreResult<Option<Promocode>> {
        let row = sqlx::query(
            "SELECT id, name, percent, expire_date FROM promocodes WHERE LOWER(name) = LOWER($1)",
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_promocode", e))?;
        row.as_ref().map(promocode_from_row).transpose()
    }
}

#[async_trait]
impl BasketStore for PostgresShopStore {
    #[instrument(skip(self), fields(user_id = %key.user_id, product_id = %key.product_id), err)]
    async fn fetch_or_create(&self, key: BasketKey) -> StoreResult<(BasketLine, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO basket_lines (user_id, product_id, quantity)
            VALUES ($1, $2, 0)
            ON CONFLICT (user_id, product_id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(key.user_id))
        .bind(Uuid::from(key.product_id))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_or_create", e))?;
        let created = inserted.rows_affected() == 1;

        // A concurrent delete between the two statements leaves no row; the
        // caller's save_line upserts, so an empty line is still correct.
        let line = self.get_line(key).await?.unwrap_or_else(|| BasketLine::empty(key));
        Ok((line, created))
    }

    async fn get_line(&self, key: BasketKey) -> StoreResult<Option<BasketLine>> {
        let row = sqlx::query(
            "SELECT user_id, product_id, quantity FROM basket_lines WHERE user_id = $1 AND product_id = $2",
        )
        .bind(Uuid::from(key.user_id))
        .bind(Uuid::from(key.product_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_line", e))?;
        row.as_ref().map(basket_line_from_row).transpose()
    }

    async fn save_line(&self, line: &BasketLine) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO basket_lines (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(Uuid::from(line.key.user_id))
        .bind(Uuid::from(line.key.product_id))
        .bind(i64::from(line.quantity))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_line", e))?;
        Ok(())
    }

    async fn delete_line(&self, key: BasketKey) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM basket_lines WHERE user_id = $1 AND product_id = $2")
            .bind(Uuid::from(key.user_id))
            .bind(Uuid::from(key.product_id))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_line", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_lines(&self, user_id: UserId) -> StoreResult<Vec<BasketLine>> {
        let rows = sqlx::query(
            "SELECT user_id, product_id, quantity FROM basket_lines WHERE user_id = $1 AND quantity > 0 ORDER BY product_id",
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_lines", e))?;
        rows_to(&rows, basket_line_from_row)
    }
}

#[async_trait]
impl UserStore for PostgresShopStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (id, email, is_active, created_at) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::from(user.id))
            .bind(&user.email)
            .bind(user.is_active)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT id, email, is_active, created_at FROM users WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT id, email, is_active, created_at FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }
}

impl PostgresShopStore {
    async fn load_order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        let rows = sqlx::query(
            "SELECT product_id, quantity, unit_price FROM order_lines WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_lines", e))?;

        rows.iter()
            .map(|row| {
                Ok(OrderLine {
                    product_id: ProductId::from_uuid(column(row, "product_id")?),
                    quantity: from_db_u32(column(row, "quantity")?, "quantity")?,
                    unit_price: from_db_u64(column(row, "unit_price")?, "unit_price")?,
                })
            })
            .collect()
    }

    async fn order_from_row(&self, row: &PgRow) -> StoreResult<Order> {
        let id: Uuid = column(row, "id")?;
        let status: String = column(row, "status")?;
        let status = match status.as_str() {
            "placed" => OrderStatus::Placed,
            other => return Err(StoreError::backend(format!("unknown order status '{other}'"))),
        };

        Ok(Order {
            id: OrderId::from_uuid(id),
            user_id: UserId::from_uuid(column(row, "user_id")?),
            status,
            lines: self.load_order_lines(id).await?,
            promocode: column(row, "promocode")?,
            subtotal: from_db_u64(column(row, "subtotal")?, "subtotal")?,
            total: from_db_u64(column(row, "total")?, "total")?,
            created_at: column(row, "created_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresShopStore {
    #[instrument(skip(self, order), fields(order_id = %order.id, user_id = %order.user_id), err)]
    async fn place_order(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        let mut decrements: Vec<(ProductId, u32)> = order.stock_decrements().collect();
        decrements.sort_by_key(|(id, _)| *id);

        for (product_id, quantity) in &decrements {
            let row = sqlx::query("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
                .bind(Uuid::from(*product_id))
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock product", e))?
                .ok_or(StoreError::NotFound("product"))?;
            let available = from_db_u32(column(&row, "stock")?, "stock")?;
            if available < *quantity {
                return Err(StoreError::StockInsufficient {
                    product_id: *product_id,
                    requested: u64::from(*quantity),
                    available,
                });
            }

            sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
                .bind(Uuid::from(*product_id))
                .bind(i64::from(*quantity))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("decrement stock", e))?;
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, promocode, subtotal, total, created_at)
            VALUES ($1, $2, 'placed', $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(order.id))
        .bind(Uuid::from(order.user_id))
        .bind(order.promocode.as_deref())
        .bind(to_db_amount(order.subtotal, "subtotal")?)
        .bind(to_db_amount(order.total, "total")?)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert order", e))?;

        for (position, line) in order.lines.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| StoreError::backend("too many order lines"))?;
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, position, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::from(order.id))
            .bind(position)
            .bind(Uuid::from(line.product_id))
            .bind(i64::from(line.quantity))
            .bind(to_db_amount(line.unit_price, "unit_price")?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert order line", e))?;
        }

        let ordered: Vec<Uuid> = decrements.iter().map(|(id, _)| Uuid::from(*id)).collect();
        sqlx::query("DELETE FROM basket_lines WHERE user_id = $1 AND product_id = ANY($2)")
            .bind(Uuid::from(order.user_id))
            .bind(&ordered)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear basket", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, user_id, status, promocode, subtotal, total, created_at FROM orders WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?;

        match row {
            Some(row) => Ok(Some(self.order_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT id, user_id, status, promocode, subtotal, total, created_at FROM orders WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(self.order_from_row(row).await?);
        }
        Ok(orders)
    }
}
