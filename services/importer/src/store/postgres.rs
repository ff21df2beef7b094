use std::collections::HashMap;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgPool, Postgres, Transaction};
use tracing::{debug, info};

use super::SalesStore;
use crate::error::StoreError;
use crate::model::{Dimension, DimensionValue, NewSale};

/// PostgreSQL backend.
///
/// Holds a single-connection pool: the importer is the only writer and every
/// statement runs in sequence. Writes go into one open transaction that is
/// replaced after each `commit`; every statement, reads included, runs inside
/// its own savepoint so a rejected row does not poison the surrounding
/// transaction.
pub struct PgStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStore {
    pub async fn connect(options: PgConnectOptions) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Connection)?;
        info!("database connected");

        Ok(Self { pool, tx: None })
    }

    /// The open transaction, started on first use after a commit.
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await.map_err(StoreError::classify)?,
        };
        Ok(self.tx.insert(tx))
    }
}

fn insert_if_absent_sql(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Region => {
            "INSERT INTO regions (country) \
             SELECT $1 WHERE NOT EXISTS (SELECT 1 FROM regions WHERE country = $1)"
        }
        Dimension::Product => {
            "INSERT INTO products (stock_code, description) \
             SELECT $1, $2 WHERE NOT EXISTS (SELECT 1 FROM products WHERE stock_code = $1)"
        }
        Dimension::Customer => {
            "INSERT INTO customers (customer_code) \
             SELECT $1 WHERE NOT EXISTS (SELECT 1 FROM customers WHERE customer_code = $1)"
        }
    }
}

impl SalesStore for PgStore {
    async fn insert_if_absent(
        &mut self,
        dimension: Dimension,
        value: &DimensionValue,
    ) -> Result<bool, StoreError> {
        let tx = self.tx().await?;
        let mut savepoint = Connection::begin(&mut **tx)
            .await
            .map_err(StoreError::classify)?;

        let mut query = sqlx::query(insert_if_absent_sql(dimension)).bind(&value.key);
        if dimension == Dimension::Product {
            query = query.bind(value.description.as_deref());
        }

        match query.execute(&mut *savepoint).await {
            Ok(done) => {
                savepoint.commit().await.map_err(StoreError::classify)?;
                Ok(done.rows_affected() == 1)
            }
            Err(e) => {
                savepoint.rollback().await.map_err(StoreError::classify)?;
                Err(StoreError::classify(e))
            }
        }
    }

    async fn find_id(
        &mut self,
        dimension: Dimension,
        key: &str,
    ) -> Result<Option<i32>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            dimension.id_column(),
            dimension.table(),
            dimension.key_column()
        );
        let tx = self.tx().await?;
        let mut savepoint = Connection::begin(&mut **tx)
            .await
            .map_err(StoreError::classify)?;

        let result = sqlx::query_scalar::<_, i32>(&sql)
            .bind(key)
            .fetch_optional(&mut *savepoint)
            .await;

        match result {
            Ok(id) => {
                savepoint.commit().await.map_err(StoreError::classify)?;
                Ok(id)
            }
            Err(e) => {
                savepoint.rollback().await.map_err(StoreError::classify)?;
                Err(StoreError::classify(e))
            }
        }
    }

    async fn load_keys(
        &mut self,
        dimension: Dimension,
    ) -> Result<HashMap<String, i32>, StoreError> {
        let sql = format!(
            "SELECT {}, {} FROM {}",
            dimension.key_column(),
            dimension.id_column(),
            dimension.table()
        );
        let tx = self.tx().await?;
        let mut savepoint = Connection::begin(&mut **tx)
            .await
            .map_err(StoreError::classify)?;

        let result: Result<Vec<(String, i32)>, sqlx::Error> =
            sqlx::query_as(&sql).fetch_all(&mut *savepoint).await;
        let rows = match result {
            Ok(rows) => {
                savepoint.commit().await.map_err(StoreError::classify)?;
                rows
            }
            Err(e) => {
                savepoint.rollback().await.map_err(StoreError::classify)?;
                return Err(StoreError::classify(e));
            }
        };

        debug!(%dimension, keys = rows.len(), "loaded natural keys");
        Ok(rows.into_iter().collect())
    }

    async fn insert_sale(&mut self, sale: &NewSale) -> Result<(), StoreError> {
        let tx = self.tx().await?;
        let mut savepoint = Connection::begin(&mut **tx)
            .await
            .map_err(StoreError::classify)?;

        let result = sqlx::query(
            r#"
            INSERT INTO sales (invoice_no, product_id, customer_id, region_id,
                               quantity, unit_price, total_amount, invoice_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&sale.invoice_no)
        .bind(sale.product_id)
        .bind(sale.customer_id)
        .bind(sale.region_id)
        .bind(sale.quantity)
        .bind(sale.unit_price)
        .bind(sale.total_amount)
        .bind(sale.invoice_date)
        .execute(&mut *savepoint)
        .await;

        match result {
            Ok(_) => savepoint.commit().await.map_err(StoreError::classify),
            Err(e) => {
                savepoint.rollback().await.map_err(StoreError::classify)?;
                Err(StoreError::classify(e))
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(StoreError::classify)?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        // Dropping an open transaction rolls it back.
        drop(self.tx.take());
        self.pool.close().await;
        info!("database connection closed");
        Ok(())
    }
}
