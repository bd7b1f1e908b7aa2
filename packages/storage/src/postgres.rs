use services::types::{L2Transaction, TxStatus};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::{
    error::{Error, Result},
    mappings::tables::{u64_to_bigdecimal, PoolTransaction},
};

// Rows returned per `transactions_by_status` page.
const PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct Postgres {
    connection_pool: sqlx::Pool<sqlx::Postgres>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DbConfig {
    /// The hostname or IP address of the `PostgreSQL` server.
    pub host: String,
    /// The port number on which the `PostgreSQL` server is listening.
    pub port: u16,
    /// The username used to authenticate with the `PostgreSQL` server.
    pub username: String,
    /// The password used to authenticate with the `PostgreSQL` server.
    pub password: String,
    /// The name of the database to connect to on the `PostgreSQL` server.
    pub database: String,
    /// The maximum number of connections allowed in the connection pool.
    pub max_connections: u32,
    /// Whether to use SSL when connecting to the `PostgreSQL` server.
    pub use_ssl: bool,
}

impl Postgres {
    pub async fn connect(opt: &DbConfig) -> services::Result<Self> {
        let ssl_mode = if opt.use_ssl {
            sqlx::postgres::PgSslMode::Require
        } else {
            sqlx::postgres::PgSslMode::Disable
        };

        let options = PgConnectOptions::new()
            .ssl_mode(ssl_mode)
            .username(&opt.username)
            .password(&opt.password)
            .database(&opt.database)
            .host(&opt.host)
            .port(opt.port);

        let connection_pool = PgPoolOptions::new()
            .max_connections(opt.max_connections)
            .connect_with(options)
            .await
            .map_err(Error::from)?;

        Ok(Self { connection_pool })
    }

    /// Close only when shutting down the application. Will close the
    /// connection pool even if it is shared.
    pub async fn close(self) {
        self.connection_pool.close().await;
    }

    pub async fn migrate(&self) -> services::Result<()> {
        sqlx::migrate!()
            .run(&self.connection_pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    pub(crate) async fn _insert_transaction(&self, tx: &L2Transaction) -> Result<u64> {
        let nonce = i64::try_from(tx.nonce).map_err(|_| {
            Error::Conversion(format!("`nonce` {} does not fit the db column", tx.nonce))
        })?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO pool.transaction \
             (hash, received_at, updated_at, from_address, gas_price, nonce, status, ip, encoded, decoded, error) \
             VALUES ($1, $2, NOW(), $3, $4, $5, $6, $7, $8, $9, '') \
             RETURNING id",
        )
        .bind(&tx.hash)
        .bind(tx.received_at)
        .bind(&tx.from_address)
        .bind(u64_to_bigdecimal(tx.gas_price))
        .bind(nonce)
        .bind(tx.status.as_str())
        .bind(&tx.ip)
        .bind(&tx.encoded)
        .bind(&tx.decoded)
        .fetch_one(&self.connection_pool)
        .await?;

        u64::try_from(id)
            .map_err(|_| Error::Conversion(format!("Expected a non-negative `id`, but got: {id} from db")))
    }

    pub(crate) async fn _update_transaction_status(
        &self,
        id: u64,
        status: TxStatus,
        error_msg: &str,
    ) -> Result<()> {
        let id = i64::try_from(id)
            .map_err(|_| Error::Conversion(format!("`id` {id} does not fit the db column")))?;

        sqlx::query("UPDATE pool.transaction SET status = $2, error = $3, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(error_msg)
            .execute(&self.connection_pool)
            .await?;

        // Zero rows updated is acceptable: an operator may have pruned the
        // row in the meantime.
        Ok(())
    }

    pub(crate) async fn _transactions_by_status(
        &self,
        status: TxStatus,
        page: u32,
    ) -> Result<Vec<L2Transaction>> {
        sqlx::query_as::<_, PoolTransaction>(
            "SELECT * FROM pool.transaction WHERE status = $1 ORDER BY id ASC LIMIT $2 OFFSET $3",
        )
        .bind(status.as_str())
        .bind(PAGE_SIZE)
        .bind(i64::from(page) * PAGE_SIZE)
        .fetch_all(&self.connection_pool)
        .await?
        .into_iter()
        .map(L2Transaction::try_from)
        .collect::<Result<Vec<_>>>()
    }
}
