/// Postgres-backed `MenuStore`.
///
/// The pool connects lazily: the first query opens a connection, and a database that
/// cannot be reached surfaces as `StorageUnavailable` once the acquire timeout elapses.
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::menu::MenuStore;
use crate::model::MenuRow;

const MENU_ROWS_SQL: &str = "\
SELECT hall_name, name AS item_name, station, ingredients, allergens, diet_tags, category, notes \
FROM menu_item \
WHERE date_served = $1::date AND meal_type = $2 \
ORDER BY hall_name, category, name";

const HALL_NAMES_SQL: &str = "SELECT DISTINCT hall_name FROM menu_item ORDER BY hall_name";

const SERVED_DATES_SQL: &str =
    "SELECT DISTINCT date_served::text AS date_served FROM menu_item ORDER BY date_served";

pub struct PgMenuStore {
    pool: PgPool,
}

impl PgMenuStore {
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, AppError> {
        let options = connect_options(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy_with(options);
        info!(
            url = config.url.is_some(),
            host = %config.host,
            database = %config.name,
            ssl = config.ssl,
            "postgres pool configured (lazy)"
        );
        Ok(Self { pool })
    }

    /// Round-trip a trivial query. Used at startup to log connectivity.
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, AppError> {
    let mut options = match &config.url {
        Some(url) => url
            .parse::<PgConnectOptions>()
            .map_err(|e| AppError::Config(format!("invalid DATABASE_URL: {e}")))?,
        None => {
            let mut options = PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .database(&config.name);
            if let Some(user) = &config.user {
                options = options.username(user);
            }
            if let Some(password) = &config.password {
                options = options.password(password);
            }
            options
        }
    };
    options = if config.ssl {
        options.ssl_mode(PgSslMode::Require)
    } else if config.url.is_none() {
        options.ssl_mode(PgSslMode::Disable)
    } else {
        options
    };
    Ok(options)
}

/// Connection-class failures mean the store is unreachable; everything else is a bad query.
pub fn storage_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            warn!(error = %e, "menu store unreachable");
            AppError::StorageUnavailable(e.to_string())
        }
        other => {
            warn!(error = %other, "menu query failed");
            AppError::Query(other.to_string())
        }
    }
}

#[async_trait]
impl MenuStore for PgMenuStore {
    async fn menu_rows(&self, date: &str, meal: &str) -> Result<Vec<MenuRow>, AppError> {
        sqlx::query_as::<_, MenuRow>(MENU_ROWS_SQL)
            .bind(date)
            .bind(meal)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)
    }

    async fn hall_names(&self) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar::<_, String>(HALL_NAMES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)
    }

    async fn served_dates(&self) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar::<_, String>(SERVED_DATES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(url: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            url: url.map(str::to_string),
            host: "localhost".to_string(),
            port: 5432,
            name: "stanford_menu".to_string(),
            user: Some("menu".to_string()),
            password: None,
            ssl: false,
            max_connections: 2,
            acquire_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn discrete_fields_build_options() {
        let options = connect_options(&config(None)).unwrap();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_database(), Some("stanford_menu"));
    }

    #[test]
    fn malformed_url_is_config_error() {
        let err = connect_options(&config(Some("not a url"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn connection_errors_are_unavailable() {
        assert!(matches!(
            storage_error(sqlx::Error::PoolTimedOut),
            AppError::StorageUnavailable(_)
        ));
        assert!(matches!(
            storage_error(sqlx::Error::RowNotFound),
            AppError::Query(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_database_fails_instead_of_hanging() {
        let mut cfg = config(None);
        cfg.host = "127.0.0.1".to_string();
        cfg.port = 9;
        let store = PgMenuStore::connect_lazy(&cfg).unwrap();
        let err = store.menu_rows("2024-12-25", "Dinner").await.unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)), "got {err:?}");
    }
}
