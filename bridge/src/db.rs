//! Database connection management.

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use std::time::Duration;

use crate::{ConnectionDetails, Error, Result};

/// Connection options for an IAM-authenticated MySQL connection.
///
/// The token travels as a cleartext password, so TLS is always required and
/// the server certificate is verified when a CA bundle is configured.
pub fn connect_options(details: &ConnectionDetails) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&details.host)
        .port(details.port)
        .username(&details.username)
        .password(&details.password)
        .database(&details.database)
        .enable_cleartext_plugin(true);

    match &details.ssl_ca {
        Some(ca) => options.ssl_mode(MySqlSslMode::VerifyCa).ssl_ca(ca),
        None => options.ssl_mode(MySqlSslMode::Required),
    }
}

/// Create a database connection pool.
pub async fn create_pool(details: &ConnectionDetails) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(connect_options(details))
        .await
        .map_err(Error::Database)?;

    Ok(pool)
}

/// Round-trip a trivial query.
pub async fn ping(pool: &MySqlPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> ConnectionDetails {
        ConnectionDetails {
            username: "admin".to_string(),
            password: "token".to_string(),
            host: "db.example.com".to_string(),
            port: 3307,
            database: "app".to_string(),
            ssl_ca: Some("/opt/rds-ca.pem".to_string()),
        }
    }

    #[test]
    fn test_connect_options() {
        let options = connect_options(&details());
        assert_eq!(options.get_host(), "db.example.com");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "admin");
        assert_eq!(options.get_database(), Some("app"));
    }
}
