//! Postgres pool construction for the primary cache store.

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use crate::config::DatabaseSettings;

use super::error::InfraError;

/// Build the process-wide pool without connecting.
///
/// Connections are established on first use, so an unreachable database
/// never blocks startup; the cache's per-operation deadlines bound the
/// damage at request time instead.
pub fn connect_lazy(settings: &DatabaseSettings) -> Result<PgPool, InfraError> {
    let url = settings
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let options = PgConnectOptions::from_str(url)
        .map_err(|err| InfraError::database(format!("invalid database url: {err}")))?
        .ssl_mode(if settings.require_tls {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        });

    Ok(PgPoolOptions::new()
        .max_connections(settings.max_connections.get())
        .connect_lazy_with(options))
}
