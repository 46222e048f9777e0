//! Store probes: the injected capability the drift detector uses to look
//! inside the legacy and new stores.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DbBackend, DbErr, FromQueryResult, Statement,
};

/// Errors a probe can report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    /// The store could not be reached (connection refused, pool exhausted, timed out).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but the query failed.
    #[error("query failed: {0}")]
    Query(String),
}

/// Read-only view of one store.
#[async_trait]
pub trait StoreProbe: Send + Sync {
    /// Total rows in `table`.
    async fn record_count(&self, table: &str) -> Result<i64, ProbeError>;

    /// Rows in `table` modified at or after `since`.
    async fn changed_since(&self, table: &str, since: DateTime<Utc>) -> Result<i64, ProbeError>;

    /// Human-readable referential-integrity problems for `table`.
    async fn integrity_issues(&self, table: &str) -> Result<Vec<String>, ProbeError>;

    /// Cheap reachability check used by readiness.
    async fn ping(&self) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// `child.column -> parent.column` foreign-key relationship to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyCheck {
    pub table: String,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && s.len() <= 63
}

fn split_column(part: &str) -> Result<(String, String), String> {
    let (table, column) = part
        .trim()
        .split_once('.')
        .ok_or_else(|| format!("'{}' must be table.column", part.trim()))?;
    for ident in [table, column] {
        if !is_identifier(ident) {
            return Err(format!("'{}' is not a valid identifier", ident));
        }
    }
    Ok((table.to_string(), column.to_string()))
}

impl ForeignKeyCheck {
    /// Parse `orders.customer_id->customers.id`.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let (child, parent) = spec
            .split_once("->")
            .ok_or_else(|| format!("foreign-key check '{}' must be child.col->parent.col", spec))?;
        let (table, column) = split_column(child)?;
        let (references_table, references_column) = split_column(parent)?;

        Ok(Self {
            table,
            column,
            references_table,
            references_column,
        })
    }

    /// Parse a `;`-separated list; blank entries are ignored.
    pub fn parse_list(spec: &str) -> Result<Vec<Self>, String> {
        spec.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    fn orphan_query(&self) -> String {
        format!(
            "SELECT COUNT(*) AS count FROM {child} c LEFT JOIN {parent} p ON c.{col} = p.{pcol} \
             WHERE c.{col} IS NOT NULL AND p.{pcol} IS NULL",
            child = self.table,
            parent = self.references_table,
            col = self.column,
            pcol = self.references_column,
        )
    }

    fn describe(&self, orphans: i64) -> String {
        format!(
            "{} row(s) in {}.{} reference missing {}.{}",
            orphans, self.table, self.column, self.references_table, self.references_column
        )
    }
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    count: i64,
}

/// Probe backed by a SeaORM connection to one store.
#[derive(Clone)]
pub struct SqlStoreProbe {
    conn: DatabaseConnection,
    delta_column: String,
    checks: Vec<ForeignKeyCheck>,
    query_timeout: Duration,
}

impl SqlStoreProbe {
    pub fn new(
        conn: DatabaseConnection,
        delta_column: impl Into<String>,
        checks: Vec<ForeignKeyCheck>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            delta_column: delta_column.into(),
            checks,
            query_timeout,
        }
    }

    /// Open a lazily-connected pool so an unreachable store surfaces as
    /// `Unavailable` on first use rather than at startup.
    pub async fn connect(
        url: &str,
        delta_column: impl Into<String>,
        checks: Vec<ForeignKeyCheck>,
        query_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let mut options = ConnectOptions::new(url.to_string());
        options
            .max_connections(4)
            .connect_timeout(query_timeout)
            .acquire_timeout(query_timeout)
            .connect_lazy(true)
            .sqlx_logging(false);

        let conn = Database::connect(options).await.map_err(map_db_err)?;
        Ok(Self::new(conn, delta_column, checks, query_timeout))
    }

    async fn count(&self, statement: Statement) -> Result<i64, ProbeError> {
        let query = CountRow::find_by_statement(statement).one(&self.conn);
        let row = tokio::time::timeout(self.query_timeout, query)
            .await
            .map_err(|_| {
                ProbeError::Unavailable(format!(
                    "query exceeded {}s",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(map_db_err)?;

        Ok(row.map(|r| r.count).unwrap_or(0))
    }
}

fn map_db_err(err: DbErr) -> ProbeError {
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => ProbeError::Unavailable(err.to_string()),
        other => ProbeError::Query(other.to_string()),
    }
}

fn checked_identifier(table: &str) -> Result<&str, ProbeError> {
    if is_identifier(table) {
        Ok(table)
    } else {
        Err(ProbeError::Query(format!("'{}' is not a valid identifier", table)))
    }
}

#[async_trait]
impl StoreProbe for SqlStoreProbe {
    async fn record_count(&self, table: &str) -> Result<i64, ProbeError> {
        let table = checked_identifier(table)?;
        let backend = self.conn.get_database_backend();
        self.count(Statement::from_string(
            backend,
            format!("SELECT COUNT(*) AS count FROM {}", table),
        ))
        .await
    }

    async fn changed_since(&self, table: &str, since: DateTime<Utc>) -> Result<i64, ProbeError> {
        let table = checked_identifier(table)?;
        let delta_column = checked_identifier(&self.delta_column)?;
        let backend = self.conn.get_database_backend();
        let placeholder = match backend {
            DbBackend::Postgres => "$1",
            _ => "?",
        };
        self.count(Statement::from_sql_and_values(
            backend,
            format!(
                "SELECT COUNT(*) AS count FROM {} WHERE {} >= {}",
                table, delta_column, placeholder
            ),
            [since.into()],
        ))
        .await
    }

    async fn integrity_issues(&self, table: &str) -> Result<Vec<String>, ProbeError> {
        let table = checked_identifier(table)?;
        let backend = self.conn.get_database_backend();

        let mut issues = Vec::new();
        for check in self.checks.iter().filter(|c| c.table == table) {
            let orphans = self
                .count(Statement::from_string(backend, check.orphan_query()))
                .await?;
            if orphans > 0 {
                issues.push(check.describe(orphans));
            }
        }

        Ok(issues)
    }

    async fn ping(&self) -> Result<(), ProbeError> {
        let backend = self.conn.get_database_backend();
        self.count(Statement::from_string(backend, "SELECT 1 AS count".to_string()))
            .await
            .map(|_| ())
    }
}
