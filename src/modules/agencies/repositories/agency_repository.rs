use async_trait::async_trait;
use chrono::NaiveTime;
use sqlx::MySqlPool;

use crate::core::{AppError, Currency, Result};
use crate::modules::agencies::models::Agency;

/// Tenant lookups
#[async_trait]
pub trait AgencyRepository: Send + Sync {
    async fn find_by_id(&self, agency_id: &str) -> Result<Option<Agency>>;

    /// Every agency, for system-level batch work that spans tenants
    async fn list_all(&self) -> Result<Vec<Agency>>;
}

/// MySQL-backed agency repository
pub struct MySqlAgencyRepository {
    pool: MySqlPool,
}

impl MySqlAgencyRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgencyRepository for MySqlAgencyRepository {
    async fn find_by_id(&self, agency_id: &str) -> Result<Option<Agency>> {
        let row = sqlx::query_as::<_, AgencyRow>(
            r#"
            SELECT id, name, timezone, overdue_cutoff, default_currency
            FROM agencies
            WHERE id = ?
            "#,
        )
        .bind(agency_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch agency: {}", e)))?;

        row.map(Agency::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Agency>> {
        let rows = sqlx::query_as::<_, AgencyRow>(
            r#"
            SELECT id, name, timezone, overdue_cutoff, default_currency
            FROM agencies
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Agency::try_from).collect()
    }
}

/// Database row representation for the agencies table
#[derive(sqlx::FromRow)]
struct AgencyRow {
    id: String,
    name: String,
    timezone: String,
    overdue_cutoff: NaiveTime,
    default_currency: String,
}

impl TryFrom<AgencyRow> for Agency {
    type Error = AppError;

    fn try_from(row: AgencyRow) -> Result<Self> {
        let default_currency: Currency = row.default_currency.parse().map_err(|e| {
            AppError::Internal(format!("Agency {} has invalid currency: {}", row.id, e))
        })?;

        // Timezone stays a raw string; it is resolved per use so one bad
        // value only affects its own tenant.
        Ok(Agency {
            id: row.id,
            name: row.name,
            timezone: row.timezone,
            overdue_cutoff: row.overdue_cutoff,
            default_currency,
        })
    }
}
