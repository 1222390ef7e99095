// Installment persistence.
//
// Every query is scoped by agency_id; the overdue sweep reads candidates and
// applies the pending -> overdue change with a conditional update so it never
// overwrites a payment recorded in the meantime.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};

use crate::core::{AppError, Result};
use crate::modules::installments::models::{Installment, InstallmentStatus};

/// A row that could not be turned into a valid `Installment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDecodeError {
    pub id: String,
    pub message: String,
}

impl std::fmt::Display for RowDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.id, self.message)
    }
}

/// Candidate row for the overdue sweep, decoded independently of its neighbours
pub type CandidateRow = std::result::Result<Installment, RowDecodeError>;

#[async_trait]
pub trait InstallmentRepository: Send + Sync {
    async fn find_by_id(&self, agency_id: &str, id: &str) -> Result<Option<Installment>>;

    /// All installments of a plan ordered by sequence number
    async fn find_by_plan(&self, agency_id: &str, plan_id: &str) -> Result<Vec<Installment>>;

    /// Pending installments of active plans with a student due date before `as_of`
    async fn find_overdue_candidates(
        &self,
        agency_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<CandidateRow>>;

    /// Persist a pending -> overdue change.
    ///
    /// Returns `false` when the row is no longer pending or its plan is no
    /// longer active, in which case nothing is written.
    async fn mark_overdue(&self, agency_id: &str, installment: &Installment) -> Result<bool>;
}

pub(crate) const INSTALLMENT_COLUMNS: &str = "id, plan_id, agency_id, sequence_number, amount, \
     is_initial_payment, generates_commission, student_due_date, college_due_date, status, \
     paid_date, paid_amount, notes, created_at, updated_at";

/// MySQL-backed installment repository
pub struct MySqlInstallmentRepository {
    pool: MySqlPool,
}

impl MySqlInstallmentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstallmentRepository for MySqlInstallmentRepository {
    async fn find_by_id(&self, agency_id: &str, id: &str) -> Result<Option<Installment>> {
        let row = sqlx::query_as::<_, InstallmentRow>(&format!(
            "SELECT {} FROM installments WHERE id = ? AND agency_id = ?",
            INSTALLMENT_COLUMNS
        ))
        .bind(id)
        .bind(agency_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch installment: {}", e)))?;

        row.map(Installment::try_from).transpose()
    }

    async fn find_by_plan(&self, agency_id: &str, plan_id: &str) -> Result<Vec<Installment>> {
        let rows = sqlx::query_as::<_, InstallmentRow>(&format!(
            "SELECT {} FROM installments WHERE plan_id = ? AND agency_id = ? \
             ORDER BY sequence_number ASC",
            INSTALLMENT_COLUMNS
        ))
        .bind(plan_id)
        .bind(agency_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch installments: {}", e)))?;

        rows.into_iter().map(Installment::try_from).collect()
    }

    async fn find_overdue_candidates(
        &self,
        agency_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<CandidateRow>> {
        let rows = sqlx::query_as::<_, InstallmentRow>(
            r#"
            SELECT
                i.id, i.plan_id, i.agency_id, i.sequence_number, i.amount,
                i.is_initial_payment, i.generates_commission, i.student_due_date,
                i.college_due_date, i.status, i.paid_date, i.paid_amount, i.notes,
                i.created_at, i.updated_at
            FROM installments i
            INNER JOIN payment_plans p ON p.id = i.plan_id AND p.agency_id = i.agency_id
            WHERE i.agency_id = ?
              AND i.status = 'pending'
              AND p.status = 'active'
              AND i.student_due_date < ?
            ORDER BY i.student_due_date ASC, i.id ASC
            "#,
        )
        .bind(agency_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.id.clone();
                Installment::try_from(row).map_err(|e| RowDecodeError {
                    id,
                    message: e.to_string(),
                })
            })
            .collect())
    }

    async fn mark_overdue(&self, agency_id: &str, installment: &Installment) -> Result<bool> {
        if installment.status != InstallmentStatus::Overdue {
            return Err(AppError::internal(format!(
                "Installment {} is {}, expected overdue",
                installment.id, installment.status
            )));
        }

        let rows_affected = sqlx::query(
            r#"
            UPDATE installments i
            INNER JOIN payment_plans p ON p.id = i.plan_id AND p.agency_id = i.agency_id
            SET i.status = 'overdue', i.updated_at = ?
            WHERE i.id = ?
              AND i.agency_id = ?
              AND i.status = 'pending'
              AND p.status = 'active'
            "#,
        )
        .bind(installment.updated_at)
        .bind(&installment.id)
        .bind(agency_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }
}

/// Insert a single installment within a transaction
pub(crate) async fn insert_with_tx(
    tx: &mut Transaction<'_, MySql>,
    installment: &Installment,
) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO installments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        INSTALLMENT_COLUMNS
    ))
    .bind(&installment.id)
    .bind(&installment.plan_id)
    .bind(&installment.agency_id)
    .bind(installment.sequence_number)
    .bind(installment.amount)
    .bind(installment.is_initial_payment)
    .bind(installment.generates_commission)
    .bind(installment.student_due_date)
    .bind(installment.college_due_date)
    .bind(installment.status.as_str())
    .bind(installment.paid_date)
    .bind(installment.paid_amount)
    .bind(&installment.notes)
    .bind(installment.created_at)
    .bind(installment.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to insert installment: {}", e)))?;

    Ok(())
}

/// Read and lock every installment of a plan within a transaction
pub(crate) async fn find_by_plan_for_update(
    tx: &mut Transaction<'_, MySql>,
    agency_id: &str,
    plan_id: &str,
) -> Result<Vec<Installment>> {
    let rows = sqlx::query_as::<_, InstallmentRow>(&format!(
        "SELECT {} FROM installments WHERE plan_id = ? AND agency_id = ? \
         ORDER BY sequence_number ASC FOR UPDATE",
        INSTALLMENT_COLUMNS
    ))
    .bind(plan_id)
    .bind(agency_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to lock installments: {}", e)))?;

    rows.into_iter().map(Installment::try_from).collect()
}

/// Write the status and payment fields of an installment within a transaction
pub(crate) async fn update_payment_with_tx(
    tx: &mut Transaction<'_, MySql>,
    installment: &Installment,
) -> Result<()> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE installments
        SET status = ?, paid_date = ?, paid_amount = ?, notes = ?, updated_at = ?
        WHERE id = ? AND agency_id = ?
        "#,
    )
    .bind(installment.status.as_str())
    .bind(installment.paid_date)
    .bind(installment.paid_amount)
    .bind(&installment.notes)
    .bind(installment.updated_at)
    .bind(&installment.id)
    .bind(&installment.agency_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to update installment: {}", e)))?
    .rows_affected();

    if rows_affected == 0 {
        return Err(AppError::not_found("Installment not found"));
    }

    Ok(())
}

/// Database row representation for the installments table
#[derive(sqlx::FromRow)]
pub(crate) struct InstallmentRow {
    id: String,
    plan_id: String,
    agency_id: String,
    sequence_number: i32,
    amount: Decimal,
    is_initial_payment: bool,
    generates_commission: bool,
    student_due_date: NaiveDate,
    college_due_date: NaiveDate,
    status: String,
    paid_date: Option<NaiveDate>,
    paid_amount: Option<Decimal>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InstallmentRow> for Installment {
    type Error = AppError;

    fn try_from(row: InstallmentRow) -> Result<Self> {
        let status: InstallmentStatus = row.status.parse().map_err(AppError::Internal)?;

        let installment = Installment {
            id: row.id,
            plan_id: row.plan_id,
            agency_id: row.agency_id,
            sequence_number: row.sequence_number,
            amount: row.amount,
            is_initial_payment: row.is_initial_payment,
            generates_commission: row.generates_commission,
            student_due_date: row.student_due_date,
            college_due_date: row.college_due_date,
            status,
            paid_date: row.paid_date,
            paid_amount: row.paid_amount,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };

        installment.check_payment_fields()?;
        Ok(installment)
    }
}
