// Payment plan persistence.
//
// Plans and their installments are written together: creation inserts the
// whole schedule in one transaction, and every mutation locks the plan row
// first, then its installments, so concurrent payments on the same plan are
// serialized and the recomputed plan is always the last write.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};

use crate::core::{AppError, Currency, Result};
use crate::modules::installments::models::Installment;
use crate::modules::installments::repositories::installment_repository::{
    find_by_plan_for_update, insert_with_tx, update_payment_with_tx,
};
use crate::modules::plans::models::{PaymentPlan, PlanStatus};

/// A plan together with its full installment set
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSnapshot {
    pub plan: PaymentPlan,
    pub installments: Vec<Installment>,
}

impl PlanSnapshot {
    pub fn installment(&self, id: &str) -> Option<&Installment> {
        self.installments.iter().find(|i| i.id == id)
    }
}

/// Change applied to a locked plan snapshot; returns the new state to persist
pub type PlanMutation<'a> = &'a (dyn Fn(&PlanSnapshot) -> Result<PlanSnapshot> + Send + Sync);

#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Insert a plan and its installment schedule atomically
    async fn create_with_installments(
        &self,
        plan: &PaymentPlan,
        installments: &[Installment],
    ) -> Result<()>;

    async fn find_by_id(&self, agency_id: &str, plan_id: &str) -> Result<Option<PaymentPlan>>;

    /// Lock the plan and its installments, apply `mutation`, and persist the
    /// changed rows in one transaction. Returns the state before and after.
    ///
    /// If the mutation fails nothing is written.
    async fn update_locked(
        &self,
        agency_id: &str,
        plan_id: &str,
        mutation: PlanMutation<'_>,
    ) -> Result<(PlanSnapshot, PlanSnapshot)>;
}

/// MySQL-backed plan repository
pub struct MySqlPlanRepository {
    pool: MySqlPool,
}

impl MySqlPlanRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn insert_plan_with_tx(
        &self,
        tx: &mut Transaction<'_, MySql>,
        plan: &PaymentPlan,
    ) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payment_plans ({}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PLAN_COLUMNS
        ))
        .bind(&plan.id)
        .bind(&plan.agency_id)
        .bind(&plan.enrollment_id)
        .bind(plan.currency.as_str())
        .bind(plan.total_value)
        .bind(plan.materials_cost)
        .bind(plan.admin_fees)
        .bind(plan.other_fees)
        .bind(plan.commission_rate_percent)
        .bind(plan.tax_inclusive)
        .bind(plan.commissionable_value)
        .bind(plan.expected_commission)
        .bind(plan.earned_commission)
        .bind(plan.status.as_str())
        .bind(plan.start_date)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create payment plan: {}", e)))?;

        Ok(())
    }

    async fn update_derived_with_tx(
        &self,
        tx: &mut Transaction<'_, MySql>,
        plan: &PaymentPlan,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_plans
            SET earned_commission = ?, status = ?, updated_at = ?
            WHERE id = ? AND agency_id = ?
            "#,
        )
        .bind(plan.earned_commission)
        .bind(plan.status.as_str())
        .bind(plan.updated_at)
        .bind(&plan.id)
        .bind(&plan.agency_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update payment plan: {}", e)))?;

        Ok(())
    }
}

const PLAN_COLUMNS: &str = "id, agency_id, enrollment_id, currency, total_value, materials_cost, \
     admin_fees, other_fees, commission_rate_percent, tax_inclusive, commissionable_value, \
     expected_commission, earned_commission, status, start_date, created_at, updated_at";

#[async_trait]
impl PlanRepository for MySqlPlanRepository {
    async fn create_with_installments(
        &self,
        plan: &PaymentPlan,
        installments: &[Installment],
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        self.insert_plan_with_tx(&mut tx, plan).await?;
        for installment in installments {
            insert_with_tx(&mut tx, installment).await?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, agency_id: &str, plan_id: &str) -> Result<Option<PaymentPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {} FROM payment_plans WHERE id = ? AND agency_id = ?",
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .bind(agency_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch payment plan: {}", e)))?;

        row.map(PaymentPlan::try_from).transpose()
    }

    async fn update_locked(
        &self,
        agency_id: &str,
        plan_id: &str,
        mutation: PlanMutation<'_>,
    ) -> Result<(PlanSnapshot, PlanSnapshot)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        let plan_row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {} FROM payment_plans WHERE id = ? AND agency_id = ? FOR UPDATE",
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .bind(agency_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to lock payment plan: {}", e)))?
        .ok_or_else(|| AppError::not_found("Payment plan not found"))?;

        let before = PlanSnapshot {
            plan: PaymentPlan::try_from(plan_row)?,
            installments: find_by_plan_for_update(&mut tx, agency_id, plan_id).await?,
        };

        // Dropping the transaction on error rolls it back
        let after = mutation(&before)?;

        for installment in &after.installments {
            if before.installment(&installment.id) != Some(installment) {
                update_payment_with_tx(&mut tx, installment).await?;
            }
        }

        if after.plan != before.plan {
            self.update_derived_with_tx(&mut tx, &after.plan).await?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok((before, after))
    }
}

/// Database row representation for the payment_plans table
#[derive(sqlx::FromRow)]
struct PlanRow {
    id: String,
    agency_id: String,
    enrollment_id: String,
    currency: String,
    total_value: Decimal,
    materials_cost: Decimal,
    admin_fees: Decimal,
    other_fees: Decimal,
    commission_rate_percent: Decimal,
    tax_inclusive: bool,
    commissionable_value: Decimal,
    expected_commission: Decimal,
    earned_commission: Decimal,
    status: String,
    start_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PlanRow> for PaymentPlan {
    type Error = AppError;

    fn try_from(row: PlanRow) -> Result<Self> {
        let status: PlanStatus = row.status.parse().map_err(AppError::Internal)?;
        let currency: Currency = row.currency.parse().map_err(AppError::Internal)?;

        Ok(PaymentPlan {
            id: row.id,
            agency_id: row.agency_id,
            enrollment_id: row.enrollment_id,
            currency,
            total_value: row.total_value,
            materials_cost: row.materials_cost,
            admin_fees: row.admin_fees,
            other_fees: row.other_fees,
            commission_rate_percent: row.commission_rate_percent,
            tax_inclusive: row.tax_inclusive,
            commissionable_value: row.commissionable_value,
            expected_commission: row.expected_commission,
            earned_commission: row.earned_commission,
            status,
            start_date: row.start_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
