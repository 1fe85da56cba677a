use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::utilities::models::{
    BillDetail, NewBillDetail, NewUtilityExpense, UtilityAccountMapping,
};
use crate::utilities::repositories::UtilitiesRepository;
use haven_common::error::{HavenError, HavenResult};
use haven_common::types::UpsertOutcome;

#[derive(Clone)]
pub struct PgUtilitiesRepository {
    pool: PgPool,
}

impl PgUtilitiesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn outcome(inserted: bool) -> UpsertOutcome {
        if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        }
    }

    fn map_bill_row(row: PgRow) -> HavenResult<BillDetail> {
        Ok(BillDetail {
            id: row.get("id"),
            external_id: row.get("external_id"),
            vendor_external_id: row.get("vendor_external_id"),
            property_external_id: row.get("property_external_id"),
            gl_account_number: row.get("gl_account_number"),
            description: row.get("description"),
            amount_cents: row.get("amount_cents"),
            bill_date: row.get("bill_date"),
            raw_ref: row.get("raw_ref"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn map_mapping_row(row: PgRow) -> HavenResult<UtilityAccountMapping> {
        Ok(UtilityAccountMapping {
            id: row.get("id"),
            gl_account_number: row.get("gl_account_number"),
            utility_type: row.get("utility_type"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl UtilitiesRepository for PgUtilitiesRepository {
    async fn upsert_bill_detail(&self, bill: NewBillDetail) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into bill_details
               (id, external_id, vendor_external_id, property_external_id, gl_account_number, description, amount_cents, bill_date, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             on conflict (external_id) do update set
               vendor_external_id = excluded.vendor_external_id,
               property_external_id = excluded.property_external_id,
               gl_account_number = excluded.gl_account_number,
               description = excluded.description,
               amount_cents = excluded.amount_cents,
               bill_date = excluded.bill_date,
               raw_ref = excluded.raw_ref,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(bill.external_id)
        .bind(bill.vendor_external_id)
        .bind(bill.property_external_id)
        .bind(&bill.gl_account_number)
        .bind(&bill.description)
        .bind(bill.amount_cents)
        .bind(bill.bill_date)
        .bind(&bill.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }

    async fn bill_detail_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
        let row = sqlx::query("select id from bill_details where external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get("id")))
    }

    async fn active_mappings(&self) -> HavenResult<Vec<UtilityAccountMapping>> {
        let rows = sqlx::query(
            "select id, gl_account_number, utility_type, is_active, created_at, updated_at
             from utility_account_mappings
             where is_active
             order by gl_account_number",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_mapping_row).collect()
    }

    async fn upsert_mapping(
        &self,
        gl_account_number: &str,
        utility_type: &str,
    ) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into utility_account_mappings (id, gl_account_number, utility_type, is_active)
             values ($1, $2, $3, true)
             on conflict (gl_account_number) do update set
               utility_type = excluded.utility_type,
               is_active = true,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(gl_account_number)
        .bind(utility_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }

    async fn deactivate_mapping(&self, gl_account_number: &str) -> HavenResult<()> {
        let result = sqlx::query(
            "update utility_account_mappings set is_active = false, updated_at = $1
             where gl_account_number = $2",
        )
        .bind(Utc::now())
        .bind(gl_account_number)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(HavenError::NotFound(format!(
                "no mapping for gl account {gl_account_number}"
            )));
        }
        Ok(())
    }

    async fn bill_details_in_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> HavenResult<Vec<BillDetail>> {
        let rows = sqlx::query(
            "select id, external_id, vendor_external_id, property_external_id, gl_account_number,
                    description, amount_cents, bill_date, raw_ref, created_at, updated_at
             from bill_details
             where ($1::date is null or bill_date >= $1)
               and ($2::date is null or bill_date <= $2)
             order by bill_date, external_id",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_bill_row).collect()
    }

    async fn delete_expenses_in_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> HavenResult<u64> {
        let result = sqlx::query(
            "delete from utility_expenses
             where ($1::date is null or expense_date >= $1)
               and ($2::date is null or expense_date <= $2)",
        )
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn upsert_expense(&self, expense: NewUtilityExpense) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into utility_expenses
               (id, bill_detail_id, property_external_id, utility_type, amount_cents, expense_date)
             values ($1, $2, $3, $4, $5, $6)
             on conflict (bill_detail_id) do update set
               property_external_id = excluded.property_external_id,
               utility_type = excluded.utility_type,
               amount_cents = excluded.amount_cents,
               expense_date = excluded.expense_date,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(expense.bill_detail_id)
        .bind(expense.property_external_id)
        .bind(&expense.utility_type)
        .bind(expense.amount_cents)
        .bind(expense.expense_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }
}
