use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::portfolio::models::{
    NewLease, NewLedgerTransaction, NewProperty, NewTenant, NewUnit, NewWorkOrder,
};
use crate::portfolio::repositories::PortfolioRepository;
use haven_common::error::{HavenError, HavenResult};
use haven_common::types::UpsertOutcome;

#[derive(Clone)]
pub struct PgPortfolioRepository {
    pool: PgPool,
}

impl PgPortfolioRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `(xmax = 0)` is true for freshly inserted rows, false when the
    /// on-conflict update path ran.
    fn outcome(inserted: bool) -> UpsertOutcome {
        if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        }
    }

    async fn id_by_external(&self, table: &str, external_id: i64) -> HavenResult<Option<Uuid>> {
        let row = sqlx::query(&format!("select id from {table} where external_id = $1"))
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get("id")))
    }
}

#[async_trait]
impl PortfolioRepository for PgPortfolioRepository {
    async fn upsert_property(&self, property: NewProperty) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into properties
               (id, external_id, name, address_line1, city, state, postal_code, property_type, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             on conflict (external_id) do update set
               name = excluded.name,
               address_line1 = excluded.address_line1,
               city = excluded.city,
               state = excluded.state,
               postal_code = excluded.postal_code,
               property_type = excluded.property_type,
               raw_ref = excluded.raw_ref,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(property.external_id)
        .bind(&property.name)
        .bind(&property.address_line1)
        .bind(&property.city)
        .bind(&property.state)
        .bind(&property.postal_code)
        .bind(&property.property_type)
        .bind(&property.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }

    async fn upsert_unit(&self, unit: NewUnit) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into units
               (id, external_id, property_id, unit_number, bedrooms, bathrooms, square_feet, market_rent_cents, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             on conflict (external_id) do update set
               property_id = excluded.property_id,
               unit_number = excluded.unit_number,
               bedrooms = excluded.bedrooms,
               bathrooms = excluded.bathrooms,
               square_feet = excluded.square_feet,
               market_rent_cents = excluded.market_rent_cents,
               raw_ref = excluded.raw_ref,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(unit.external_id)
        .bind(unit.property_id)
        .bind(&unit.unit_number)
        .bind(unit.bedrooms)
        .bind(unit.bathrooms)
        .bind(unit.square_feet)
        .bind(unit.market_rent_cents)
        .bind(&unit.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }

    async fn upsert_tenant(&self, tenant: NewTenant) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into tenants
               (id, external_id, first_name, last_name, email, phone, status, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8)
             on conflict (external_id) do update set
               first_name = excluded.first_name,
               last_name = excluded.last_name,
               email = excluded.email,
               phone = excluded.phone,
               status = excluded.status,
               raw_ref = excluded.raw_ref,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(tenant.external_id)
        .bind(&tenant.first_name)
        .bind(&tenant.last_name)
        .bind(&tenant.email)
        .bind(&tenant.phone)
        .bind(&tenant.status)
        .bind(&tenant.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }

    async fn upsert_lease(&self, lease: NewLease) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into leases
               (id, external_id, unit_id, tenant_id, rent_cents, deposit_cents, start_date, end_date, status, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             on conflict (external_id) do update set
               unit_id = excluded.unit_id,
               tenant_id = excluded.tenant_id,
               rent_cents = excluded.rent_cents,
               deposit_cents = excluded.deposit_cents,
               start_date = excluded.start_date,
               end_date = excluded.end_date,
               status = excluded.status,
               raw_ref = excluded.raw_ref,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(lease.external_id)
        .bind(lease.unit_id)
        .bind(lease.tenant_id)
        .bind(lease.rent_cents)
        .bind(lease.deposit_cents)
        .bind(lease.start_date)
        .bind(lease.end_date)
        .bind(&lease.status)
        .bind(&lease.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }

    async fn upsert_ledger_transaction(
        &self,
        transaction: NewLedgerTransaction,
    ) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into ledger_transactions
               (id, external_id, lease_id, property_id, gl_account_number, description, amount_cents, transaction_date, transaction_type, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             on conflict (external_id) do update set
               lease_id = excluded.lease_id,
               property_id = excluded.property_id,
               gl_account_number = excluded.gl_account_number,
               description = excluded.description,
               amount_cents = excluded.amount_cents,
               transaction_date = excluded.transaction_date,
               transaction_type = excluded.transaction_type,
               raw_ref = excluded.raw_ref,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(transaction.external_id)
        .bind(transaction.lease_id)
        .bind(transaction.property_id)
        .bind(&transaction.gl_account_number)
        .bind(&transaction.description)
        .bind(transaction.amount_cents)
        .bind(transaction.transaction_date)
        .bind(&transaction.transaction_type)
        .bind(&transaction.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }

    async fn upsert_work_order(&self, work_order: NewWorkOrder) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into work_orders
               (id, external_id, property_id, unit_id, vendor_id, description, status, priority, opened_on, completed_on, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             on conflict (external_id) do update set
               property_id = excluded.property_id,
               unit_id = excluded.unit_id,
               vendor_id = excluded.vendor_id,
               description = excluded.description,
               status = excluded.status,
               priority = excluded.priority,
               opened_on = excluded.opened_on,
               completed_on = excluded.completed_on,
               raw_ref = excluded.raw_ref,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(work_order.external_id)
        .bind(work_order.property_id)
        .bind(work_order.unit_id)
        .bind(work_order.vendor_id)
        .bind(&work_order.description)
        .bind(&work_order.status)
        .bind(&work_order.priority)
        .bind(work_order.opened_on)
        .bind(work_order.completed_on)
        .bind(&work_order.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(Self::outcome(row.get("inserted")))
    }

    async fn property_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
        self.id_by_external("properties", external_id).await
    }

    async fn unit_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
        self.id_by_external("units", external_id).await
    }

    async fn tenant_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
        self.id_by_external("tenants", external_id).await
    }

    async fn lease_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
        self.id_by_external("leases", external_id).await
    }

    async fn update_tenant_delinquency(
        &self,
        external_id: i64,
        amount_cents: i64,
        as_of: NaiveDate,
    ) -> HavenResult<UpsertOutcome> {
        let result = sqlx::query(
            "update tenants
             set delinquent_cents = $1, delinquency_as_of = $2, updated_at = $3
             where external_id = $4",
        )
        .bind(amount_cents)
        .bind(as_of)
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Tenant not synced yet; the delinquency row has nothing to land on
            return Ok(UpsertOutcome::Skipped);
        }
        Ok(UpsertOutcome::Updated)
    }
}
