use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::vendors::models::{AnalysisStatus, NewVendor, Vendor, VendorDuplicateAnalysis};
use crate::vendors::repositories::{VendorAnalysisRepository, VendorRepository};
use haven_common::error::{HavenError, HavenResult};
use haven_common::types::UpsertOutcome;

const VENDOR_COLS: &str = "id, external_id, name, phone, email, address_line1, city, state, \
     is_active, canonical_vendor_id, raw_ref, created_at, updated_at";

#[derive(Clone)]
pub struct PgVendorRepository {
    pool: PgPool,
}

impl PgVendorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> HavenResult<Vendor> {
        Ok(Vendor {
            id: row.get("id"),
            external_id: row.get("external_id"),
            name: row.get("name"),
            phone: row.get("phone"),
            email: row.get("email"),
            address_line1: row.get("address_line1"),
            city: row.get("city"),
            state: row.get("state"),
            is_active: row.get("is_active"),
            canonical_vendor_id: row.get("canonical_vendor_id"),
            raw_ref: row.get("raw_ref"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Lock a vendor row and return (id, canonical_vendor_id).
    async fn lock_vendor(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> HavenResult<(Uuid, Option<Uuid>)> {
        let row = sqlx::query(
            "select id, canonical_vendor_id from vendors where id = $1 for update",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok((r.get("id"), r.get("canonical_vendor_id"))),
            None => Err(HavenError::NotFound(format!("vendor not found: {id}"))),
        }
    }
}

#[async_trait]
impl VendorRepository for PgVendorRepository {
    async fn upsert_vendor(&self, vendor: NewVendor) -> HavenResult<UpsertOutcome> {
        let row = sqlx::query(
            "insert into vendors
               (id, external_id, name, phone, email, address_line1, city, state, is_active, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             on conflict (external_id) do update set
               name = excluded.name,
               phone = excluded.phone,
               email = excluded.email,
               address_line1 = excluded.address_line1,
               city = excluded.city,
               state = excluded.state,
               is_active = excluded.is_active,
               raw_ref = excluded.raw_ref,
               updated_at = now()
             returning (xmax = 0) as inserted",
        )
        .bind(Uuid::new_v4())
        .bind(vendor.external_id)
        .bind(&vendor.name)
        .bind(&vendor.phone)
        .bind(&vendor.email)
        .bind(&vendor.address_line1)
        .bind(&vendor.city)
        .bind(&vendor.state)
        .bind(vendor.is_active)
        .bind(&vendor.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        let inserted: bool = row.get("inserted");
        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get(&self, id: Uuid) -> HavenResult<Option<Vendor>> {
        let row = sqlx::query(&format!("select {VENDOR_COLS} from vendors where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn vendor_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
        let row = sqlx::query("select id from vendors where external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get("id")))
    }

    async fn list_active(&self) -> HavenResult<Vec<Vendor>> {
        let rows = sqlx::query(&format!(
            "select {VENDOR_COLS} from vendors where is_active order by external_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn duplicates_of(&self, canonical_id: Uuid) -> HavenResult<Vec<Vendor>> {
        let rows = sqlx::query(&format!(
            "select {VENDOR_COLS} from vendors where canonical_vendor_id = $1 order by external_id"
        ))
        .bind(canonical_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn link_as_duplicate(&self, vendor_id: Uuid, canonical_id: Uuid) -> HavenResult<Uuid> {
        if vendor_id == canonical_id {
            return Err(HavenError::Validation(
                "a vendor cannot be linked to itself".to_string(),
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        // Lock in a stable order to avoid deadlock between concurrent links
        let (first, second) = if vendor_id < canonical_id {
            (vendor_id, canonical_id)
        } else {
            (canonical_id, vendor_id)
        };
        let a = Self::lock_vendor(&mut tx, first).await?;
        let b = Self::lock_vendor(&mut tx, second).await?;
        let (_, target_canonical) = if a.0 == canonical_id { a } else { b };

        // Resolve the target to its own canonical root; links stay depth 1
        let root = match target_canonical {
            Some(root_id) => {
                if root_id != vendor_id && root_id != canonical_id {
                    Self::lock_vendor(&mut tx, root_id).await?;
                }
                root_id
            }
            None => canonical_id,
        };

        if root == vendor_id {
            return Err(HavenError::Validation(format!(
                "linking {vendor_id} to {canonical_id} would create a cycle"
            )));
        }

        let now = Utc::now();
        sqlx::query("update vendors set canonical_vendor_id = $1, updated_at = $2 where id = $3")
            .bind(root)
            .bind(now)
            .bind(vendor_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        // Re-point this vendor's own duplicates so no chain survives
        sqlx::query(
            "update vendors set canonical_vendor_id = $1, updated_at = $2
             where canonical_vendor_id = $3",
        )
        .bind(root)
        .bind(now)
        .bind(vendor_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(root)
    }

    async fn unlink(&self, vendor_id: Uuid) -> HavenResult<()> {
        let result = sqlx::query(
            "update vendors set canonical_vendor_id = null, updated_at = $1
             where id = $2 and canonical_vendor_id is not null",
        )
        .bind(Utc::now())
        .bind(vendor_id)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(HavenError::NotFound(format!(
                "vendor {vendor_id} is not linked as a duplicate"
            )));
        }
        Ok(())
    }
}

const ANALYSIS_COLS: &str = "id, status, threshold, vendors_scanned, comparisons_made, \
     duplicates_found, results, error_message, started_at, finished_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgVendorAnalysisRepository {
    pool: PgPool,
}

impl PgVendorAnalysisRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> HavenResult<VendorDuplicateAnalysis> {
        let status_raw: String = row.get("status");
        Ok(VendorDuplicateAnalysis {
            id: row.get("id"),
            status: AnalysisStatus::from_str(&status_raw).map_err(HavenError::Internal)?,
            threshold: row.get("threshold"),
            vendors_scanned: row.get("vendors_scanned"),
            comparisons_made: row.get("comparisons_made"),
            duplicates_found: row.get("duplicates_found"),
            results: row.get("results"),
            error_message: row.get("error_message"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl VendorAnalysisRepository for PgVendorAnalysisRepository {
    async fn create(&self, threshold: f64) -> HavenResult<VendorDuplicateAnalysis> {
        let row = sqlx::query(&format!(
            "insert into vendor_duplicate_analyses (id, status, threshold, results)
             values ($1, 'pending', $2, '[]'::jsonb)
             returning {ANALYSIS_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(threshold)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn get(&self, id: Uuid) -> HavenResult<Option<VendorDuplicateAnalysis>> {
        let row = sqlx::query(&format!(
            "select {ANALYSIS_COLS} from vendor_duplicate_analyses where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn mark_processing(&self, id: Uuid) -> HavenResult<VendorDuplicateAnalysis> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "update vendor_duplicate_analyses
             set status = 'processing', started_at = $1, updated_at = $1
             where id = $2 and status = 'pending'
             returning {ANALYSIS_COLS}"
        ))
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(HavenError::Validation(format!(
                "analysis {id} is not pending"
            ))),
        }
    }

    async fn update_progress(
        &self,
        id: Uuid,
        vendors_scanned: i64,
        comparisons_made: i64,
        duplicates_found: i64,
    ) -> HavenResult<()> {
        sqlx::query(
            "update vendor_duplicate_analyses
             set vendors_scanned = $1, comparisons_made = $2, duplicates_found = $3, updated_at = $4
             where id = $5 and status = 'processing'",
        )
        .bind(vendors_scanned)
        .bind(comparisons_made)
        .bind(duplicates_found)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        results: serde_json::Value,
    ) -> HavenResult<VendorDuplicateAnalysis> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "update vendor_duplicate_analyses
             set status = 'completed', results = $1, finished_at = $2, updated_at = $2
             where id = $3 and status = 'processing'
             returning {ANALYSIS_COLS}"
        ))
        .bind(results)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(HavenError::Validation(format!(
                "analysis {id} is not processing"
            ))),
        }
    }

    async fn fail(&self, id: Uuid, message: &str) -> HavenResult<VendorDuplicateAnalysis> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "update vendor_duplicate_analyses
             set status = 'failed', error_message = $1, finished_at = $2, updated_at = $2
             where id = $3 and status = 'processing'
             returning {ANALYSIS_COLS}"
        ))
        .bind(message)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(HavenError::Validation(format!(
                "analysis {id} is not processing"
            ))),
        }
    }
}
