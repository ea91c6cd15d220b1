//! # Business Repository
//!
//! Database operations for businesses and their fee policies.

use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use gala_core::types::Business;

/// Repository for business database operations.
#[derive(Debug, Clone)]
pub struct BusinessRepository {
    pool: SqlitePool,
}

impl BusinessRepository {
    /// Creates a new BusinessRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BusinessRepository { pool }
    }

    /// Inserts a business.
    pub async fn insert(&self, business: &Business) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO businesses (
                id, name, fee_type, flat_fee_cents, fee_rate_bps, tax_rate_bps,
                platform_fee_payer, processor_fee_payer, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&business.id)
        .bind(&business.name)
        .bind(business.fee_type)
        .bind(business.flat_fee_cents)
        .bind(business.fee_rate_bps)
        .bind(business.tax_rate_bps)
        .bind(business.platform_fee_payer)
        .bind(business.processor_fee_payer)
        .bind(business.created_at)
        .bind(business.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a business by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Business>> {
        let business = sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(business)
    }

    /// Gets a business by ID, erroring when absent.
    pub async fn require(&self, id: &str) -> DbResult<Business> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Business", id))
    }

    /// Updates a business's fee policy fields.
    pub async fn update_fee_policy(&self, business: &Business) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE businesses SET
                fee_type = ?2,
                flat_fee_cents = ?3,
                fee_rate_bps = ?4,
                tax_rate_bps = ?5,
                platform_fee_payer = ?6,
                processor_fee_payer = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&business.id)
        .bind(business.fee_type)
        .bind(business.flat_fee_cents)
        .bind(business.fee_rate_bps)
        .bind(business.tax_rate_bps)
        .bind(business.platform_fee_payer)
        .bind(business.processor_fee_payer)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Business", &business.id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use gala_core::fees::{FeeKind, FeePayer};

    #[tokio::test]
    async fn test_round_trip_and_fee_config() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let business = Business {
            id: "biz-1".to_string(),
            name: "The Blue Room".to_string(),
            fee_type: FeeKind::HigherOfBoth,
            flat_fee_cents: 200,
            fee_rate_bps: 300,
            tax_rate_bps: 825,
            platform_fee_payer: FeePayer::Customer,
            processor_fee_payer: FeePayer::Business,
            created_at: now,
            updated_at: now,
        };
        db.businesses().insert(&business).await.unwrap();

        let loaded = db.businesses().require("biz-1").await.unwrap();
        assert_eq!(loaded.fee_type, FeeKind::HigherOfBoth);
        assert_eq!(loaded.platform_fee_payer, FeePayer::Customer);

        let config = loaded.fee_config();
        assert_eq!(config.tax_rate.bps(), 825);
        assert_eq!(config.policy.flat.cents(), 200);
    }
}
