//! # Promo Code Repository
//!
//! Lookup and atomic usage counting for discount codes.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use gala_core::types::PromoCode;

/// Repository for promo code operations.
#[derive(Debug, Clone)]
pub struct PromoRepository {
    pool: SqlitePool,
}

impl PromoRepository {
    /// Creates a new PromoRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PromoRepository { pool }
    }

    /// Inserts a promo code.
    pub async fn insert(&self, promo: &PromoCode) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO promo_codes (
                id, business_id, code, kind, value, usage_count, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&promo.id)
        .bind(&promo.business_id)
        .bind(&promo.code)
        .bind(promo.kind)
        .bind(promo.value)
        .bind(promo.usage_count)
        .bind(promo.is_active)
        .bind(promo.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Looks up an active code for a business.
    pub async fn get_active(&self, business_id: &str, code: &str) -> DbResult<Option<PromoCode>> {
        let promo = sqlx::query_as::<_, PromoCode>(
            "SELECT * FROM promo_codes WHERE business_id = ?1 AND code = ?2 AND is_active = 1",
        )
        .bind(business_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(promo)
    }

    /// Increments a code's usage count in a single atomic statement.
    pub async fn increment_usage(&self, business_id: &str, code: &str) -> DbResult<()> {
        debug!(business_id = %business_id, code = %code, "Incrementing promo usage");

        let result = sqlx::query(
            "UPDATE promo_codes SET usage_count = usage_count + 1 \
             WHERE business_id = ?1 AND code = ?2",
        )
        .bind(business_id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promo code", code));
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
    use gala_core::types::PromoKind;

    #[tokio::test]
    async fn test_usage_increment() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO businesses (id, name, created_at, updated_at) VALUES ('biz-1', 'Venue', ?1, ?1)",
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let promos = db.promos();
        promos
            .insert(&PromoCode {
                id: "promo-1".to_string(),
                business_id: "biz-1".to_string(),
                code: "EARLYBIRD".to_string(),
                kind: PromoKind::Fixed,
                value: 500,
                usage_count: 0,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        promos.increment_usage("biz-1", "EARLYBIRD").await.unwrap();
        promos.increment_usage("biz-1", "EARLYBIRD").await.unwrap();

        let promo = promos.get_active("biz-1", "EARLYBIRD").await.unwrap().unwrap();
        assert_eq!(promo.usage_count, 2);

        assert!(promos.increment_usage("biz-1", "NOPE").await.is_err());
        assert!(promos.get_active("biz-1", "NOPE").await.unwrap().is_none());
    }
}
