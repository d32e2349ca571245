use crate::{ClinicResult, Principal, Role};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// A browser push subscription registered by a patient or staff member.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredSubscription {
    pub id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct PushSubscriptionService {
    pool: PgPool,
}

impl PushSubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registers a subscription. An endpoint is unique across the system; registering a
    /// known endpoint moves it to `owner` and refreshes its keys.
    pub async fn upsert(
        &self,
        owner: &Principal,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> ClinicResult<StoredSubscription> {
        Ok(sqlx::query_as::<_, StoredSubscription>(
            "INSERT INTO push_subscriptions (id, clinic_id, owner_role, owner_id, endpoint, p256dh, auth)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (endpoint) DO UPDATE SET
                 clinic_id = EXCLUDED.clinic_id,
                 owner_role = EXCLUDED.owner_role,
                 owner_id = EXCLUDED.owner_id,
                 p256dh = EXCLUDED.p256dh,
                 auth = EXCLUDED.auth
             RETURNING id, endpoint, p256dh, auth, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(owner.clinic_id)
        .bind(owner.role.as_str())
        .bind(owner.id)
        .bind(endpoint)
        .bind(p256dh)
        .bind(auth)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Removes the owner's subscription for `endpoint`; returns whether one existed.
    pub async fn remove(&self, owner: &Principal, endpoint: &str) -> ClinicResult<bool> {
        let result = sqlx::query(
            "DELETE FROM push_subscriptions
             WHERE owner_role = $1 AND owner_id = $2 AND endpoint = $3",
        )
        .bind(owner.role.as_str())
        .bind(owner.id)
        .bind(endpoint)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn for_owner(&self, role: Role, owner_id: Uuid) -> ClinicResult<Vec<StoredSubscription>> {
        Ok(sqlx::query_as::<_, StoredSubscription>(
            "SELECT id, endpoint, p256dh, auth, created_at FROM push_subscriptions
             WHERE owner_role = $1 AND owner_id = $2
             ORDER BY created_at",
        )
        .bind(role.as_str())
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Drops a subscription the push service reported as gone.
    pub async fn prune(&self, id: Uuid) -> ClinicResult<()> {
        sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::debug!(subscription_id = %id, "stale push subscription pruned");
        Ok(())
    }
}
