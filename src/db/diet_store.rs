use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::StoreError;
use crate::models::{
    Baseline, DietRecord, LocalDiet, LocalStamp, MealItem, MealType, RemoteDiet, RemoteStamp,
};

/// On-device store for diet records, one per user.
///
/// A save replaces the record, its stamps and its sync state in a single
/// transaction: readers see either the previous version or the new one.
#[derive(Debug, Clone)]
pub struct DietStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DietRow {
    id: String,
    local_updated_at_ms: i64,
    baseline_local_ms: Option<i64>,
    baseline_remote_at: Option<String>,
    sync_state: String,
    conflict_remote_json: Option<String>,
    conflict_remote_at: Option<String>,
}

#[derive(sqlx::FromRow)]
struct MealTypeRow {
    id: String,
    name: String,
    icon: String,
    color: String,
    display_order: i32,
}

#[derive(sqlx::FromRow)]
struct MealItemRow {
    id: String,
    meal_type_id: String,
    food_ref: String,
    quantity: f64,
    unit: String,
}

impl DietStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reads the record and its sync bookkeeping from one snapshot.
    pub async fn load(&self, user_id: &str) -> Result<Option<LocalDiet>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<DietRow> = sqlx::query_as(
            r#"
            SELECT id, local_updated_at_ms, baseline_local_ms, baseline_remote_at,
                   sync_state, conflict_remote_json, conflict_remote_at
            FROM diets WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let diet = match row {
            Some(row) => Some(Self::hydrate(&mut *tx, user_id, row).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(diet)
    }

    /// Loads only the record, for consumers that do not care about sync state.
    pub async fn load_record(&self, user_id: &str) -> Result<Option<DietRecord>, StoreError> {
        Ok(self.load(user_id).await?.map(|diet| diet.record))
    }

    pub async fn save(&self, user_id: &str, diet: &LocalDiet) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let (conflict_json, conflict_at) = match &diet.conflict {
            Some(remote) => (
                Some(serde_json::to_string(&remote.record).map_err(|e| corrupt(user_id, e))?),
                Some(remote.stamp.to_string()),
            ),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO diets (user_id, id, local_updated_at_ms, baseline_local_ms,
                               baseline_remote_at, sync_state, conflict_remote_json, conflict_remote_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                id = excluded.id,
                local_updated_at_ms = excluded.local_updated_at_ms,
                baseline_local_ms = excluded.baseline_local_ms,
                baseline_remote_at = excluded.baseline_remote_at,
                sync_state = excluded.sync_state,
                conflict_remote_json = excluded.conflict_remote_json,
                conflict_remote_at = excluded.conflict_remote_at
            "#,
        )
        .bind(user_id)
        .bind(diet.record.id.to_string())
        .bind(diet.local_stamp.millis())
        .bind(diet.baseline.local.map(LocalStamp::millis))
        .bind(diet.baseline.remote.map(|stamp| stamp.to_string()))
        .bind(diet.state.durable().as_str())
        .bind(conflict_json)
        .bind(conflict_at)
        .execute(&mut *tx)
        .await?;

        // Replace meal types and items
        sqlx::query("DELETE FROM meal_types WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM meal_items WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for (position, meal_type) in diet.record.meal_types.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO meal_types (user_id, id, position, name, icon, color, display_order)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(meal_type.id.to_string())
            .bind(position as i64)
            .bind(&meal_type.name)
            .bind(&meal_type.icon)
            .bind(meal_type.color.to_string())
            .bind(meal_type.display_order)
            .execute(&mut *tx)
            .await?;
        }

        for (position, item) in diet.record.meal_items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO meal_items (user_id, id, position, meal_type_id, food_ref, quantity, unit)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(item.id.to_string())
            .bind(position as i64)
            .bind(item.meal_type_id.to_string())
            .bind(&item.food_ref)
            .bind(item.quantity)
            .bind(&item.unit)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            user_id,
            state = %diet.state.durable(),
            local_stamp = %diet.local_stamp,
            "Saved diet record"
        );

        Ok(())
    }

    async fn hydrate(
        conn: &mut SqliteConnection,
        user_id: &str,
        row: DietRow,
    ) -> Result<LocalDiet, StoreError> {
        let meal_types: Vec<MealTypeRow> = sqlx::query_as(
            "SELECT id, name, icon, color, display_order FROM meal_types WHERE user_id = ? ORDER BY position",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        let meal_items: Vec<MealItemRow> = sqlx::query_as(
            "SELECT id, meal_type_id, food_ref, quantity, unit FROM meal_items WHERE user_id = ? ORDER BY position",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        let record = DietRecord {
            id: parse_uuid(user_id, &row.id)?,
            meal_types: meal_types
                .into_iter()
                .map(|m| -> Result<MealType, StoreError> {
                    Ok(MealType {
                        id: parse_uuid(user_id, &m.id)?,
                        name: m.name,
                        icon: m.icon,
                        color: m.color.parse().map_err(|e| corrupt(user_id, e))?,
                        display_order: m.display_order,
                    })
                })
                .collect::<Result<_, _>>()?,
            meal_items: meal_items
                .into_iter()
                .map(|i| -> Result<MealItem, StoreError> {
                    Ok(MealItem {
                        id: parse_uuid(user_id, &i.id)?,
                        meal_type_id: parse_uuid(user_id, &i.meal_type_id)?,
                        food_ref: i.food_ref,
                        quantity: i.quantity,
                        unit: i.unit,
                    })
                })
                .collect::<Result<_, _>>()?,
        };

        let conflict = match (row.conflict_remote_json, row.conflict_remote_at) {
            (Some(json), Some(at)) => Some(RemoteDiet {
                record: serde_json::from_str(&json).map_err(|e| corrupt(user_id, e))?,
                stamp: parse_remote_stamp(user_id, &at)?,
            }),
            _ => None,
        };

        Ok(LocalDiet {
            record,
            local_stamp: LocalStamp(row.local_updated_at_ms),
            baseline: Baseline {
                local: row.baseline_local_ms.map(LocalStamp),
                remote: row
                    .baseline_remote_at
                    .as_deref()
                    .map(|at| parse_remote_stamp(user_id, at))
                    .transpose()?,
            },
            state: row.sync_state.parse().map_err(|e| corrupt(user_id, e))?,
            conflict,
        })
    }
}

fn corrupt(user_id: &str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        user_id: user_id.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_uuid(user_id: &str, value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| corrupt(user_id, e))
}

fn parse_remote_stamp(user_id: &str, value: &str) -> Result<RemoteStamp, StoreError> {
    value.parse().map_err(|e| corrupt(user_id, e))
}
