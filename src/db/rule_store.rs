//! SQLite-backed rule source and occurrence counter

use async_trait::async_trait;
use tracing::debug;

use crate::db::DbPool;
use crate::models::{
    AlertConfig, Group, Operator, Relation, RuleId, RuleRecord, RuleStatus, RuleSummary,
    SaveRuleRequest, Trigger, TriggerType,
};
use crate::services::dispatcher::OccurrenceCounter;
use crate::services::repository::RuleSource;
use crate::utils::{validate_save_request, AppError, AppResult};

/// Row returned from the rules table
#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: i64,
    name: String,
    status: String,
    occurrences: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    group_id: i64,
    parent_id: Option<i64>,
    relation: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TriggerRow {
    trigger_id: i64,
    group_id: i64,
    trigger_type: String,
    operator: String,
    value: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    alert_type: String,
    config: String,
}

/// Rule storage on a SQLite pool
#[derive(Clone)]
pub struct SqliteRuleStore {
    pool: DbPool,
}

impl SqliteRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Create or replace a rule with all of its records
    ///
    /// Returns the rule id. The caller notifies the repository that a rule was
    /// saved.
    pub async fn save_rule(&self, req: &SaveRuleRequest) -> AppResult<RuleId> {
        validate_save_request(req)?;

        let mut tx = self.pool.begin().await?;

        let id = match req.id {
            Some(id) => {
                let updated = sqlx::query(
                    r#"
                    UPDATE rules
                    SET name = ?, status = ?, updated_at = CURRENT_TIMESTAMP
                    WHERE id = ?
                    "#,
                )
                .bind(&req.name)
                .bind(req.status.as_str())
                .bind(id)
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    sqlx::query("INSERT INTO rules (id, name, status) VALUES (?, ?, ?)")
                        .bind(id)
                        .bind(&req.name)
                        .bind(req.status.as_str())
                        .execute(&mut *tx)
                        .await?;
                }

                for table in ["rule_groups", "rule_triggers", "rule_alerts"] {
                    sqlx::query(&format!("DELETE FROM {} WHERE rule_id = ?", table))
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }

                id
            }
            None => sqlx::query("INSERT INTO rules (name, status) VALUES (?, ?)")
                .bind(&req.name)
                .bind(req.status.as_str())
                .execute(&mut *tx)
                .await?
                .last_insert_rowid(),
        };

        for group in &req.record.groups {
            sqlx::query(
                "INSERT INTO rule_groups (rule_id, group_id, parent_id, relation) VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(group.id)
            .bind(group.parent)
            .bind(group.relation.as_str())
            .execute(&mut *tx)
            .await?;
        }

        for (position, trigger) in req.record.triggers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO rule_triggers
                    (rule_id, trigger_id, group_id, position, trigger_type, operator, value)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(trigger.id)
            .bind(trigger.group)
            .bind(position as i64)
            .bind(trigger.trigger_type.as_str())
            .bind(trigger.operator.to_string())
            .bind(serde_json::to_string(&trigger.value)?)
            .execute(&mut *tx)
            .await?;
        }

        for (position, alert) in req.record.alerts.iter().enumerate() {
            sqlx::query(
                "INSERT INTO rule_alerts (rule_id, position, alert_type, config) VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(position as i64)
            .bind(&alert.alert_type)
            .bind(serde_json::to_string(&alert.config)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            rule_id = id,
            triggers = req.record.triggers.len(),
            "Rule saved"
        );
        Ok(id)
    }

    /// Change a rule's status; returns false when the rule does not exist
    pub async fn set_status(&self, id: RuleId, status: RuleStatus) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE rules SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of recorded occurrences of a rule
    pub async fn occurrences(&self, id: RuleId) -> AppResult<Option<u64>> {
        let count: Option<i64> = sqlx::query_scalar("SELECT occurrences FROM rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(count.map(|c| c as u64))
    }

    /// All stored rules, ordered by id
    pub async fn list_rules(&self) -> AppResult<Vec<RuleSummary>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT id, name, status, occurrences FROM rules ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_summary).collect()
    }
}

fn row_to_summary(row: RuleRow) -> AppResult<RuleSummary> {
    let status = RuleStatus::from_str(&row.status).ok_or_else(|| {
        AppError::InvalidRecord(format!("Rule {} has unknown status {:?}", row.id, row.status))
    })?;

    Ok(RuleSummary {
        id: row.id,
        name: row.name,
        status,
        occurrences: row.occurrences as u64,
    })
}

fn row_to_group(row: GroupRow) -> AppResult<Group> {
    let relation = Relation::from_str(&row.relation).ok_or_else(|| {
        AppError::InvalidRecord(format!(
            "Group {} has unknown relation {:?}",
            row.group_id, row.relation
        ))
    })?;

    Ok(Group {
        id: row.group_id,
        parent: row.parent_id,
        relation,
    })
}

fn row_to_trigger(row: TriggerRow) -> AppResult<Trigger> {
    Ok(Trigger {
        id: row.trigger_id,
        group: row.group_id,
        trigger_type: TriggerType::parse(&row.trigger_type),
        operator: Operator::parse(&row.operator),
        value: serde_json::from_str(&row.value)?,
    })
}

fn row_to_alert(row: AlertRow) -> AppResult<AlertConfig> {
    Ok(AlertConfig {
        alert_type: row.alert_type,
        config: serde_json::from_str(&row.config)?,
    })
}

#[async_trait]
impl RuleSource for SqliteRuleStore {
    async fn list_active_rule_ids(&self) -> AppResult<Vec<RuleId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM rules WHERE status = ? ORDER BY id")
            .bind(RuleStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn get_rule(&self, id: RuleId) -> AppResult<Option<RuleRecord>> {
        // One transaction so a concurrent save is seen entirely or not at all
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let groups = sqlx::query_as::<_, GroupRow>(
            "SELECT group_id, parent_id, relation FROM rule_groups WHERE rule_id = ? ORDER BY group_id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let triggers = sqlx::query_as::<_, TriggerRow>(
            r#"
            SELECT trigger_id, group_id, trigger_type, operator, value
            FROM rule_triggers
            WHERE rule_id = ?
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let alerts = sqlx::query_as::<_, AlertRow>(
            "SELECT alert_type, config FROM rule_alerts WHERE rule_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(RuleRecord {
            triggers: triggers
                .into_iter()
                .map(row_to_trigger)
                .collect::<AppResult<_>>()?,
            groups: groups.into_iter().map(row_to_group).collect::<AppResult<_>>()?,
            alerts: alerts.into_iter().map(row_to_alert).collect::<AppResult<_>>()?,
        }))
    }
}

#[async_trait]
impl OccurrenceCounter for SqliteRuleStore {
    async fn increment(&self, rule_id: RuleId) -> AppResult<u64> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE rules SET occurrences = occurrences + 1 WHERE id = ? RETURNING occurrences",
        )
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await?;

        count
            .map(|c| c as u64)
            .ok_or_else(|| AppError::Storage(format!("Rule {} not found", rule_id)))
    }
}
