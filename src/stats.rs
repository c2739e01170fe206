//! Stats Store (component B): a transactional counter store per (provider, model),
//! seeding and receiving live updates from the Load-Balancing Engine. All operations
//! fan through a single store-level async mutex guarding the in-memory cache so
//! window rollover + increment cannot race; the backing SQLite table is the
//! durable mirror, written after each in-memory update.

use crate::error::AppError;
use crate::models::domain::{Rule, Service, ServiceStats};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct StatsStore {
    pool: SqlitePool,
    cache: Mutex<HashMap<String, ServiceStats>>,
}

impl StatsStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS service_stats (
                service_id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                request_count INTEGER NOT NULL,
                last_used INTEGER,
                window_start INTEGER NOT NULL,
                window_request_count INTEGER NOT NULL,
                window_input_tokens INTEGER NOT NULL,
                window_output_tokens INTEGER NOT NULL,
                time_window INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let rows = sqlx::query("SELECT * FROM service_stats").fetch_all(&pool).await?;
        let mut cache = HashMap::new();
        for row in rows {
            let stats = row_to_stats(&row)?;
            cache.insert(stats.service_id.clone(), stats);
        }

        Ok(Self { pool, cache: Mutex::new(cache) })
    }

    /// Returns a snapshot copy of every tracked row; callers must not mutate it back
    /// into the store (reads never bypass `record_usage`/`update_from_service`).
    pub async fn snapshot(&self) -> HashMap<String, ServiceStats> {
        self.cache.lock().await.clone()
    }

    pub async fn get(&self, provider: Uuid, model: &str) -> Option<ServiceStats> {
        let key = format!("{}:{}", provider, model);
        self.cache.lock().await.get(&key).cloned()
    }

    /// Creates the row on first use, applies window rollover, then increments.
    pub async fn record_usage(
        &self,
        provider: Uuid,
        model: &str,
        time_window: u64,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<ServiceStats, AppError> {
        let key = format!("{}:{}", provider, model);
        let now = Utc::now();

        let stats = {
            let mut cache = self.cache.lock().await;
            let entry = cache
                .entry(key.clone())
                .or_insert_with(|| ServiceStats::new(key.clone(), time_window, now));
            entry.record_usage(input_tokens, output_tokens, now);
            entry.clone()
        };

        self.persist(provider, model, &stats).await?;
        Ok(stats)
    }

    /// For each service in each rule, inject stored stats or create the row with
    /// initial values. Idempotent; must run before the engine serves traffic.
    pub async fn hydrate_rules(&self, rules: &mut [Rule]) -> Result<(), AppError> {
        for rule in rules.iter_mut() {
            for service in rule.services.iter_mut() {
                let key = service.stats_key();
                let now = Utc::now();

                let stats = {
                    let mut cache = self.cache.lock().await;
                    cache
                        .entry(key.clone())
                        .or_insert_with(|| ServiceStats::new(key.clone(), service.time_window, now))
                        .clone()
                };

                self.persist(service.provider, &service.model, &stats).await?;
                service.stats = stats;
            }
        }
        Ok(())
    }

    /// Persists whatever is currently held in-memory for `service`.
    pub async fn update_from_service(&self, service: &Service) -> Result<(), AppError> {
        let key = service.stats_key();
        {
            let mut cache = self.cache.lock().await;
            cache.insert(key, service.stats.clone());
        }
        self.persist(service.provider, &service.model, &service.stats).await
    }

    pub async fn clear_all(&self) -> Result<(), AppError> {
        self.cache.lock().await.clear();
        sqlx::query("DELETE FROM service_stats").execute(&self.pool).await?;
        Ok(())
    }

    async fn persist(&self, provider: Uuid, model: &str, stats: &ServiceStats) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO service_stats
                (service_id, provider, model, request_count, last_used, window_start,
                 window_request_count, window_input_tokens, window_output_tokens, time_window)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(service_id) DO UPDATE SET
                request_count = excluded.request_count,
                last_used = excluded.last_used,
                window_start = excluded.window_start,
                window_request_count = excluded.window_request_count,
                window_input_tokens = excluded.window_input_tokens,
                window_output_tokens = excluded.window_output_tokens,
                time_window = excluded.time_window
            "#,
        )
        .bind(&stats.service_id)
        .bind(provider.to_string())
        .bind(model)
        .bind(stats.request_count as i64)
        .bind(stats.last_used.map(|t| t.timestamp_millis()))
        .bind(stats.window_start.timestamp_millis())
        .bind(stats.window_request_count as i64)
        .bind(stats.window_input_tokens as i64)
        .bind(stats.window_output_tokens as i64)
        .bind(stats.time_window as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_stats(row: &sqlx::sqlite::SqliteRow) -> Result<ServiceStats, AppError> {
    let last_used: Option<i64> = row.try_get("last_used")?;
    let window_start: i64 = row.try_get("window_start")?;

    Ok(ServiceStats {
        service_id: row.try_get("service_id")?,
        request_count: row.try_get::<i64, _>("request_count")? as u64,
        last_used: last_used.map(millis_to_datetime),
        window_start: millis_to_datetime(window_start),
        window_request_count: row.try_get::<i64, _>("window_request_count")? as u64,
        window_input_tokens: row.try_get::<i64, _>("window_input_tokens")? as u64,
        window_output_tokens: row.try_get::<i64, _>("window_output_tokens")? as u64,
        time_window: row.try_get::<i64, _>("time_window")? as u64,
    })
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}
