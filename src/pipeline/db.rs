//! Record store traits and the SQLite implementation
//!
//! Tables (see `/sql/`):
//! - `price_records` - one row per (symbol, epoch_id, address), bounded per symbol
//! - `epoch_snapshots` - UPSERT on epoch_id
//! - `auto_claim_subscribers` - UPSERT / DELETE on address
//!
//! Wei amounts are stored as decimal TEXT; SQLite integers stop at i64.

use super::types::{AutoClaimSubscriber, Classification, EpochSnapshot, PriceRecord, Wei};
use super::window::SlidingWindow;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Per-symbol window of classified price records
#[async_trait]
pub trait PriceRecordStore: Send + Sync {
    /// Upsert all records of one (symbol, epoch) and trim the symbol to `capacity` epochs
    ///
    /// Runs as a single transaction. Returns the evicted epoch ids, oldest first.
    async fn upsert_epoch_records(
        &self,
        symbol: &str,
        epoch_id: u64,
        records: &[PriceRecord],
        capacity: usize,
    ) -> Result<Vec<u64>, StoreError>;

    async fn load_window(&self, symbol: &str, capacity: usize) -> Result<SlidingWindow, StoreError>;
}

/// End-of-round reward snapshots keyed by reward epoch
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn upsert_snapshot(&self, snapshot: &EpochSnapshot) -> Result<(), StoreError>;

    async fn get_snapshot(&self, epoch_id: u64) -> Result<Option<EpochSnapshot>, StoreError>;
}

/// Auto-claim subscribers keyed by lower-cased address
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn upsert_subscriber(&self, subscriber: &AutoClaimSubscriber) -> Result<(), StoreError>;

    /// Returns whether a row was deleted
    async fn remove_subscriber(&self, address: &str) -> Result<bool, StoreError>;

    async fn get_subscriber(&self, address: &str) -> Result<Option<AutoClaimSubscriber>, StoreError>;

    async fn list_subscribers(&self) -> Result<Vec<AutoClaimSubscriber>, StoreError>;
}

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir` in filename order and executes them.
/// Every file must use `IF NOT EXISTS` so reruns are no-ops.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<(), StoreError> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(format!("Schema directory not found: {}", schema_dir).into());
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("📊 Enabled WAL mode for SQLite database");

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort();

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for path in sql_files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::info!("   ├─ Executing: {}", filename);
        conn.execute_batch(&fs::read_to_string(&path)?)?;
    }

    log::info!("   └─ ✅ All schema migrations completed");

    Ok(())
}

fn wei_map_to_json(map: &BTreeMap<String, Wei>) -> Result<String, StoreError> {
    let as_strings: BTreeMap<&str, String> = map.iter().map(|(k, v)| (k.as_str(), v.to_string())).collect();
    Ok(serde_json::to_string(&as_strings)?)
}

fn wei_map_from_json(raw: &str) -> Result<BTreeMap<String, Wei>, StoreError> {
    let as_strings: BTreeMap<String, String> = serde_json::from_str(raw)?;
    as_strings
        .into_iter()
        .map(|(k, v)| -> Result<(String, Wei), StoreError> {
            let amount = v.parse::<Wei>().map_err(|e| format!("invalid amount '{}' for {}: {}", v, k, e))?;
            Ok((k, amount))
        })
        .collect()
}

fn parse_u128(raw: &str) -> Result<u128, StoreError> {
    raw.parse::<u128>()
        .map_err(|e| format!("invalid stored integer '{}': {}", raw, e).into())
}

/// SQLite-backed record store
///
/// One connection behind a mutex; every method holds the lock only for its
/// synchronous statements.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database and apply migrations from `schema_dir`
    pub fn open(db_path: &str, schema_dir: &str) -> Result<Self, StoreError> {
        let mut conn = Connection::open(db_path)?;
        run_schema_migrations(&mut conn, schema_dir)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| "SQLite connection mutex poisoned".into())
    }
}

#[async_trait]
impl PriceRecordStore for SqliteStore {
    async fn upsert_epoch_records(
        &self,
        symbol: &str,
        epoch_id: u64,
        records: &[PriceRecord],
        capacity: usize,
    ) -> Result<Vec<u64>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().timestamp();

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO price_records (
                    symbol, epoch_id, address, submitted_price,
                    median_price, low_bound, high_bound, classification, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(symbol, epoch_id, address) DO UPDATE SET
                    submitted_price = excluded.submitted_price,
                    median_price = excluded.median_price,
                    low_bound = excluded.low_bound,
                    high_bound = excluded.high_bound,
                    classification = excluded.classification,
                    recorded_at = excluded.recorded_at
                "#,
            )?;

            for record in records {
                stmt.execute(params![
                    symbol,
                    epoch_id as i64,
                    record.address,
                    record.submitted_price.map(|p| p.to_string()),
                    record.median_price.to_string(),
                    record.low_bound.to_string(),
                    record.high_bound.to_string(),
                    record.classification.value(),
                    now,
                ])?;
            }
        }

        let mut evicted: Vec<u64> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT epoch_id FROM price_records
                 WHERE symbol = ?1
                 ORDER BY epoch_id DESC
                 LIMIT -1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![symbol, capacity as i64], |row| row.get::<_, i64>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|id| id as u64)
                .collect()
        };

        for old_epoch in &evicted {
            tx.execute(
                "DELETE FROM price_records WHERE symbol = ?1 AND epoch_id = ?2",
                params![symbol, *old_epoch as i64],
            )?;
        }

        tx.commit()?;

        evicted.sort_unstable();
        Ok(evicted)
    }

    async fn load_window(&self, symbol: &str, capacity: usize) -> Result<SlidingWindow, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT epoch_id, address, submitted_price, median_price, low_bound, high_bound, classification
             FROM price_records
             WHERE symbol = ?1
             ORDER BY epoch_id ASC",
        )?;

        let rows = stmt.query_map(params![symbol], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, f64>(6)?,
            ))
        })?;

        let mut window = SlidingWindow::new(symbol, capacity);
        for row in rows {
            let (epoch_id, address, submitted, median, low, high, classification) = row?;
            let classification = Classification::from_value(classification)
                .ok_or_else(|| format!("invalid classification {} for {} in epoch {}", classification, address, epoch_id))?;

            window.upsert(PriceRecord {
                epoch_id: epoch_id as u64,
                address,
                submitted_price: submitted.as_deref().map(parse_u128).transpose()?,
                median_price: parse_u128(&median)?,
                low_bound: parse_u128(&low)?,
                high_bound: parse_u128(&high)?,
                classification,
            });
        }

        Ok(window)
    }
}

#[async_trait]
impl SnapshotRepository for SqliteStore {
    async fn upsert_snapshot(&self, snapshot: &EpochSnapshot) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO epoch_snapshots (
                epoch_id, current_epoch_reward, total_epoch_reward, vote_power, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(epoch_id) DO UPDATE SET
                current_epoch_reward = excluded.current_epoch_reward,
                total_epoch_reward = excluded.total_epoch_reward,
                vote_power = excluded.vote_power,
                updated_at = excluded.updated_at
            "#,
            params![
                snapshot.epoch_id as i64,
                wei_map_to_json(&snapshot.current_epoch_reward)?,
                wei_map_to_json(&snapshot.total_epoch_reward)?,
                wei_map_to_json(&snapshot.vote_power)?,
                chrono::Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    async fn get_snapshot(&self, epoch_id: u64) -> Result<Option<EpochSnapshot>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT current_epoch_reward, total_epoch_reward, vote_power
                 FROM epoch_snapshots WHERE epoch_id = ?1",
                params![epoch_id as i64],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;

        match row {
            Some((current, total, vote_power)) => Ok(Some(EpochSnapshot {
                epoch_id,
                current_epoch_reward: wei_map_from_json(&current)?,
                total_epoch_reward: wei_map_from_json(&total)?,
                vote_power: wei_map_from_json(&vote_power)?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SubscriberRepository for SqliteStore {
    async fn upsert_subscriber(&self, subscriber: &AutoClaimSubscriber) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO auto_claim_subscribers (address, executor, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(address) DO UPDATE SET executor = excluded.executor
            "#,
            params![subscriber.address, subscriber.executor, subscriber.created_at],
        )?;
        Ok(())
    }

    async fn remove_subscriber(&self, address: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM auto_claim_subscribers WHERE address = ?1", params![address])?;
        Ok(deleted > 0)
    }

    async fn get_subscriber(&self, address: &str) -> Result<Option<AutoClaimSubscriber>, StoreError> {
        let conn = self.lock()?;
        let subscriber = conn
            .query_row(
                "SELECT address, executor, created_at FROM auto_claim_subscribers WHERE address = ?1",
                params![address],
                |row| {
                    Ok(AutoClaimSubscriber {
                        address: row.get(0)?,
                        executor: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(subscriber)
    }

    async fn list_subscribers(&self) -> Result<Vec<AutoClaimSubscriber>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT address, executor, created_at FROM auto_claim_subscribers ORDER BY address",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AutoClaimSubscriber {
                address: row.get(0)?,
                executor: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
