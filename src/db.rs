// 🗃️ SQLite Storage - Aggregates, rules and rule stats in one database
// Implements AggregateProvider, RuleStore and RuleStatsStore over rusqlite

use crate::aggregates::{AggregateProvider, ACTIVE_USER_THRESHOLD};
use crate::query::DynamicRuleQuery;
use crate::rules::DynamicRule;
use crate::store::{RuleStat, RuleStatsStore, RuleStore};
use crate::taxonomy::{ProductType, TransactionType};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Needed for ON DELETE CASCADE from rules to queries and stats
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Banking data (read by the aggregate queries)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            type TEXT NOT NULL,
            amount INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Dynamic rules
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS dynamic_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            product_text TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS dynamic_rule_queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_id INTEGER NOT NULL REFERENCES dynamic_rules(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            query TEXT NOT NULL,
            arguments TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rule_stats (
            rule_id INTEGER PRIMARY KEY REFERENCES dynamic_rules(id) ON DELETE CASCADE,
            count INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_product ON transactions(product_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rule_queries_rule
         ON dynamic_rule_queries(rule_id, position)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// IMPORT RECORDS (CSV rows)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: i64,
}

// ============================================================================
// DATABASE
// ============================================================================

/// Shared SQLite handle; cheap to clone
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    // ------------------------------------------------------------------------
    // Banking data
    // ------------------------------------------------------------------------

    /// Returns false when a user with this id already exists
    pub fn insert_user(&self, user: &UserRecord) -> Result<bool> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO users (id, username, first_name, last_name)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id.to_string(),
                user.username,
                user.first_name,
                user.last_name
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn insert_product(&self, product: &ProductRecord) -> Result<bool> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO products (id, type, name) VALUES (?1, ?2, ?3)",
            params![
                product.id.to_string(),
                product.product_type.as_str(),
                product.name
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn insert_transaction(&self, tx: &TransactionRecord) -> Result<bool> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO transactions (id, product_id, user_id, type, amount)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tx.id.to_string(),
                tx.product_id.to_string(),
                tx.user_id.to_string(),
                tx.transaction_type.as_str(),
                tx.amount
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn import_users(&self, csv_path: &Path) -> Result<usize> {
        import_csv(csv_path, |record: UserRecord| self.insert_user(&record))
    }

    pub fn import_products(&self, csv_path: &Path) -> Result<usize> {
        import_csv(csv_path, |record: ProductRecord| self.insert_product(&record))
    }

    pub fn import_transactions(&self, csv_path: &Path) -> Result<usize> {
        import_csv(csv_path, |record: TransactionRecord| {
            self.insert_transaction(&record)
        })
    }

    /// "First Last" for a login name, if the user exists
    pub fn full_name(&self, user_name: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let name = conn
            .query_row(
                "SELECT first_name, last_name FROM users WHERE username = ?1",
                params![user_name],
                |row| Ok(format!("{} {}", row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(name.map(|n| n.trim().to_string()))
    }

    fn transaction_count(&self, user_id: Uuid, product_type: ProductType) -> Result<i64> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(t.amount) FROM transactions t
             JOIN products p ON t.product_id = p.id
             WHERE t.user_id = ?1 AND p.type = ?2",
            params![user_id.to_string(), product_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Deserialize every row and insert it; returns the number of new rows
fn import_csv<T, F>(csv_path: &Path, mut insert: F) -> Result<usize>
where
    T: for<'de> Deserialize<'de>,
    F: FnMut(T) -> Result<bool>,
{
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;

    let mut inserted = 0;
    let mut duplicates = 0;
    for (line, result) in rdr.deserialize().enumerate() {
        let record: T = result.with_context(|| {
            format!("Failed to deserialize row {} of {:?}", line + 1, csv_path)
        })?;
        if insert(record)? {
            inserted += 1;
        } else {
            duplicates += 1;
        }
    }

    tracing::info!(path = ?csv_path, inserted, duplicates, "csv import finished");
    Ok(inserted)
}

// ============================================================================
// AGGREGATES
// ============================================================================

impl AggregateProvider for Database {
    fn uses_product_of_type(&self, user_id: Uuid, product_type: ProductType) -> Result<bool> {
        Ok(self.transaction_count(user_id, product_type)? > 0)
    }

    fn is_active_user_of_product(&self, product_type: ProductType, user_id: Uuid) -> Result<bool> {
        Ok(self.transaction_count(user_id, product_type)? >= ACTIVE_USER_THRESHOLD)
    }

    fn sum_transactions(
        &self,
        product_type: ProductType,
        transaction_type: TransactionType,
        user_id: Uuid,
    ) -> Result<i64> {
        let sum = self.conn()?.query_row(
            "SELECT COALESCE(SUM(t.amount), 0) FROM transactions t
             JOIN products p ON t.product_id = p.id
             WHERE t.user_id = ?1 AND p.type = ?2 AND t.type = ?3",
            params![
                user_id.to_string(),
                product_type.as_str(),
                transaction_type.as_str()
            ],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    fn resolve_user_id(&self, user_name: &str) -> Result<Option<Uuid>> {
        let id: Option<String> = self
            .conn()?
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![user_name],
                |row| row.get(0),
            )
            .optional()?;

        id.map(|s| {
            Uuid::parse_str(&s).with_context(|| format!("Corrupt user id in database: {}", s))
        })
        .transpose()
    }
}

// ============================================================================
// RULE STORE
// ============================================================================

impl RuleStore for Database {
    fn find_all(&self) -> Result<Vec<DynamicRule>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, product_id, product_name, product_text
             FROM dynamic_rules
             ORDER BY id",
        )?;
        let mut rules: BTreeMap<i64, DynamicRule> = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                Ok((
                    id,
                    DynamicRule {
                        id: Some(id),
                        product_id: row.get(1)?,
                        product_name: row.get(2)?,
                        product_text: row.get(3)?,
                        queries: Vec::new(),
                    },
                ))
            })?
            .collect::<Result<_, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT rule_id, query, arguments
             FROM dynamic_rule_queries
             ORDER BY rule_id, position",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (rule_id, query, arguments_json) in rows {
            let arguments: Vec<String> = serde_json::from_str(&arguments_json)
                .with_context(|| format!("Corrupt arguments for rule {}", rule_id))?;
            if let Some(rule) = rules.get_mut(&rule_id) {
                rule.queries.push(DynamicRuleQuery { query, arguments });
            }
        }

        Ok(rules.into_values().collect())
    }

    fn exists(&self, id: i64) -> Result<bool> {
        let exists = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM dynamic_rules WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn save(&self, mut rule: DynamicRule) -> Result<DynamicRule> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO dynamic_rules (product_id, product_name, product_text)
             VALUES (?1, ?2, ?3)",
            params![rule.product_id, rule.product_name, rule.product_text],
        )?;
        let id = tx.last_insert_rowid();

        for (position, query) in rule.queries.iter().enumerate() {
            tx.execute(
                "INSERT INTO dynamic_rule_queries (rule_id, position, query, arguments)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id,
                    position as i64,
                    query.query,
                    serde_json::to_string(&query.arguments)?
                ],
            )?;
        }

        tx.commit()?;
        rule.id = Some(id);
        Ok(rule)
    }

    fn delete_by_id(&self, id: i64) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM dynamic_rules WHERE id = ?1", params![id])?;
        Ok(())
    }
}

// ============================================================================
// RULE STATS
// ============================================================================

impl RuleStatsStore for Database {
    fn init_count(&self, rule_id: i64) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO rule_stats (rule_id, count) VALUES (?1, 0)
             ON CONFLICT(rule_id) DO UPDATE SET count = 0",
            params![rule_id],
        )?;
        Ok(())
    }

    fn increment_match_count(&self, rule_id: i64) -> Result<()> {
        // single statement: concurrent increments cannot interleave
        self.conn()?.execute(
            "INSERT INTO rule_stats (rule_id, count) VALUES (?1, 1)
             ON CONFLICT(rule_id) DO UPDATE SET count = count + 1",
            params![rule_id],
        )?;
        Ok(())
    }

    fn delete_count(&self, rule_id: i64) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM rule_stats WHERE rule_id = ?1", params![rule_id])?;
        Ok(())
    }

    fn all_counts(&self) -> Result<Vec<RuleStat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT rule_id, count FROM rule_stats ORDER BY rule_id")?;
        let stats = stmt
            .query_map([], |row| {
                Ok(RuleStat {
                    rule_id: row.get(0)?,
                    count: row.get::<_, i64>(1)?.max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}

// ============================================================================
// TESTS
// ============================================================================
