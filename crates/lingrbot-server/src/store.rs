use std::collections::HashMap;

use chrono::Utc;
use lingrbot_config::Store;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub nickname: String,
    pub count: i64,
}

impl CounterRecord {
    pub fn zero(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(CounterRecord),
    Absent,
}

impl Lookup {
    /// A nickname nobody has counted yet starts at zero.
    pub fn or_zero(self, nickname: &str) -> CounterRecord {
        match self {
            Lookup::Found(record) => record,
            Lookup::Absent => CounterRecord::zero(nickname),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    counters: HashMap<String, CounterRecord>,
}

pub struct SqliteStore {
    conn: Connection,
}

pub enum StoreBackend {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl StoreBackend {
    pub fn open(cfg: &Store) -> Result<Self, String> {
        if cfg.kind == "sqlite" {
            let sqlite_path = cfg
                .sqlite_path
                .as_deref()
                .ok_or_else(|| "store.sqlite_path is required for sqlite store".to_string())?;
            Ok(StoreBackend::Sqlite(SqliteStore::new(sqlite_path)?))
        } else {
            Ok(StoreBackend::Memory(MemoryStore::default()))
        }
    }

    pub fn get(&self, nickname: &str) -> Result<Lookup, StoreError> {
        match self {
            StoreBackend::Memory(store) => Ok(store
                .counters
                .get(nickname)
                .cloned()
                .map_or(Lookup::Absent, Lookup::Found)),
            StoreBackend::Sqlite(store) => store.get(nickname),
        }
    }

    pub fn put(&mut self, record: &CounterRecord) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(store) => {
                store
                    .counters
                    .insert(record.nickname.clone(), record.clone());
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.put(record),
        }
    }
}

impl SqliteStore {
    fn new(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS counters (
                nickname TEXT PRIMARY KEY,
                count INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| e.to_string())?;
        Ok(Self { conn })
    }

    fn get(&self, nickname: &str) -> Result<Lookup, StoreError> {
        let count: Option<i64> = self
            .conn
            .query_row(
                "SELECT count FROM counters WHERE nickname = ?1",
                params![nickname],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match count {
            Some(count) => Lookup::Found(CounterRecord {
                nickname: nickname.to_string(),
                count,
            }),
            None => Lookup::Absent,
        })
    }

    fn put(&mut self, record: &CounterRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "
            INSERT INTO counters (nickname, count, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(nickname) DO UPDATE SET
                count=excluded.count,
                updated_at=excluded.updated_at
            ",
            params![record.nickname, record.count, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_db() -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("lingrbot-store-{nanos}.db"))
            .to_string_lossy()
            .to_string()
    }

    fn exercise(store: &mut StoreBackend) {
        assert_eq!(store.get("mattn").unwrap(), Lookup::Absent);

        let mut record = store.get("mattn").unwrap().or_zero("mattn");
        record.count += 3;
        store.put(&record).unwrap();
        assert_eq!(
            store.get("mattn").unwrap(),
            Lookup::Found(CounterRecord {
                nickname: "mattn".to_string(),
                count: 3
            })
        );

        record.count -= 5;
        store.put(&record).unwrap();
        assert_eq!(store.get("mattn").unwrap().or_zero("mattn").count, -2);
        assert_eq!(store.get("other").unwrap(), Lookup::Absent);
    }

    #[test]
    fn memory_round_trip() {
        let mut store = StoreBackend::Memory(MemoryStore::default());
        exercise(&mut store);
    }

    #[test]
    fn sqlite_round_trip() {
        let cfg = Store {
            kind: "sqlite".to_string(),
            sqlite_path: Some(temp_db()),
        };
        let mut store = StoreBackend::open(&cfg).unwrap();
        exercise(&mut store);
    }

    #[test]
    fn sqlite_survives_reopen() {
        let cfg = Store {
            kind: "sqlite".to_string(),
            sqlite_path: Some(temp_db()),
        };
        {
            let mut store = StoreBackend::open(&cfg).unwrap();
            store.put(&CounterRecord {
                nickname: "foo".to_string(),
                count: 7,
            })
            .unwrap();
        }
        let store = StoreBackend::open(&cfg).unwrap();
        assert_eq!(store.get("foo").unwrap().or_zero("foo").count, 7);
    }
}
