//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. Rows of every table carry a
//! `box_id`, so several boxes can live in one database file and share one
//! connection.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use mailsync_core::{Channel, EndpointName, Label, Packet, PacketHeader, SeqNumber};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{PacketTx, Store};

/// How long a writer waits for another connection's lock on the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. Transactions are `IMMEDIATE`, so the
/// write lock is taken up front and a read-check-write body cannot lose a
/// race against another connection to the same file.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    box_id: String,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>, box_id: impl Into<String>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            box_id: box_id.into(),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory(box_id: impl Into<String>) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            box_id: box_id.into(),
        })
    }

    /// A store for another box on the same connection.
    pub fn with_box(&self, box_id: impl Into<String>) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            box_id: box_id.into(),
        }
    }
}

impl Store for SqliteStore {
    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn PacketTx) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let outcome = {
            let mut handle = SqliteTx {
                conn: &tx,
                box_id: &self.box_id,
            };
            f(&mut handle)
        };

        match outcome {
            Ok(value) => {
                tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback().map_err(StoreError::from)?;
                Err(err)
            }
        }
    }

    fn box_id(&self) -> &str {
        &self.box_id
    }
}

/// A transaction handle scoped to one box.
struct SqliteTx<'a> {
    conn: &'a Connection,
    box_id: &'a str,
}

fn name_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<EndpointName> {
    let raw: String = row.get(idx)?;
    EndpointName::new(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn seq_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<SeqNumber> {
    let raw: String = row.get(idx)?;
    SeqNumber::from_hex(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_seq(raw: Option<String>) -> Result<Option<SeqNumber>> {
    raw.map(|s| SeqNumber::from_hex(&s))
        .transpose()
        .map_err(|e| StoreError::InvalidData(e.to_string()))
}

// Expects columns: src, dst, seq_number, label, data
fn row_to_packet(row: &Row<'_>) -> rusqlite::Result<Packet> {
    let data: Vec<u8> = row.get(4)?;
    Ok(Packet {
        src: name_column(row, 0)?,
        dst: name_column(row, 1)?,
        seq_number: seq_column(row, 2)?,
        label: Label(row.get(3)?),
        data: Bytes::from(data),
    })
}

// Expects columns: src, dst, seq_number, label
fn row_to_header(row: &Row<'_>) -> rusqlite::Result<PacketHeader> {
    Ok(PacketHeader {
        src: name_column(row, 0)?,
        dst: name_column(row, 1)?,
        seq_number: seq_column(row, 2)?,
        label: Label(row.get(3)?),
    })
}

fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel::new(name_column(row, 0)?, name_column(row, 1)?))
}

impl PacketTx for SqliteTx<'_> {
    fn insert(&mut self, packet: &Packet) -> Result<()> {
        let result = self.conn.execute(
            "INSERT INTO packets (box_id, src, dst, seq_number, label, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.box_id,
                packet.src.as_str(),
                packet.dst.as_str(),
                packet.seq_number.to_hex(),
                packet.label.value(),
                &packet.data[..],
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateKey {
                    src: packet.src.clone(),
                    dst: packet.dst.clone(),
                    seq: packet.seq_number,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<Option<Packet>> {
        let packet = self
            .conn
            .prepare_cached(
                "SELECT src, dst, seq_number, label, data FROM packets
                 WHERE box_id = ?1 AND src = ?2 AND dst = ?3 AND seq_number = ?4",
            )?
            .query_row(
                params![self.box_id, src.as_str(), dst.as_str(), seq.to_hex()],
                row_to_packet,
            )
            .optional()?;
        Ok(packet)
    }

    fn first_seq(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<Option<SeqNumber>> {
        let raw: Option<String> = self.conn.query_row(
            "SELECT MIN(seq_number) FROM packets WHERE box_id = ?1 AND src = ?2 AND dst = ?3",
            params![self.box_id, src.as_str(), dst.as_str()],
            |row| row.get(0),
        )?;
        optional_seq(raw)
    }

    fn last_seq(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<Option<SeqNumber>> {
        let raw: Option<String> = self.conn.query_row(
            "SELECT MAX(seq_number) FROM packets WHERE box_id = ?1 AND src = ?2 AND dst = ?3",
            params![self.box_id, src.as_str(), dst.as_str()],
            |row| row.get(0),
        )?;
        optional_seq(raw)
    }

    fn first_at_or_after(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<Packet>> {
        let packet = self
            .conn
            .prepare_cached(
                "SELECT src, dst, seq_number, label, data FROM packets
                 WHERE box_id = ?1 AND src = ?2 AND dst = ?3 AND seq_number >= ?4
                 ORDER BY seq_number ASC LIMIT 1",
            )?
            .query_row(
                params![self.box_id, src.as_str(), dst.as_str(), cursor.to_hex()],
                row_to_packet,
            )
            .optional()?;
        Ok(packet)
    }

    fn first_header_at_or_after(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<PacketHeader>> {
        let header = self
            .conn
            .prepare_cached(
                "SELECT src, dst, seq_number, label FROM packets
                 WHERE box_id = ?1 AND src = ?2 AND dst = ?3 AND seq_number >= ?4
                 ORDER BY seq_number ASC LIMIT 1",
            )?
            .query_row(
                params![self.box_id, src.as_str(), dst.as_str(), cursor.to_hex()],
                row_to_header,
            )
            .optional()?;
        Ok(header)
    }

    fn delete_below(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        floor: SeqNumber,
        protected: &[Label],
    ) -> Result<usize> {
        let mut sql = String::from(
            "DELETE FROM packets
             WHERE box_id = ?1 AND src = ?2 AND dst = ?3 AND seq_number < ?4",
        );
        if !protected.is_empty() {
            let labels: Vec<String> = protected.iter().map(|l| l.value().to_string()).collect();
            sql.push_str(&format!(" AND label NOT IN ({})", labels.join(", ")));
        }

        let deleted = self.conn.execute(
            &sql,
            params![self.box_id, src.as_str(), dst.as_str(), floor.to_hex()],
        )?;
        Ok(deleted)
    }

    fn count_all(&mut self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM packets WHERE box_id = ?1",
            params![self.box_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn unique_pairs(&mut self) -> Result<Vec<Channel>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT src, dst FROM packets WHERE box_id = ?1 ORDER BY src, dst",
        )?;
        let pairs = stmt
            .query_map(params![self.box_id], row_to_channel)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    fn size_of_range(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        lower: SeqNumber,
        upper: SeqNumber,
    ) -> Result<u64> {
        let size: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM packets
             WHERE box_id = ?1 AND src = ?2 AND dst = ?3
               AND seq_number >= ?4 AND seq_number < ?5",
            params![
                self.box_id,
                src.as_str(),
                dst.as_str(),
                lower.to_hex(),
                upper.to_hex()
            ],
            |row| row.get(0),
        )?;
        Ok(size as u64)
    }

    fn all_packets(&mut self) -> Result<Vec<Packet>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT src, dst, seq_number, label, data FROM packets
             WHERE box_id = ?1 ORDER BY src, dst, seq_number",
        )?;
        let packets = stmt
            .query_map(params![self.box_id], row_to_packet)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packets)
    }

    fn stored_lower_bound(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<SeqNumber>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT lower_bound FROM lower_bounds
                 WHERE box_id = ?1 AND src = ?2 AND dst = ?3",
                params![self.box_id, src.as_str(), dst.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        optional_seq(raw)
    }

    fn set_stored_lower_bound(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        lower_bound: SeqNumber,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO lower_bounds (box_id, src, dst, lower_bound) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (box_id, src, dst) DO UPDATE SET lower_bound = excluded.lower_bound",
            params![self.box_id, src.as_str(), dst.as_str(), lower_bound.to_hex()],
        )?;
        Ok(())
    }

    fn lower_bound_pairs(&mut self) -> Result<Vec<Channel>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT src, dst FROM lower_bounds WHERE box_id = ?1 ORDER BY src, dst",
        )?;
        let pairs = stmt
            .query_map(params![self.box_id], row_to_channel)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    fn all_lower_bounds(&mut self) -> Result<Vec<(Channel, SeqNumber)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT src, dst, lower_bound FROM lower_bounds WHERE box_id = ?1 ORDER BY src, dst",
        )?;
        let bounds = stmt
            .query_map(params![self.box_id], |row| {
                Ok((row_to_channel(row)?, seq_column(row, 2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bounds)
    }

    fn cursor(
        &mut self,
        peer: &EndpointName,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<SeqNumber>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT cursor FROM cursors
                 WHERE box_id = ?1 AND peer = ?2 AND src = ?3 AND dst = ?4",
                params![self.box_id, peer.as_str(), src.as_str(), dst.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        optional_seq(raw)
    }

    fn set_cursor(
        &mut self,
        peer: &EndpointName,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cursors (box_id, peer, src, dst, cursor) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (box_id, peer, src, dst) DO UPDATE SET cursor = excluded.cursor",
            params![
                self.box_id,
                peer.as_str(),
                src.as_str(),
                dst.as_str(),
                cursor.to_hex()
            ],
        )?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        for table in ["packets", "lower_bounds", "cursors"] {
            self.conn.execute(
                &format!("DELETE FROM {table} WHERE box_id = ?1"),
                params![self.box_id],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> EndpointName {
        EndpointName::new(s).unwrap()
    }

    fn packet(src: &str, dst: &str, seq: u64, data: &[u8]) -> Packet {
        Packet::new(name(src), name(dst), SeqNumber::new(seq), Label(1), data.to_vec())
    }

    #[test]
    fn test_insert_and_get() {
        let store = SqliteStore::open_memory("box").unwrap();
        let p = packet("a", "b", 5, b"hello");

        store.transact(|tx| tx.insert(&p)).unwrap();

        let got = store
            .transact(|tx| tx.get(&name("a"), &name("b"), SeqNumber::new(5)))
            .unwrap();
        assert_eq!(got, Some(p));

        let missing = store
            .transact(|tx| tx.get(&name("a"), &name("b"), SeqNumber::new(6)))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_duplicate_key() {
        let store = SqliteStore::open_memory("box").unwrap();
        store.transact(|tx| tx.insert(&packet("a", "b", 1, b"x"))).unwrap();

        let err = store
            .transact(|tx| tx.insert(&packet("a", "b", 1, b"y")))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn test_err_rolls_back() {
        let store = SqliteStore::open_memory("box").unwrap();

        let result: Result<()> = store.transact(|tx| {
            tx.insert(&packet("a", "b", 1, b"x"))?;
            Err(StoreError::InvalidData("abort".into()))
        });
        assert!(result.is_err());

        assert_eq!(store.transact(|tx| tx.count_all()).unwrap(), 0);
    }

    #[test]
    fn test_range_queries_order_numerically() {
        let store = SqliteStore::open_memory("box").unwrap();
        store
            .transact(|tx| {
                for seq in [0x10u64, 0x2, 0x100, 0xff] {
                    tx.insert(&packet("a", "b", seq, b"."))?;
                }
                Ok::<_, StoreError>(())
            })
            .unwrap();

        store
            .transact(|tx| {
                let (a, b) = (name("a"), name("b"));
                assert_eq!(tx.first_seq(&a, &b)?, Some(SeqNumber::new(0x2)));
                assert_eq!(tx.last_seq(&a, &b)?, Some(SeqNumber::new(0x100)));

                let next = tx.first_header_at_or_after(&a, &b, SeqNumber::new(0x11))?;
                assert_eq!(next.map(|h| h.seq_number), Some(SeqNumber::new(0xff)));

                let none = tx.first_at_or_after(&a, &b, SeqNumber::new(0x101))?;
                assert!(none.is_none());
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_delete_below_keeps_protected_labels() {
        let store = SqliteStore::open_memory("box").unwrap();
        let (a, b) = (name("a"), name("b"));
        store
            .transact(|tx| {
                tx.insert(&packet("a", "b", 1, b"plain"))?;
                tx.insert(&Packet::new(
                    a.clone(),
                    b.clone(),
                    SeqNumber::new(2),
                    Label::FIRST_FRAGMENT,
                    b"frag".to_vec(),
                ))?;
                tx.insert(&packet("a", "b", 3, b"kept"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let deleted = store
            .transact(|tx| tx.delete_below(&a, &b, SeqNumber::new(3), &Label::FRAGMENTS))
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<u64> = store
            .transact(|tx| tx.all_packets())
            .unwrap()
            .iter()
            .map(|p| p.seq_number.value())
            .collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn test_boxes_are_partitioned() {
        let store_a = SqliteStore::open_memory("box-a").unwrap();
        let store_b = store_a.with_box("box-b");

        store_a.transact(|tx| tx.insert(&packet("a", "b", 1, b"x"))).unwrap();
        store_b.transact(|tx| tx.insert(&packet("a", "b", 1, b"x"))).unwrap();
        store_b
            .transact(|tx| tx.set_stored_lower_bound(&name("a"), &name("b"), SeqNumber::new(1)))
            .unwrap();

        store_a.transact(|tx| tx.clear()).unwrap();

        assert_eq!(store_a.transact(|tx| tx.count_all()).unwrap(), 0);
        assert_eq!(store_b.transact(|tx| tx.count_all()).unwrap(), 1);
        assert_eq!(
            store_b.transact(|tx| tx.lower_bound_pairs()).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_upserts() {
        let store = SqliteStore::open_memory("box").unwrap();
        let (p, a, b) = (name("p"), name("a"), name("b"));

        store
            .transact(|tx| {
                tx.set_stored_lower_bound(&a, &b, SeqNumber::new(4))?;
                tx.set_stored_lower_bound(&a, &b, SeqNumber::new(9))?;
                tx.set_cursor(&p, &a, &b, SeqNumber::new(2))?;
                tx.set_cursor(&p, &a, &b, SeqNumber::new(3))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        store
            .transact(|tx| {
                assert_eq!(tx.stored_lower_bound(&a, &b)?, Some(SeqNumber::new(9)));
                assert_eq!(tx.cursor(&p, &a, &b)?, Some(SeqNumber::new(3)));
                assert_eq!(tx.cursor(&a, &a, &b)?, None);
                assert_eq!(tx.all_lower_bounds()?.len(), 1);
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_size_of_range() {
        let store = SqliteStore::open_memory("box").unwrap();
        store
            .transact(|tx| {
                tx.insert(&packet("a", "b", 1, b"abc"))?;
                tx.insert(&packet("a", "b", 2, b"de"))?;
                tx.insert(&packet("a", "b", 3, b"f"))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let size = store
            .transact(|tx| {
                tx.size_of_range(&name("a"), &name("b"), SeqNumber::new(1), SeqNumber::new(3))
            })
            .unwrap();
        assert_eq!(size, 5);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxes.db");

        {
            let store = SqliteStore::open(&path, "box").unwrap();
            store.transact(|tx| tx.insert(&packet("a", "b", 7, b"x"))).unwrap();
        }

        let store = SqliteStore::open(&path, "box").unwrap();
        assert_eq!(store.transact(|tx| tx.count_all()).unwrap(), 1);
        assert_eq!(
            store.transact(|tx| tx.unique_pairs()).unwrap(),
            vec![Channel::new(name("a"), name("b"))]
        );
    }
}
