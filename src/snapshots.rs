use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A persisted potential result for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialSnapshot {
    pub id: String,
    pub subject_id: String,
    pub percent: i64,
    pub label: String,
    pub delta: i64,
    pub task_count: i64,
    pub recorded_at: String,
}

const SNAPSHOT_COLUMNS: &str = "id, subject_id, percent, label, delta, task_count, recorded_at";

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<PotentialSnapshot> {
    Ok(PotentialSnapshot {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        percent: row.get(2)?,
        label: row.get(3)?,
        delta: row.get(4)?,
        task_count: row.get(5)?,
        recorded_at: row.get(6)?,
    })
}

/// Inserts a snapshot unless its id is already stored. Returns the number of
/// rows written (0 for a duplicate id).
pub fn insert_snapshot(conn: &Connection, s: &PotentialSnapshot) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO potential_snapshots(id, subject_id, percent, label, delta, task_count, recorded_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &s.id,
            &s.subject_id,
            s.percent,
            &s.label,
            s.delta,
            s.task_count,
            &s.recorded_at,
        ),
    )
}

pub fn latest_percent(conn: &Connection, subject_id: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT percent FROM potential_snapshots
         WHERE subject_id = ?
         ORDER BY rowid DESC
         LIMIT 1",
        [subject_id],
        |r| r.get(0),
    )
    .optional()
}

/// Newest first.
pub fn recent_for_subject(
    conn: &Connection,
    subject_id: &str,
    limit: i64,
) -> rusqlite::Result<Vec<PotentialSnapshot>> {
    let sql = format!(
        "SELECT {} FROM potential_snapshots
         WHERE subject_id = ?
         ORDER BY rowid DESC
         LIMIT ?",
        SNAPSHOT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((subject_id, limit), snapshot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Oldest first, so re-inserting in order rebuilds the same "latest" chain.
pub fn all_in_insertion_order(
    conn: &Connection,
    subject_id: Option<&str>,
) -> rusqlite::Result<Vec<PotentialSnapshot>> {
    let rows = match subject_id {
        Some(subject) => {
            let sql = format!(
                "SELECT {} FROM potential_snapshots WHERE subject_id = ? ORDER BY rowid",
                SNAPSHOT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([subject], snapshot_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!(
                "SELECT {} FROM potential_snapshots ORDER BY rowid",
                SNAPSHOT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], snapshot_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn delete_for_subject(conn: &Connection, subject_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM potential_snapshots WHERE subject_id = ?",
        [subject_id],
    )
}
