//! Task catalog: read-mostly reference data the allocator draws from.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::errors::LedgerResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub category: String,
    pub reward: i64,
    pub active: bool,
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        category: row.get(1)?,
        reward: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
    })
}

pub fn active_tasks(conn: &Connection) -> LedgerResult<Vec<Task>> {
    let mut stmt =
        conn.prepare("SELECT id, category, reward, active FROM tasks WHERE active = 1")?;
    let rows = stmt.query_map([], task_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get_task(conn: &Connection, task_id: &str) -> LedgerResult<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT id, category, reward, active FROM tasks WHERE id = ?1",
            params![task_id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

/// Collaborator seam: the catalog is seeded from outside the engine. The
/// insert is idempotent on the task id so re-running a seed is harmless.
pub fn insert_task(conn: &Connection, task: &Task) -> LedgerResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO tasks (id, category, reward, active) VALUES (?1, ?2, ?3, ?4)",
        params![task.id, task.category, task.reward, task.active as i64],
    )?;
    Ok(())
}

/// Returns false when no such task exists.
pub fn set_active(conn: &Connection, task_id: &str, active: bool) -> LedgerResult<bool> {
    let changed = conn.execute(
        "UPDATE tasks SET active = ?1 WHERE id = ?2",
        params![active as i64, task_id],
    )?;
    Ok(changed > 0)
}
