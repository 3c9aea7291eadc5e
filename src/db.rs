use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};

use crate::error::LedgerResult;
use crate::models::{ExpenseDraft, ExpenseRecord, User};

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_db(path: &Path) -> LedgerResult<DbPool> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let manager = SqliteConnectionManager::file(path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::new(manager)?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            credential_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            token TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS expense_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            category TEXT NOT NULL
                CHECK(category IN ('Food', 'Travel', 'Shopping', 'Entertainment', 'Other')),
            amount INTEGER NOT NULL CHECK(amount BETWEEN 1 AND 1000000000),
            note TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(owner_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_expense_records_owner
            ON expense_records(owner_id);
        ",
    )
}

pub fn insert_user(
    conn: &Connection,
    username: &str,
    credential_hash: &str,
    created_at: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (username, credential_hash, created_at) VALUES (?1, ?2, ?3)",
        params![username, credential_hash, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn user_credentials(conn: &Connection, username: &str) -> Result<Option<(i64, String)>> {
    conn.query_row(
        "
        SELECT id, credential_hash
        FROM users
        WHERE username = ?1
        ",
        params![username],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

pub fn create_session(conn: &Connection, user_id: i64, token: &str, created_at: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (user_id, token, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, token, created_at],
    )?;
    Ok(())
}

pub fn user_by_session(conn: &Connection, token: &str) -> Result<Option<User>> {
    conn.query_row(
        "
        SELECT u.id, u.username
        FROM sessions s
        JOIN users u ON s.user_id = u.id
        WHERE s.token = ?1
        ",
        params![token],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
            })
        },
    )
    .optional()
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

pub fn prune_sessions(conn: &Connection, user_id: i64, keep: i64) -> Result<()> {
    conn.execute(
        "
        DELETE FROM sessions
        WHERE user_id = ?1
          AND id NOT IN (
            SELECT id
            FROM sessions
            WHERE user_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
          )
        ",
        params![user_id, keep],
    )?;
    Ok(())
}

fn expense_from_row(row: &Row<'_>) -> Result<ExpenseRecord> {
    Ok(ExpenseRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        date: row.get(2)?,
        category: row.get(3)?,
        amount: row.get(4)?,
        note: row.get(5)?,
    })
}

pub fn insert_expense(conn: &Connection, owner_id: i64, draft: &ExpenseDraft) -> Result<i64> {
    conn.execute(
        "
        INSERT INTO expense_records (owner_id, date, category, amount, note)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
        params![owner_id, draft.date, draft.category, draft.amount, draft.note],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_expenses(conn: &Connection, owner_id: i64) -> Result<Vec<ExpenseRecord>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, owner_id, date, category, amount, note
        FROM expense_records
        WHERE owner_id = ?1
        ORDER BY id
        ",
    )?;
    let rows = stmt.query_map(params![owner_id], expense_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn expense_by_id(conn: &Connection, id: i64) -> Result<Option<ExpenseRecord>> {
    conn.query_row(
        "
        SELECT id, owner_id, date, category, amount, note
        FROM expense_records
        WHERE id = ?1
        ",
        params![id],
        expense_from_row,
    )
    .optional()
}

/// Returns the number of rows changed; 0 when the id/owner pair does not match.
pub fn update_expense(
    conn: &Connection,
    id: i64,
    owner_id: i64,
    draft: &ExpenseDraft,
) -> Result<usize> {
    conn.execute(
        "
        UPDATE expense_records
        SET date = ?1, category = ?2, amount = ?3, note = ?4
        WHERE id = ?5 AND owner_id = ?6
        ",
        params![draft.date, draft.category, draft.amount, draft.note, id, owner_id],
    )
}

pub fn delete_expense(conn: &Connection, id: i64, owner_id: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM expense_records WHERE id = ?1 AND owner_id = ?2",
        params![id, owner_id],
    )
}

#[cfg(test)]
pub fn test_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    run_migrations(&conn).unwrap();
    conn
}
