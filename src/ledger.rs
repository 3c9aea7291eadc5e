//! Per-user expense ledger. Every mutation is a single statement and is
//! only applied to records the requester owns.

use chrono::NaiveDate;
use log::{info, warn};
use rusqlite::{Connection, ErrorCode};

use crate::db;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Category, ExpenseDraft, ExpenseRecord};

/// Builds a draft from raw form text. A blank date means `today`.
pub fn parse_draft(
    date: &str,
    category: &str,
    amount: &str,
    note: Option<&str>,
    today: NaiveDate,
) -> LedgerResult<ExpenseDraft> {
    let date = match date.trim() {
        "" => today,
        value => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| LedgerError::InvalidInput(format!("Invalid date: {value}")))?,
    };
    let category = category
        .parse::<Category>()
        .map_err(|err| LedgerError::InvalidCategory(err.0))?;
    let amount = amount
        .trim()
        .parse::<i64>()
        .map_err(|_| LedgerError::InvalidInput("Amount must be a whole number".to_string()))?;
    let draft = ExpenseDraft::new(date, category, amount, note.unwrap_or_default().trim());
    validate(&draft)?;
    Ok(draft)
}

/// Largest amount a single expense may carry. Kept well under 2^53 so every
/// amount is exact as a spreadsheet number.
pub const MAX_AMOUNT: i64 = 1_000_000_000;

fn validate(draft: &ExpenseDraft) -> LedgerResult<()> {
    if !(1..=MAX_AMOUNT).contains(&draft.amount) {
        return Err(LedgerError::InvalidAmount(draft.amount));
    }
    Ok(())
}

pub fn add(conn: &Connection, owner_id: i64, draft: &ExpenseDraft) -> LedgerResult<i64> {
    validate(draft)?;
    match db::insert_expense(conn, owner_id, draft) {
        Ok(id) => {
            info!("user {owner_id} added expense {id}");
            Ok(id)
        }
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(LedgerError::InvalidInput(format!("User {owner_id} does not exist")))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn list_by_owner(conn: &Connection, owner_id: i64) -> LedgerResult<Vec<ExpenseRecord>> {
    Ok(db::list_expenses(conn, owner_id)?)
}

/// Fetches a record, failing with `NotFound` or `Forbidden` unless the
/// requester owns it.
pub fn get(conn: &Connection, owner_id: i64, record_id: i64) -> LedgerResult<ExpenseRecord> {
    let record = db::expense_by_id(conn, record_id)?.ok_or(LedgerError::NotFound(record_id))?;
    if record.owner_id != owner_id {
        warn!("user {owner_id} tried to access expense {record_id}");
        return Err(LedgerError::Forbidden(record_id));
    }
    Ok(record)
}

pub fn update(
    conn: &Connection,
    owner_id: i64,
    record_id: i64,
    draft: &ExpenseDraft,
) -> LedgerResult<()> {
    validate(draft)?;
    get(conn, owner_id, record_id)?;
    if db::update_expense(conn, record_id, owner_id, draft)? == 0 {
        return Err(LedgerError::NotFound(record_id));
    }
    info!("user {owner_id} updated expense {record_id}");
    Ok(())
}

pub fn delete(conn: &Connection, owner_id: i64, record_id: i64) -> LedgerResult<()> {
    get(conn, owner_id, record_id)?;
    if db::delete_expense(conn, record_id, owner_id)? == 0 {
        return Err(LedgerError::NotFound(record_id));
    }
    info!("user {owner_id} deleted expense {record_id}");
    Ok(())
}
