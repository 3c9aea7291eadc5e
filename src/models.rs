use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use thiserror::Error;

#[derive(Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    Food,
    Travel,
    Shopping,
    Entertainment,
    Other,
}

#[derive(Debug, Error)]
#[error("unknown category: {0}")]
pub struct ParseCategoryError(pub String);

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Food,
        Category::Travel,
        Category::Shopping,
        Category::Entertainment,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Travel => "Travel",
            Category::Shopping => "Shopping",
            Category::Entertainment => "Entertainment",
            Category::Other => "Other",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Category::Food => "🍔",
            Category::Travel => "✈️",
            Category::Shopping => "🛍️",
            Category::Entertainment => "🎮",
            Category::Other => "📌",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s.trim())
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseRecord {
    pub id: i64,
    pub owner_id: i64,
    pub date: NaiveDate,
    pub category: Category,
    pub amount: i64,
    pub note: String,
}

/// The mutable part of an expense, as submitted by add and edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub date: NaiveDate,
    pub category: Category,
    pub amount: i64,
    pub note: String,
}

impl ExpenseDraft {
    pub fn new(date: NaiveDate, category: Category, amount: i64, note: impl Into<String>) -> Self {
        Self {
            date,
            category,
            amount,
            note: note.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthTotal {
    /// `YYYY-MM`
    pub month: String,
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("Food".parse::<Category>().unwrap(), Category::Food);
        assert_eq!(" Travel ".parse::<Category>().unwrap(), Category::Travel);
        assert!("food".parse::<Category>().is_err());
        assert!("Rent".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_display_matches_parse() {
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_category_sql_roundtrip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let category: Category = conn
            .query_row("SELECT ?1", [Category::Entertainment], |row| row.get(0))
            .unwrap();
        assert_eq!(category, Category::Entertainment);

        let bad: rusqlite::Result<Category> =
            conn.query_row("SELECT 'Rent'", [], |row| row.get(0));
        assert!(bad.is_err());
    }
}
