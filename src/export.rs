//! CSV and XLSX downloads of a filtered expense view.

use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;

use crate::error::{LedgerError, LedgerResult};
use crate::models::ExpenseRecord;
use crate::report;

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Category")]
    category: &'static str,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "Note")]
    note: &'a str,
}

pub fn to_csv(records: &[ExpenseRecord]) -> LedgerResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record(["ID", "Date", "Category", "Amount", "Note"])?;
    }
    for record in records {
        writer.serialize(CsvRow {
            id: record.id,
            date: record.date.format("%Y-%m-%d").to_string(),
            category: record.category.as_str(),
            amount: record.amount,
            note: &record.note,
        })?;
    }
    writer
        .into_inner()
        .map_err(|err| LedgerError::Export(err.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(i64),
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: &'static str,
    pub header: &'static [&'static str],
    pub rows: Vec<Vec<Cell>>,
}

/// The three sheets of the spreadsheet download, in order.
pub fn workbook_sheets(records: &[ExpenseRecord]) -> Vec<Sheet> {
    let expenses = records
        .iter()
        .map(|record| {
            vec![
                Cell::Number(record.id),
                Cell::Text(record.date.format("%Y-%m-%d").to_string()),
                Cell::Text(record.category.to_string()),
                Cell::Number(record.amount),
                Cell::Text(record.note.clone()),
            ]
        })
        .collect();
    let months = report::monthly(records)
        .into_iter()
        .map(|month| vec![Cell::Text(month.month), Cell::Number(month.amount)])
        .collect();
    let categories = report::by_category(records)
        .into_iter()
        .map(|summary| {
            vec![
                Cell::Text(summary.category.to_string()),
                Cell::Number(summary.amount),
            ]
        })
        .collect();

    vec![
        Sheet {
            name: "Expenses",
            header: &["ID", "Date", "Category", "Amount", "Note"],
            rows: expenses,
        },
        Sheet {
            name: "Monthly_Report",
            header: &["Month", "Amount"],
            rows: months,
        },
        Sheet {
            name: "Category_Summary",
            header: &["Category", "Amount"],
            rows: categories,
        },
    ]
}

/// Spreadsheet numbers are doubles; integers past 2^53 would be rounded.
fn exact_number(value: i64) -> LedgerResult<f64> {
    if value.unsigned_abs() > 1 << 53 {
        return Err(LedgerError::Export(format!(
            "{value} cannot be stored exactly in a spreadsheet"
        )));
    }
    Ok(value as f64)
}

pub fn to_xlsx(records: &[ExpenseRecord]) -> LedgerResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for sheet in workbook_sheets(records) {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name)?;
        for (col, title) in sheet.header.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *title, &bold)?;
        }
        for (row, cells) in sheet.rows.iter().enumerate() {
            let row = row as u32 + 1;
            for (col, cell) in cells.iter().enumerate() {
                match cell {
                    Cell::Text(text) => worksheet.write_string(row, col as u16, text)?,
                    Cell::Number(value) => {
                        worksheet.write_number(row, col as u16, exact_number(*value)?)?
                    }
                };
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MAX_AMOUNT;
    use crate::models::Category;
    use chrono::NaiveDate;

    fn scenario() -> Vec<ExpenseRecord> {
        [
            (1, (2024, 1, 5), Category::Food, 100, "groceries, weekly"),
            (2, (2024, 1, 20), Category::Travel, 50, ""),
            (3, (2024, 2, 1), Category::Food, 30, "snacks"),
        ]
        .into_iter()
        .map(|(id, (y, m, d), category, amount, note)| ExpenseRecord {
            id,
            owner_id: 1,
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            category,
            amount,
            note: note.to_string(),
        })
        .collect()
    }

    #[test]
    fn test_csv_header_and_rows() {
        let bytes = to_csv(&scenario()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "ID,Date,Category,Amount,Note");
        assert_eq!(lines[1], "1,2024-01-05,Food,100,\"groceries, weekly\"");
        assert_eq!(lines[2], "2,2024-01-20,Travel,50,");
    }

    #[test]
    fn test_csv_empty_still_has_header() {
        let text = String::from_utf8(to_csv(&[]).unwrap()).unwrap();
        assert_eq!(text.trim_end(), "ID,Date,Category,Amount,Note");
    }

    #[test]
    fn test_workbook_sheets() {
        let sheets = workbook_sheets(&scenario());
        let names: Vec<&str> = sheets.iter().map(|sheet| sheet.name).collect();
        assert_eq!(names, ["Expenses", "Monthly_Report", "Category_Summary"]);
        assert_eq!(sheets[0].rows.len(), 3);
        assert_eq!(
            sheets[1].rows,
            vec![
                vec![Cell::Text("2024-01".into()), Cell::Number(150)],
                vec![Cell::Text("2024-02".into()), Cell::Number(30)],
            ]
        );
        assert_eq!(
            sheets[2].rows,
            vec![
                vec![Cell::Text("Food".into()), Cell::Number(130)],
                vec![Cell::Text("Travel".into()), Cell::Number(50)],
            ]
        );
    }

    #[test]
    fn test_xlsx_is_zip_with_three_worksheets() {
        let bytes = to_xlsx(&scenario()).unwrap();
        assert!(bytes.starts_with(b"PK"));
        let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|window| window == needle);
        assert!(contains(b"xl/worksheets/sheet1.xml"));
        assert!(contains(b"xl/worksheets/sheet3.xml"));
        assert!(!contains(b"xl/worksheets/sheet4.xml"));
    }

    #[test]
    fn test_largest_amount_exports_exactly() {
        let mut records = scenario();
        records[0].amount = MAX_AMOUNT;
        records[2].amount = MAX_AMOUNT;
        let sheets = workbook_sheets(&records);
        assert_eq!(sheets[0].rows[0][3], Cell::Number(MAX_AMOUNT));
        assert_eq!(sheets[2].rows[0][1], Cell::Number(2 * MAX_AMOUNT));
        assert_eq!(exact_number(2 * MAX_AMOUNT).unwrap() as i64, 2 * MAX_AMOUNT);
        assert!(to_xlsx(&records).unwrap().starts_with(b"PK"));

        let csv = String::from_utf8(to_csv(&records).unwrap()).unwrap();
        assert!(csv.contains(",Food,1000000000,"));
    }

    #[test]
    fn test_inexact_number_is_an_export_error() {
        assert_eq!(exact_number(1 << 53).unwrap(), 9007199254740992.0);
        assert!(matches!(
            exact_number((1 << 53) + 1),
            Err(LedgerError::Export(_))
        ));
    }
}
