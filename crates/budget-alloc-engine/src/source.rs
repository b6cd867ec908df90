//! Tabular inputs for a [`Ledger`](crate::Ledger).
//!
//! A source only splits its input into [`RawRow`]s with the cells left as
//! text. Numeric coercion and duplicate handling belong to the ledger.

use std::path::{Path, PathBuf};
use std::str::Chars;

use serde_json::Value;

use crate::error::LedgerError;

/// Columns understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Cabinet,
    Dept,
    Program,
    ExpenseCategory,
    Fy22ActualExpense,
    Fy23ActualExpense,
    Fy24Appropriation,
    Fy25Budget,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Cabinet,
        Column::Dept,
        Column::Program,
        Column::ExpenseCategory,
        Column::Fy22ActualExpense,
        Column::Fy23ActualExpense,
        Column::Fy24Appropriation,
        Column::Fy25Budget,
    ];

    /// Canonical header text
    pub fn header(self) -> &'static str {
        match self {
            Column::Cabinet => "Cabinet",
            Column::Dept => "Dept",
            Column::Program => "Program",
            Column::ExpenseCategory => "ExpenseCategory",
            Column::Fy22ActualExpense => "FY22ActualExpense",
            Column::Fy23ActualExpense => "FY23ActualExpense",
            Column::Fy24Appropriation => "FY24Appropriation",
            Column::Fy25Budget => "FY25Budget",
        }
    }

    pub fn is_required(self) -> bool {
        !matches!(self, Column::Cabinet | Column::Fy22ActualExpense)
    }

    /// Match a header ignoring case, whitespace and punctuation, so
    /// `FY25 Budget` and `fy25_budget` both resolve to [`Column::Fy25Budget`].
    pub fn from_header(header: &str) -> Option<Column> {
        let key: String = header
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "department" => Some(Column::Dept),
            "category" => Some(Column::ExpenseCategory),
            _ => Column::ALL
                .into_iter()
                .find(|c| c.header().to_lowercase() == key),
        }
    }
}

/// One input row with every cell still as text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// 1-based line (or array position) in the source, for diagnostics
    pub line: usize,
    pub cabinet: String,
    pub department: String,
    pub program: String,
    pub expense_category: String,
    pub fy22_actual: String,
    pub prior_actual: String,
    pub current_appropriation: String,
    pub proposed_budget: String,
}

impl RawRow {
    fn set(&mut self, column: Column, value: String) {
        let slot = match column {
            Column::Cabinet => &mut self.cabinet,
            Column::Dept => &mut self.department,
            Column::Program => &mut self.program,
            Column::ExpenseCategory => &mut self.expense_category,
            Column::Fy22ActualExpense => &mut self.fy22_actual,
            Column::Fy23ActualExpense => &mut self.prior_actual,
            Column::Fy24Appropriation => &mut self.current_appropriation,
            Column::Fy25Budget => &mut self.proposed_budget,
        };
        *slot = value;
    }
}

/// Anything that can produce raw ledger rows
pub trait LedgerSource {
    fn read_rows(&self) -> Result<Vec<RawRow>, LedgerError>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
enum Input {
    Path(PathBuf),
    Text(String),
}

impl Input {
    fn load(&self) -> Result<String, LedgerError> {
        match self {
            Input::Path(path) => std::fs::read_to_string(path)
                .map_err(|e| LedgerError::DataSource(format!("cannot read {}: {}", path.display(), e))),
            Input::Text(text) => Ok(text.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Input::Path(path) => path.display().to_string(),
            Input::Text(text) => format!("<inline, {} bytes>", text.len()),
        }
    }
}

/// Delimited text with a header row (comma separated by default)
#[derive(Debug, Clone)]
pub struct DelimitedSource {
    input: Input,
    delimiter: char,
}

impl DelimitedSource {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            input: Input::Path(path.as_ref().to_path_buf()),
            delimiter: ',',
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            input: Input::Text(text.into()),
            delimiter: ',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl LedgerSource for DelimitedSource {
    fn read_rows(&self) -> Result<Vec<RawRow>, LedgerError> {
        let text = self.input.load()?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut records = RecordReader::new(text, self.delimiter).read_all()?.into_iter();
        let Some(header) = records.next() else {
            return Err(LedgerError::DataSource(format!("{} is empty", self.describe())));
        };

        let columns: Vec<Option<Column>> = header.fields.iter().map(|h| Column::from_header(h)).collect();
        check_schema(columns.iter().flatten().copied())?;

        let mut rows = Vec::new();
        for record in records {
            if record.fields.len() != columns.len() {
                return Err(LedgerError::DataSource(format!(
                    "line {} has {} fields, header has {}",
                    record.line,
                    record.fields.len(),
                    columns.len()
                )));
            }
            let mut row = RawRow { line: record.line, ..RawRow::default() };
            for (column, value) in columns.iter().zip(record.fields) {
                if let Some(column) = column {
                    row.set(*column, value);
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn describe(&self) -> String {
        self.input.describe()
    }
}

/// JSON array of objects keyed by column headers
#[derive(Debug, Clone)]
pub struct JsonSource {
    input: Input,
}

impl JsonSource {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self { input: Input::Path(path.as_ref().to_path_buf()) }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { input: Input::Text(text.into()) }
    }
}

impl LedgerSource for JsonSource {
    fn read_rows(&self) -> Result<Vec<RawRow>, LedgerError> {
        let text = self.input.load()?;
        let value: Value = serde_json::from_str(&text)?;
        let Value::Array(items) = value else {
            return Err(LedgerError::DataSource("expected a JSON array of rows".to_string()));
        };

        let mut rows = Vec::with_capacity(items.len());
        let mut missing: Vec<Column> = Vec::new();

        for (i, item) in items.into_iter().enumerate() {
            let Value::Object(fields) = item else {
                return Err(LedgerError::DataSource(format!("row {} is not an object", i + 1)));
            };
            let mut row = RawRow { line: i + 1, ..RawRow::default() };
            let mut seen = Vec::new();
            for (key, value) in fields {
                if let Some(column) = Column::from_header(&key) {
                    row.set(column, json_cell(value));
                    seen.push(column);
                }
            }
            for column in Column::ALL.into_iter().filter(|c| c.is_required()) {
                if !seen.contains(&column) && !missing.contains(&column) {
                    missing.push(column);
                }
            }
            rows.push(row);
        }

        if !missing.is_empty() {
            return Err(LedgerError::Schema {
                missing: missing.into_iter().map(|c| c.header().to_string()).collect(),
            });
        }
        Ok(rows)
    }

    fn describe(&self) -> String {
        self.input.describe()
    }
}

fn json_cell(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn check_schema(present: impl Iterator<Item = Column>) -> Result<(), LedgerError> {
    let present: Vec<Column> = present.collect();
    let missing: Vec<String> = Column::ALL
        .into_iter()
        .filter(|c| c.is_required() && !present.contains(c))
        .map(|c| c.header().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(LedgerError::Schema { missing })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Record {
    line: usize,
    fields: Vec<String>,
}

/// Splits delimited text into records. Quoted fields may contain the
/// delimiter, doubled quotes and line breaks.
struct RecordReader<'a> {
    chars: Chars<'a>,
    delimiter: char,
    line: usize,
}

impl<'a> RecordReader<'a> {
    fn new(source: &'a str, delimiter: char) -> Self {
        Self {
            chars: source.chars(),
            delimiter,
            line: 1,
        }
    }

    fn read_all(mut self) -> Result<Vec<Record>, LedgerError> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            // Blank lines carry a single empty field
            if record.fields.len() == 1 && record.fields[0].trim().is_empty() {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }

    fn next_record(&mut self) -> Result<Option<Record>, LedgerError> {
        let start_line = self.line;
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut saw_any = false;

        loop {
            let Some(c) = self.chars.next() else {
                if in_quotes {
                    return Err(LedgerError::DataSource(format!(
                        "unterminated quoted field starting on line {}",
                        start_line
                    )));
                }
                if !saw_any {
                    return Ok(None);
                }
                fields.push(field);
                return Ok(Some(Record { line: start_line, fields }));
            };
            saw_any = true;

            if in_quotes {
                match c {
                    '"' => {
                        if self.peek() == Some('"') {
                            self.chars.next();
                            field.push('"');
                        } else {
                            in_quotes = false;
                        }
                    }
                    '\n' => {
                        self.line += 1;
                        field.push(c);
                    }
                    _ => field.push(c),
                }
                continue;
            }

            match c {
                '"' if field.trim().is_empty() => {
                    field.clear();
                    in_quotes = true;
                }
                '\r' if self.peek() == Some('\n') => {}
                '\n' => {
                    self.line += 1;
                    fields.push(field);
                    return Ok(Some(Record { line: start_line, fields }));
                }
                c if c == self.delimiter => fields.push(std::mem::take(&mut field)),
                _ => field.push(c),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }
}
