//! provides the in-memory table that holds a query result.
//!
//! Columns are fixed when the table is created. Appended rows are checked against them and stay
//! pending until they are published, either by an explicit `flush` or by the first read after the
//! appends. Appending needs `&mut self`, so no reader can observe a table mid-append.
//!
//! Appending does no index maintenance. The first keyed read on a column builds an index of
//! that column; publishing new rows drops the indexes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use streaming_iterator::StreamingIterator;

use crate::formatting;
use crate::ir::OutputColumn;
use crate::sql_type::{SqlType, ValueType};
use crate::sql_value::SqlValue;
use crate::table_traits::TableMeta;

pub type Row = Vec<SqlValue>;

type KeyIndex = Arc<HashMap<SqlValue, Vec<usize>>>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Row has {actual} values but table {table} has {expected} columns.")]
    Arity {
        table: String,
        expected: usize,
        actual: usize,
    },
    #[error("Value {value} does not fit column {column} of type {ty}.")]
    Type {
        column: String,
        ty: ValueType,
        value: String,
    },
    #[error("Table {table} has no column {column}.")]
    UnknownColumn { table: String, column: String },
}

#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<OutputColumn>,
    rows: Vec<Row>,
    // Rows before this position are published.
    published: AtomicUsize,
    indexes: Mutex<HashMap<usize, KeyIndex>>,
}

impl Clone for Table {
    fn clone(&self) -> Self {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            published: AtomicUsize::new(self.published.load(Ordering::Acquire)),
            indexes: Mutex::new(HashMap::new()),
        }
    }
}

impl TableMeta for Table {
    fn table_name(&self) -> String {
        self.name.clone()
    }
    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
    fn column_types(&self) -> Vec<ValueType> {
        self.columns.iter().map(|c| c.ty).collect()
    }
}

/// `NULL` fits every column: aggregates and methods may yield it whatever the declared type.
fn fits(ty: ValueType, v: &SqlValue) -> bool {
    match v {
        SqlValue::Null => true,
        v => ty.sql_type == SqlType::Any || v.sql_type() == ty.sql_type,
    }
}

impl Table {
    pub fn new(name: &str, columns: Vec<OutputColumn>) -> Self {
        Table {
            name: name.to_string(),
            columns,
            rows: vec![],
            published: AtomicUsize::new(0),
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// queues a row. It is published by the next `flush` or read.
    pub fn append_row(&mut self, row: Row) -> Result<(), Error> {
        if row.len() != self.columns.len() {
            return Err(Error::Arity {
                table: self.name.clone(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        for (c, v) in self.columns.iter().zip(row.iter()) {
            if !fits(c.ty, v) {
                return Err(Error::Type {
                    column: c.name.clone(),
                    ty: c.ty,
                    value: v.to_string(),
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    fn publish(&self) -> usize {
        let len = self.rows.len();
        let before = self.published.swap(len, Ordering::AcqRel);
        if before != len {
            self.indexes.lock().clear();
        }
        len - before
    }

    /// publishes queued rows. Returns how many were published.
    pub fn flush(&mut self) -> usize {
        self.publish()
    }

    /// all rows, publishing any that are still queued.
    pub fn rows(&self) -> &[Row] {
        self.publish();
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.rows.len() - self.published.load(Ordering::Acquire)
    }

    fn index_of(&self, column: usize) -> KeyIndex {
        let mut indexes = self.indexes.lock();
        indexes
            .entry(column)
            .or_insert_with(|| {
                let mut index: HashMap<SqlValue, Vec<usize>> = HashMap::new();
                for (i, row) in self.rows.iter().enumerate() {
                    index.entry(row[column].clone()).or_default().push(i);
                }
                Arc::new(index)
            })
            .clone()
    }

    /// rows whose `column` equals `key`, in table order.
    pub fn rows_with_key(&self, column: &str, key: &SqlValue) -> Result<Vec<&Row>, Error> {
        let c = self.column_index(column).ok_or_else(|| Error::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        })?;
        self.publish();
        let index = self.index_of(c);
        Ok(index
            .get(key)
            .map(|ids| ids.iter().map(|i| &self.rows[*i]).collect())
            .unwrap_or_default())
    }

    pub fn has_index(&self, column: &str) -> bool {
        match self.column_index(column) {
            Some(c) => self.indexes.lock().contains_key(&c),
            None => false,
        }
    }

    pub fn streaming_iterator(&self) -> TableStreamingIterator {
        TableStreamingIterator::new(self.rows().iter())
    }

    pub fn format(&self, detailed: bool) -> String {
        formatting::format_table(self, self.rows(), detailed)
    }

    /// Printings out tables nicely.
    pub fn print(&self, detailed: bool) {
        formatting::print_table(self, self.rows(), detailed)
    }
}

/// iterates over the rows of a Table.
/// The lifetime is bound by the lifetime of the Table.
pub struct TableStreamingIterator<'a> {
    it: std::slice::Iter<'a, Row>,
    item: Option<&'a Row>,
}

impl<'a> TableStreamingIterator<'a> {
    fn new(it: std::slice::Iter<'a, Row>) -> TableStreamingIterator<'a> {
        TableStreamingIterator { it, item: None }
    }
}

impl<'a> StreamingIterator for TableStreamingIterator<'a> {
    type Item = Row;

    #[inline]
    fn advance(&mut self) {
        self.item = self.it.next();
    }

    #[inline]
    fn get(&self) -> Option<&Row> {
        self.item
    }
}

#[cfg(test)]
fn people() -> Table {
    use SqlType::*;
    Table::new(
        "people",
        vec![
            OutputColumn {
                name: "Id".to_string(),
                ty: ValueType::new(Int),
            },
            OutputColumn {
                name: "City".to_string(),
                ty: ValueType::new(Text),
            },
        ],
    )
}

#[test]
fn test_table_append_and_flush() {
    let mut tbl = people();
    tbl.append_row(vec![SqlValue::Int(1), SqlValue::from("Paris")]).unwrap();
    tbl.append_row(vec![SqlValue::Int(2), SqlValue::Null]).unwrap();
    assert_eq!(tbl.pending_len(), 2);
    assert_eq!(tbl.flush(), 2);
    assert_eq!(tbl.pending_len(), 0);
    assert_eq!(tbl.flush(), 0);
    assert_eq!(tbl.len(), 2);
    assert_eq!(tbl.column_names(), vec!["Id", "City"]);
    let mut it = tbl.streaming_iterator();
    it.advance();
    assert_eq!(it.get(), Some(&vec![SqlValue::Int(1), SqlValue::from("Paris")]));
    it.advance();
    it.advance();
    assert_eq!(it.get(), None);
}

#[test]
fn test_table_rejects_bad_rows() {
    let mut tbl = people();
    let cases = vec![
        vec![SqlValue::Int(1)],
        vec![SqlValue::Long(1), SqlValue::from("x")],
        vec![SqlValue::from("1"), SqlValue::from("x")],
    ];
    for row in cases {
        println!("Running case: {:?}", row);
        assert!(tbl.append_row(row).is_err());
    }
    assert_eq!(tbl.pending_len(), 0);
}

#[test]
fn test_key_index_is_built_lazily() {
    let mut tbl = people();
    for (id, city) in [(1, "Paris"), (2, "Oslo"), (3, "Paris")] {
        tbl.append_row(vec![SqlValue::Int(id), SqlValue::from(city)]).unwrap();
    }
    tbl.flush();
    assert!(!tbl.has_index("City"));
    let paris = tbl.rows_with_key("City", &SqlValue::from("Paris")).unwrap();
    assert_eq!(paris.len(), 2);
    assert_eq!(paris[1][0], SqlValue::Int(3));
    assert!(tbl.has_index("City"));
    tbl.flush();
    assert!(tbl.has_index("City"));
    tbl.append_row(vec![SqlValue::Int(4), SqlValue::from("Paris")]).unwrap();
    tbl.flush();
    assert!(!tbl.has_index("City"));
    assert_eq!(tbl.rows_with_key("City", &SqlValue::from("Paris")).unwrap().len(), 3);
    assert!(tbl.rows_with_key("Nope", &SqlValue::Null).is_err());
}

#[test]
fn test_first_read_publishes_pending_rows() {
    let mut tbl = people();
    tbl.append_row(vec![SqlValue::Int(1), SqlValue::from("Paris")]).unwrap();
    assert_eq!(tbl.pending_len(), 1);
    assert_eq!(tbl.rows().len(), 1);
    assert_eq!(tbl.pending_len(), 0);

    let oslo = SqlValue::from("Oslo");
    assert!(tbl.rows_with_key("City", &oslo).unwrap().is_empty());
    assert!(tbl.has_index("City"));
    tbl.append_row(vec![SqlValue::Int(2), SqlValue::from("Oslo")]).unwrap();
    let found = tbl.rows_with_key("City", &oslo).unwrap();
    assert_eq!(found, vec![&vec![SqlValue::Int(2), SqlValue::from("Oslo")]]);
    assert_eq!(tbl.pending_len(), 0);
}
