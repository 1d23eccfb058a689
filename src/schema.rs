//! The contract data-source plugins implement.
//!
//! A `SchemaProvider` hands out `Schema`s by name. A schema describes the tables its methods
//! return (`get_table_by_name`, used at compile time) and produces a `RowSource` for one
//! invocation at run time. Rows are exposed through `ObjectResolver`s.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::method::MethodLibrary;
use crate::source_info::QuerySourceInfo;
use crate::sql_type::ValueType;
use crate::sql_value::SqlValue;
use crate::stream::CancellationToken;

pub trait SchemaProvider: Send + Sync {
    fn get_schema(&self, name: &str) -> Option<Arc<dyn Schema>>;

    /// Identifies the provider implementation. Compiled artifacts are only reused for the same
    /// query text and the same identity.
    fn identity(&self) -> String;
}

pub trait Schema: Send + Sync {
    fn name(&self) -> &str;

    /// Describe the table returned by method `name` called with `args`. `Ok(None)` means the
    /// schema has no such method.
    fn get_table_by_name(
        &self,
        name: &str,
        ctx: &TableContext,
        args: &[SqlValue],
    ) -> anyhow::Result<Option<SchemaTable>>;

    /// Start one invocation of method `name`.
    fn get_row_source(
        &self,
        name: &str,
        ctx: &RuntimeContext,
        args: &[SqlValue],
    ) -> anyhow::Result<Box<dyn RowSource>>;

    /// Methods callable in expressions over this schema's rows.
    fn methods(&self) -> &MethodLibrary;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    pub index: usize,
    pub ty: ValueType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaTable {
    pub columns: Vec<SchemaColumn>,
}

impl SchemaTable {
    pub fn new(columns: Vec<(&str, ValueType)>) -> Self {
        SchemaTable {
            columns: columns
                .into_iter()
                .enumerate()
                .map(|(index, (name, ty))| SchemaColumn {
                    name: name.to_string(),
                    index,
                    ty,
                })
                .collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// What a schema learns about the invocation whose table it is describing.
#[derive(Debug, Clone)]
pub struct TableContext {
    pub alias: String,
    pub ordinal: usize,
}

/// What a row source receives when it is started.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub info: QuerySourceInfo,
    pub cancellation: CancellationToken,
    /// Variables supplied by the caller for this source's ordinal.
    pub environment: HashMap<String, String>,
}

pub type RowIter = Box<dyn Iterator<Item = anyhow::Result<Box<dyn ObjectResolver>>> + Send>;

/// A lazy sequence of rows. `rows` consumes the source, so it can be iterated at most once.
pub trait RowSource: Send {
    fn rows(self: Box<Self>) -> RowIter;
}

/// Read access to one row. Access must not have side effects.
pub trait ObjectResolver: Send + Sync {
    fn get(&self, name: &str) -> Option<SqlValue>;

    fn get_at(&self, index: usize) -> Option<SqlValue>;

    /// The objects the row was produced from, if the source exposes them.
    fn contexts(&self) -> Vec<Arc<dyn Any + Send + Sync>> {
        vec![]
    }
}

/// Column names of a dynamically shaped row, built once and shared by every row of that shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowShape {
    names: IndexMap<String, usize>,
}

impl RowShape {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        RowShape {
            names: names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.as_ref().to_string(), i))
                .collect(),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(|s| s.as_str())
    }
}

/// A row of values paired with its shape.
#[derive(Debug, Clone)]
pub struct ShapedRow {
    shape: Arc<RowShape>,
    values: Arc<Vec<SqlValue>>,
}

impl ShapedRow {
    pub fn new(shape: Arc<RowShape>, values: Vec<SqlValue>) -> Self {
        ShapedRow {
            shape,
            values: Arc::new(values),
        }
    }
}

impl ObjectResolver for ShapedRow {
    fn get(&self, name: &str) -> Option<SqlValue> {
        self.shape
            .index_of(name)
            .and_then(|i| self.values.get(i).cloned())
    }

    fn get_at(&self, index: usize) -> Option<SqlValue> {
        self.values.get(index).cloned()
    }

    fn contexts(&self) -> Vec<Arc<dyn Any + Send + Sync>> {
        let values: Arc<dyn Any + Send + Sync> = self.values.clone();
        vec![values]
    }
}

#[test]
fn test_shaped_row_lookup() {
    let shape = Arc::new(RowShape::new(&["Id", "Name"]));
    let row = ShapedRow::new(shape.clone(), vec![SqlValue::Int(1), SqlValue::from("ada")]);
    assert_eq!(row.get("Name"), Some(SqlValue::from("ada")));
    assert_eq!(row.get_at(0), Some(SqlValue::Int(1)));
    assert_eq!(row.get("Missing"), None);
    assert_eq!(row.contexts().len(), 1);
    assert_eq!(shape.names().collect::<Vec<_>>(), vec!["Id", "Name"]);
}
