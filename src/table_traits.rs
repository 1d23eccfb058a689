//! Traits common to result tables.

use crate::sql_type::ValueType;

pub trait TableMeta {
    fn table_name(&self) -> String;
    fn column_names(&self) -> Vec<String>;
    fn column_types(&self) -> Vec<ValueType>;
}
