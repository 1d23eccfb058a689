//! formatting prints out tables nicely.

use crate::sql_value::SqlValue;
use crate::table_traits::TableMeta;

fn format_line<T: ToString>(cells: impl Iterator<Item = T>) -> String {
    format!(
        "   | {} |",
        cells
            .map(|x| format!("{:15}", x.to_string()))
            .collect::<Vec<String>>()
            .join(" | ")
    )
}

/// Render a header, optionally the column types, and one line per row.
pub fn format_table(table: &dyn TableMeta, rows: &[Vec<SqlValue>], detailed: bool) -> String {
    let mut lines = vec![format_line(table.column_names().into_iter())];
    if detailed {
        lines.push(format_line(table.column_types().into_iter()));
    }
    for row in rows {
        lines.push(format_line(row.iter()));
    }
    lines.join("\n")
}

pub fn print_table(table: &dyn TableMeta, rows: &[Vec<SqlValue>], detailed: bool) {
    println!("Table {}", table.table_name());
    println!("{}", format_table(table, rows, detailed));
}

#[cfg(test)]
struct Fixed;

#[cfg(test)]
impl TableMeta for Fixed {
    fn table_name(&self) -> String {
        "t".to_string()
    }
    fn column_names(&self) -> Vec<String> {
        vec!["Id".to_string(), "Name".to_string()]
    }
    fn column_types(&self) -> Vec<crate::sql_type::ValueType> {
        use crate::sql_type::{SqlType, ValueType};
        vec![ValueType::new(SqlType::Int), ValueType::new(SqlType::Text)]
    }
}

#[test]
fn test_format_table() {
    let rows = vec![vec![SqlValue::Int(1), SqlValue::from("ada")]];
    let expected = [
        format!("   | {:15} | {:15} |", "Id", "Name"),
        format!("   | {:15} | {:15} |", "int", "string"),
        format!("   | {:15} | {:15} |", "1", "ada"),
    ];
    assert_eq!(format_table(&Fixed, &rows, true), expected.join("\n"));
    assert_eq!(
        format_table(&Fixed, &rows, false),
        [expected[0].clone(), expected[2].clone()].join("\n")
    );
}
