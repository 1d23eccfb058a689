//! Scopes and table symbols used while binding a script.
//!
//! Scopes live in a `ScopeArena` and refer to their parent by index. Each query block gets a
//! scope; the scope maps every alias visible in the block to a `TableSymbol` that places the
//! alias' columns inside the block's combined row.

use indexmap::IndexMap;
use thiserror::Error;

use crate::sql_type::ValueType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Column {column} is ambiguous: it exists in both {first} and {second}.")]
    AmbiguousColumn {
        column: String,
        first: String,
        second: String,
    },
    #[error("Alias {0} is already used in this scope.")]
    AliasAlreadyUsed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolColumn {
    pub name: String,
    pub ty: ValueType,
}

/// The columns one alias contributes to a combined row, starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    pub alias: String,
    pub columns: Vec<SymbolColumn>,
    pub offset: usize,
}

impl SymbolTable {
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// One or more aliased tables laid out side by side. Transformations return new symbols.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSymbol {
    tables: Vec<SymbolTable>,
}

impl TableSymbol {
    pub fn new(alias: &str, columns: Vec<SymbolColumn>) -> Self {
        TableSymbol {
            tables: vec![SymbolTable {
                alias: alias.to_string(),
                columns,
                offset: 0,
            }],
        }
    }

    /// Number of slots in a row of this symbol.
    pub fn width(&self) -> usize {
        self.tables
            .iter()
            .map(|t| t.offset + t.columns.len())
            .max()
            .unwrap_or(0)
    }

    pub fn tables(&self) -> &[SymbolTable] {
        &self.tables
    }

    pub fn table(&self, alias: &str) -> Option<&SymbolTable> {
        self.tables.iter().find(|t| t.alias == alias)
    }

    /// `self` followed by `other`, as a join lays them out.
    pub fn merge(&self, other: &TableSymbol) -> TableSymbol {
        let shift = self.width();
        let mut tables = self.tables.clone();
        tables.extend(other.tables.iter().map(|t| SymbolTable {
            offset: t.offset + shift,
            ..t.clone()
        }));
        TableSymbol { tables }
    }

    /// The same symbol with every column nullable, for the optional side of an outer join.
    pub fn make_nullable_if_possible(&self) -> TableSymbol {
        TableSymbol {
            tables: self
                .tables
                .iter()
                .map(|t| SymbolTable {
                    columns: t
                        .columns
                        .iter()
                        .map(|c| SymbolColumn {
                            name: c.name.clone(),
                            ty: c.ty.make_nullable_if_possible(),
                        })
                        .collect(),
                    ..t.clone()
                })
                .collect(),
        }
    }

    /// The same symbol exposing only the named columns, in the given order.
    pub fn limit_columns(&self, names: &[&str]) -> TableSymbol {
        TableSymbol {
            tables: self
                .tables
                .iter()
                .map(|t| SymbolTable {
                    columns: names
                        .iter()
                        .filter_map(|n| t.columns.iter().find(|c| c.name == *n).cloned())
                        .collect(),
                    ..t.clone()
                })
                .collect(),
        }
    }

    /// Slot and type of `alias.name`.
    pub fn column(&self, alias: &str, name: &str) -> Option<(usize, ValueType)> {
        let t = self.table(alias)?;
        let i = t.position(name)?;
        Some((t.offset + i, t.columns[i].ty))
    }

    /// Every column in slot order, with the alias that owns it.
    pub fn columns(&self) -> Vec<(&str, &SymbolColumn, usize)> {
        let mut v: Vec<_> = self
            .tables
            .iter()
            .flat_map(|t| {
                t.columns
                    .iter()
                    .enumerate()
                    .map(move |(i, c)| (t.alias.as_str(), c, t.offset + i))
            })
            .collect();
        v.sort_by_key(|(_, _, slot)| *slot);
        v
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeRef {
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeRef>,
    /// Describes the block, for diagnostics.
    pub label: String,
    symbols: IndexMap<String, TableSymbol>,
}

impl Scope {
    pub fn symbols(&self) -> impl Iterator<Item = (&str, &TableSymbol)> {
        self.symbols.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn symbol(&self, alias: &str) -> Option<&TableSymbol> {
        self.symbols.get(alias)
    }

    /// Find the single alias exposing `column`. Fails if more than one does.
    pub fn table_by_column_name(&self, column: &str) -> Result<Option<(&str, &TableSymbol)>, Error> {
        let mut found: Option<(&str, &TableSymbol)> = None;
        for (alias, sym) in self.symbols.iter() {
            if sym.column(alias, column).is_none() {
                continue;
            }
            if let Some((first, _)) = found {
                return Err(Error::AmbiguousColumn {
                    column: column.to_string(),
                    first: first.to_string(),
                    second: alias.clone(),
                });
            }
            found = Some((alias.as_str(), sym));
        }
        Ok(found)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parent: Option<ScopeRef>, label: &str) -> ScopeRef {
        self.scopes.push(Scope {
            parent,
            label: label.to_string(),
            symbols: IndexMap::new(),
        });
        ScopeRef {
            index: self.scopes.len() - 1,
        }
    }

    pub fn get(&self, r: ScopeRef) -> &Scope {
        &self.scopes[r.index]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// True if `alias` is bound in `r` or any enclosing scope.
    pub fn alias_in_chain(&self, r: ScopeRef, alias: &str) -> bool {
        let mut cur = Some(r);
        while let Some(s) = cur {
            let scope = self.get(s);
            if scope.symbols.contains_key(alias) {
                return true;
            }
            cur = scope.parent;
        }
        false
    }

    /// Bind `alias` in scope `r`. Aliases must be unique along the scope chain.
    pub fn add_symbol(&mut self, r: ScopeRef, alias: &str, symbol: TableSymbol) -> Result<(), Error> {
        if self.alias_in_chain(r, alias) {
            return Err(Error::AliasAlreadyUsed(alias.to_string()));
        }
        self.scopes[r.index]
            .symbols
            .insert(alias.to_string(), symbol);
        Ok(())
    }

    /// Replace the symbol bound to `alias` in scope `r`.
    pub fn replace_symbol(&mut self, r: ScopeRef, alias: &str, symbol: TableSymbol) {
        self.scopes[r.index]
            .symbols
            .insert(alias.to_string(), symbol);
    }
}

#[cfg(test)]
fn cols(names: &[&str]) -> Vec<SymbolColumn> {
    use crate::sql_type::SqlType;
    names
        .iter()
        .map(|n| SymbolColumn {
            name: n.to_string(),
            ty: ValueType::new(SqlType::Int),
        })
        .collect()
}

#[test]
fn test_merge_shifts_offsets_and_keeps_inputs() {
    let a = TableSymbol::new("a", cols(&["Id", "Name"]));
    let b = TableSymbol::new("b", cols(&["Id", "City"]));
    let m = a.merge(&b);
    assert_eq!(m.width(), 4);
    assert_eq!(m.column("b", "City").map(|c| c.0), Some(3));
    assert_eq!(a.width(), 2);
    assert_eq!(b.column("b", "City").map(|c| c.0), Some(1));
}

#[test]
fn test_make_nullable_returns_new_symbol() {
    let a = TableSymbol::new("a", cols(&["Id"]));
    let n = a.make_nullable_if_possible();
    assert!(n.column("a", "Id").unwrap().1.nullable);
    assert!(!a.column("a", "Id").unwrap().1.nullable);
}

#[test]
fn test_limit_columns_drops_the_rest() {
    let a = TableSymbol::new("a", cols(&["Id", "Name", "City"]));
    let l = a.limit_columns(&["City", "Id"]);
    assert_eq!(l.tables()[0].columns.len(), 2);
    assert_eq!(l.column("a", "Name"), None);
}

#[test]
fn test_ambiguous_column_names_both_aliases() {
    let mut arena = ScopeArena::new();
    let s = arena.push(None, "select");
    let a = TableSymbol::new("a", cols(&["Id", "Name"]));
    let b = a.merge(&TableSymbol::new("b", cols(&["Name"])));
    arena.add_symbol(s, "a", a).unwrap();
    arena.replace_symbol(s, "b", b);
    match arena.get(s).table_by_column_name("Name") {
        Err(Error::AmbiguousColumn { first, second, .. }) => {
            assert_eq!((first.as_str(), second.as_str()), ("a", "b"))
        }
        r => panic!("unexpected {:?}", r),
    }
    assert_eq!(arena.get(s).table_by_column_name("Id").unwrap().map(|x| x.0), Some("a"));
}

#[test]
fn test_alias_unique_along_chain() {
    let mut arena = ScopeArena::new();
    let outer = arena.push(None, "outer");
    let inner = arena.push(Some(outer), "inner");
    arena
        .add_symbol(outer, "x", TableSymbol::new("x", cols(&["Id"])))
        .unwrap();
    assert_eq!(
        arena.add_symbol(inner, "x", TableSymbol::new("x", cols(&["Id"]))),
        Err(Error::AliasAlreadyUsed("x".to_string()))
    );
}
