//! Grouping for aggregation.
//!
//! A grouped block with keys `k1..kn` keeps one `Group` per key prefix: the root (empty key),
//! `(k1)`, `(k1, k2)` and so on up to the full key. Each group links to its parent, the group of
//! the prefix one shorter. Groups live in a `GroupArena` and refer to each other by index.
//!
//! An aggregate accumulates in the group at depth `n - level`, so `Count(Id, 1)` in a block
//! grouped by `City, Name` counts rows per `City`. Output rows come from the full-key groups in
//! the order their keys were first seen; when the block has no keys the root is the only output
//! group, even if no rows arrived.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::codegen::EvalContext;
use crate::method::{Accumulator, AggregateMethod};
use crate::sql_value::SqlValue;

/// The values of a group's keys. Equality is structural over the ordered values, with `NULL`
/// equal to `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GroupKey(pub Vec<SqlValue>);

pub struct Group {
    pub key: GroupKey,
    pub parent: Option<usize>,
    hits: usize,
    accumulators: Vec<Option<Box<dyn Accumulator>>>,
    /// Converted values, filled on first read.
    values: RefCell<HashMap<String, SqlValue>>,
}

impl Group {
    /// Number of rows that fell into this group.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// The value stored under `name`, computing it with `convert` the first time it is asked for.
    pub fn get_or_convert<F: FnOnce() -> SqlValue>(&self, name: &str, convert: F) -> SqlValue {
        if let Some(v) = self.values.borrow().get(name) {
            return v.clone();
        }
        let v = convert();
        self.values.borrow_mut().insert(name.to_string(), v.clone());
        v
    }

    fn depth(&self) -> usize {
        self.key.0.len()
    }
}

pub struct GroupArena {
    groups: Vec<Group>,
    by_key: HashMap<GroupKey, usize>,
    key_count: usize,
    aggregates: Vec<(Arc<AggregateMethod>, usize)>,
    /// Full-key groups in first-seen order.
    leaves: Vec<usize>,
}

impl GroupArena {
    /// `aggregates` holds each aggregate's method and level.
    pub fn new(key_count: usize, aggregates: Vec<(Arc<AggregateMethod>, usize)>) -> Self {
        let mut arena = GroupArena {
            groups: vec![],
            by_key: HashMap::new(),
            key_count,
            aggregates,
            leaves: vec![],
        };
        arena.create(GroupKey::default(), None);
        arena
    }

    fn create(&mut self, key: GroupKey, parent: Option<usize>) -> usize {
        let depth = key.0.len();
        let accumulators = self
            .aggregates
            .iter()
            .map(|(method, level)| match self.key_count.checked_sub(*level) == Some(depth) {
                true => Some(method.accumulator()),
                false => None,
            })
            .collect();
        let id = self.groups.len();
        self.groups.push(Group {
            key: key.clone(),
            parent,
            hits: 0,
            accumulators,
            values: RefCell::new(HashMap::new()),
        });
        self.by_key.insert(key, id);
        if depth == self.key_count {
            self.leaves.push(id);
        }
        id
    }

    /// Add one row with the given key values and per-aggregate argument values.
    pub fn add_row(&mut self, key: Vec<SqlValue>, args: &[Vec<SqlValue>]) -> anyhow::Result<usize> {
        let mut current = 0;
        self.groups[current].hits += 1;
        for depth in 1..=key.len() {
            let prefix = GroupKey(key[..depth].to_vec());
            current = match self.by_key.get(&prefix) {
                Some(id) => *id,
                None => self.create(prefix, Some(current)),
            };
            self.groups[current].hits += 1;
        }
        let mut node = Some(current);
        while let Some(id) = node {
            let group = &mut self.groups[id];
            for (acc, values) in group.accumulators.iter_mut().zip(args) {
                if let Some(acc) = acc {
                    acc.update(values)?;
                }
            }
            node = group.parent;
        }
        Ok(current)
    }

    pub fn group(&self, id: usize) -> &Group {
        &self.groups[id]
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Output groups, in first-seen order.
    pub fn output(&self) -> impl Iterator<Item = GroupRow<'_>> {
        self.leaves.iter().map(move |id| GroupRow {
            arena: self,
            group: *id,
        })
    }

    fn ancestor(&self, mut id: usize, levels: usize) -> usize {
        for _ in 0..levels {
            match self.groups[id].parent {
                Some(p) => id = p,
                None => break,
            }
        }
        id
    }
}

/// One output group, readable by compiled expressions.
pub struct GroupRow<'a> {
    arena: &'a GroupArena,
    group: usize,
}

impl<'a> GroupRow<'a> {
    pub fn group(&self) -> &'a Group {
        self.arena.group(self.group)
    }
}

impl<'a> EvalContext for GroupRow<'a> {
    fn slot(&self, _: usize) -> SqlValue {
        SqlValue::Null
    }

    fn group_key(&self, index: usize) -> SqlValue {
        self.group().key.0.get(index).cloned().unwrap_or(SqlValue::Null)
    }

    fn aggregate(&self, index: usize) -> SqlValue {
        let level = match self.arena.aggregates.get(index) {
            Some((_, level)) => *level,
            None => return SqlValue::Null,
        };
        let owner = self.arena.group(self.arena.ancestor(self.group, level));
        owner.get_or_convert(&format!("$agg{}", index), || {
            match owner.accumulators.get(index) {
                Some(Some(acc)) => acc.finish(),
                _ => SqlValue::Null,
            }
        })
    }
}

#[cfg(test)]
fn aggregate(name: &str) -> Arc<AggregateMethod> {
    use crate::method::{Resolution, ResolvedMethod};
    use crate::sql_type::{SqlType, ValueType};
    let args: Vec<ValueType> = match name {
        "Count" => vec![],
        _ => vec![ValueType::new(SqlType::Long)],
    };
    match crate::builtin::core_library().resolve(name, &args) {
        Resolution::Found(ResolvedMethod::Aggregate(m)) => m,
        r => panic!("unexpected {:?}", r),
    }
}

#[cfg(test)]
fn key(values: &[&str]) -> Vec<SqlValue> {
    values.iter().map(|v| SqlValue::from(*v)).collect()
}

#[test]
fn test_groups_per_prefix_and_levels() {
    let mut arena = GroupArena::new(
        2,
        vec![(aggregate("Count"), 0), (aggregate("Count"), 1), (aggregate("Sum"), 2)],
    );
    let rows = vec![
        (key(&["Paris", "ann"]), 1),
        (key(&["Berlin", "bob"]), 2),
        (key(&["Paris", "cid"]), 3),
        (key(&["Paris", "ann"]), 4),
    ];
    for (k, n) in rows {
        let args = vec![vec![], vec![], vec![SqlValue::Long(n)]];
        arena.add_row(k, &args).unwrap();
    }
    // root, Paris, Paris/ann, Berlin, Berlin/bob, Paris/cid
    assert_eq!(arena.len(), 6);
    let out: Vec<(Vec<SqlValue>, SqlValue, SqlValue, SqlValue)> = arena
        .output()
        .map(|g| (g.group().key.0.clone(), g.aggregate(0), g.aggregate(1), g.aggregate(2)))
        .collect();
    assert_eq!(
        out,
        vec![
            (key(&["Paris", "ann"]), SqlValue::Int(2), SqlValue::Int(3), SqlValue::Long(10)),
            (key(&["Berlin", "bob"]), SqlValue::Int(1), SqlValue::Int(1), SqlValue::Long(10)),
            (key(&["Paris", "cid"]), SqlValue::Int(1), SqlValue::Int(3), SqlValue::Long(10)),
        ]
    );
    let first = arena.output().next().unwrap();
    assert_eq!(first.group().hits(), 2);
    assert_eq!(arena.group(first.group().parent.unwrap()).hits(), 3);
    assert_eq!(arena.group(0).hits(), 4);
    assert_eq!(first.group_key(1), SqlValue::from("ann"));
}

#[test]
fn test_keyless_grouping_has_one_group_even_when_empty() {
    let arena = GroupArena::new(0, vec![(aggregate("Count"), 0)]);
    let out: Vec<SqlValue> = arena.output().map(|g| g.aggregate(0)).collect();
    assert_eq!(out, vec![SqlValue::Int(0)]);

    let keyed = GroupArena::new(1, vec![(aggregate("Count"), 0)]);
    assert_eq!(keyed.output().count(), 0);
}

#[test]
fn test_converted_values_are_cached_per_name() {
    let arena = GroupArena::new(0, vec![]);
    let g = arena.group(0);
    let mut calls = 0;
    assert_eq!(g.get_or_convert("x", || { calls += 1; SqlValue::Int(1) }), SqlValue::Int(1));
    assert_eq!(g.get_or_convert("x", || { calls += 1; SqlValue::Int(2) }), SqlValue::Int(1));
    assert_eq!(calls, 1);
}

#[test]
fn test_null_keys_group_together() {
    let mut arena = GroupArena::new(1, vec![(aggregate("Count"), 0)]);
    for k in [SqlValue::Null, SqlValue::from("a"), SqlValue::Null] {
        arena.add_row(vec![k], &[vec![]]).unwrap();
    }
    let counts: Vec<SqlValue> = arena.output().map(|g| g.aggregate(0)).collect();
    assert_eq!(counts, vec![SqlValue::Int(2), SqlValue::Int(1)]);
}
