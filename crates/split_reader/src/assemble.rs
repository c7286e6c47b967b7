//! Concatenation of per-shard tables.
use arrow::datatypes::SchemaRef;

use crate::errors::{Result, SplitReadError};
use crate::table::Table;

/// Concatenate tables in order.
///
/// `fallback_schema` is used only when there are no tables. The result of a
/// single table is that table, untouched.
pub fn assemble(
    label: &str,
    tables: Vec<Table>,
    fallback_schema: Option<SchemaRef>,
) -> Result<Table> {
    let mut tables = tables.into_iter();
    let mut out = match tables.next() {
        Some(first) => first,
        None => {
            return fallback_schema
                .map(Table::new_empty)
                .ok_or_else(|| SplitReadError::EmptySchema(label.to_string()));
        }
    };

    for table in tables {
        check_schema(out.schema(), table.schema())?;
        out.append_unchecked(table);
    }

    Ok(out)
}

/// Check that two schemas have the same column names, order, types, and
/// nullability.
fn check_schema(expected: &SchemaRef, got: &SchemaRef) -> Result<()> {
    let mut conflicting = Vec::new();

    let exp_fields = expected.fields();
    let got_fields = got.fields();
    for idx in 0..exp_fields.len().max(got_fields.len()) {
        match (exp_fields.get(idx), got_fields.get(idx)) {
            (Some(a), Some(b)) => {
                if a.name() != b.name() {
                    conflicting.push(a.name().clone());
                    conflicting.push(b.name().clone());
                } else if a.data_type() != b.data_type() || a.is_nullable() != b.is_nullable() {
                    conflicting.push(a.name().clone());
                }
            }
            (Some(f), None) | (None, Some(f)) => conflicting.push(f.name().clone()),
            (None, None) => unreachable!("idx within longest field list"),
        }
    }

    if conflicting.is_empty() {
        return Ok(());
    }

    let names = |s: &SchemaRef| {
        s.fields()
            .iter()
            .map(|f| {
                let null = if f.is_nullable() { "" } else { " not null" };
                format!("{}: {}{null}", f.name(), f.data_type())
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    Err(SplitReadError::SchemaMismatch {
        msg: format!("expected [{}], got [{}]", names(expected), names(got)),
        columns: conflicting,
    })
}
