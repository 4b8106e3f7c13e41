use crate::domain::queries::{self, DocumentFilter, SortSpec};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// The storage type backing a queryable field, which decides how caller-supplied JSON
/// values get bound.
#[derive(Clone, Copy)]
pub enum FieldKind {
    Id,
    Text,
    Boolean,
    Timestamp,
    /// An array of id strings. Scalar comparisons become containment checks, matching how
    /// a document store treats filters on array fields.
    IdList,
}

/// Maps one API-visible field name onto its column. Only mapped fields are queryable —
/// everything else compiles to a condition no stored document can satisfy, which doubles
/// as the guard keeping caller input out of the generated SQL text.
pub struct FieldMapping {
    pub api_name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

fn mapping_for<'f>(fields: &'f [FieldMapping], api_name: &str) -> Option<&'f FieldMapping> {
    fields.iter().find(|mapping| mapping.api_name == api_name)
}

/// Appends a WHERE clause compiled from the caller's filter. An empty filter matches all.
pub fn push_filter(
    query: &mut QueryBuilder<Postgres>,
    filter: &DocumentFilter,
    fields: &[FieldMapping],
) {
    query.push(" WHERE ");
    push_conjunction(query, &filter.0, fields);
}

fn push_conjunction(
    query: &mut QueryBuilder<Postgres>,
    conditions: &Map<String, Value>,
    fields: &[FieldMapping],
) {
    if conditions.is_empty() {
        query.push("TRUE");
        return;
    }

    let mut first = true;
    for (key, value) in conditions {
        if !first {
            query.push(" AND ");
        }
        first = false;
        push_condition(query, key, value, fields);
    }
}

fn push_condition(
    query: &mut QueryBuilder<Postgres>,
    key: &str,
    value: &Value,
    fields: &[FieldMapping],
) {
    match key {
        "$or" | "$and" => push_logical(query, key, value, fields),
        _ => match mapping_for(fields, key) {
            Some(mapping) => push_field_condition(query, mapping, value),
            // a filter on a field no document carries matches nothing
            None => {
                query.push("FALSE");
            }
        },
    }
}

fn push_logical(
    query: &mut QueryBuilder<Postgres>,
    operator: &str,
    value: &Value,
    fields: &[FieldMapping],
) {
    let Value::Array(branches) = value else {
        query.push("FALSE");
        return;
    };
    if branches.is_empty() {
        query.push("FALSE");
        return;
    }

    let joiner = if operator == "$or" { " OR " } else { " AND " };
    query.push("(");
    let mut first = true;
    for branch in branches {
        if !first {
            query.push(joiner);
        }
        first = false;

        match branch {
            Value::Object(conditions) => {
                query.push("(");
                push_conjunction(query, conditions, fields);
                query.push(")");
            }
            _ => {
                query.push("FALSE");
            }
        }
    }
    query.push(")");
}

fn push_field_condition(
    query: &mut QueryBuilder<Postgres>,
    mapping: &FieldMapping,
    value: &Value,
) {
    if let Value::Object(operators) = value {
        if operators.keys().any(|key| key.starts_with('$')) {
            query.push("(");
            let mut first = true;
            for (operator, operand) in operators {
                if !first {
                    query.push(" AND ");
                }
                first = false;
                push_operator(query, mapping, operator, operand);
            }
            query.push(")");
        } else {
            // no stored column holds a nested document
            query.push("FALSE");
        }
        return;
    }

    push_comparison(query, mapping, "=", value);
}

fn push_operator(
    query: &mut QueryBuilder<Postgres>,
    mapping: &FieldMapping,
    operator: &str,
    operand: &Value,
) {
    match operator {
        "$eq" => push_comparison(query, mapping, "=", operand),
        "$ne" => push_comparison(query, mapping, "<>", operand),
        "$gt" => push_comparison(query, mapping, ">", operand),
        "$gte" => push_comparison(query, mapping, ">=", operand),
        "$lt" => push_comparison(query, mapping, "<", operand),
        "$lte" => push_comparison(query, mapping, "<=", operand),
        "$in" => push_membership(query, mapping, operand, false),
        "$nin" => push_membership(query, mapping, operand, true),
        _ => {
            query.push("FALSE");
        }
    }
}

enum Bound {
    Id(Uuid),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

fn bound_value(kind: FieldKind, value: &Value) -> Option<Bound> {
    match (kind, value) {
        (FieldKind::Id, Value::String(raw)) => Uuid::try_parse(raw).ok().map(Bound::Id),
        (FieldKind::Text, Value::String(raw)) => Some(Bound::Text(raw.clone())),
        (FieldKind::Boolean, Value::Bool(flag)) => Some(Bound::Boolean(*flag)),
        (FieldKind::Timestamp, Value::String(raw)) => {
            queries::parse_timestamp(raw).map(Bound::Timestamp)
        }
        _ => None,
    }
}

fn push_bound(query: &mut QueryBuilder<Postgres>, bound: Bound) {
    match bound {
        Bound::Id(id) => query.push_bind(id),
        Bound::Text(text) => query.push_bind(text),
        Bound::Boolean(flag) => query.push_bind(flag),
        Bound::Timestamp(timestamp) => query.push_bind(timestamp),
    };
}

fn push_comparison(
    query: &mut QueryBuilder<Postgres>,
    mapping: &FieldMapping,
    sql_operator: &str,
    value: &Value,
) {
    if let FieldKind::IdList = mapping.kind {
        push_list_comparison(query, mapping, sql_operator, value);
        return;
    }

    match bound_value(mapping.kind, value) {
        Some(bound) => {
            query.push(mapping.column).push(" ").push(sql_operator).push(" ");
            push_bound(query, bound);
        }
        // a type-mismatched comparison matches nothing
        None => {
            query.push("FALSE");
        }
    }
}

fn push_list_comparison(
    query: &mut QueryBuilder<Postgres>,
    mapping: &FieldMapping,
    sql_operator: &str,
    value: &Value,
) {
    match (sql_operator, value) {
        // scalar equality on an array field means containment
        ("=", Value::String(raw)) => {
            query.push_bind(raw.clone());
            query.push(" = ANY(").push(mapping.column).push(")");
        }
        ("<>", Value::String(raw)) => {
            query.push("NOT (");
            query.push_bind(raw.clone());
            query.push(" = ANY(").push(mapping.column).push("))");
        }
        // array equality is an exact match on the stored sequence
        ("=", Value::Array(items)) => {
            let texts: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect();
            match texts {
                Some(texts) => {
                    query.push(mapping.column).push(" = ");
                    query.push_bind(texts);
                }
                None => {
                    query.push("FALSE");
                }
            }
        }
        _ => {
            query.push("FALSE");
        }
    }
}

fn push_membership(
    query: &mut QueryBuilder<Postgres>,
    mapping: &FieldMapping,
    operand: &Value,
    negated: bool,
) {
    let Value::Array(items) = operand else {
        query.push("FALSE");
        return;
    };

    // Unconvertible entries can never match, so they drop out of the candidate set. An
    // empty set matches nothing, which the surrounding NOT turns back into match-all for
    // the negated form.
    let empty_result = "FALSE";
    if negated {
        query.push("NOT (");
    }

    match mapping.kind {
        FieldKind::Id => {
            let ids: Vec<Uuid> = items
                .iter()
                .filter_map(|item| item.as_str().and_then(|raw| Uuid::try_parse(raw).ok()))
                .collect();
            if ids.is_empty() {
                query.push(empty_result);
            } else {
                query.push(mapping.column).push(" = ANY(");
                query.push_bind(ids);
                query.push(")");
            }
        }
        FieldKind::Text => {
            let texts: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect();
            if texts.is_empty() {
                query.push(empty_result);
            } else {
                query.push(mapping.column).push(" = ANY(");
                query.push_bind(texts);
                query.push(")");
            }
        }
        FieldKind::Boolean => {
            let flags: Vec<bool> = items.iter().filter_map(Value::as_bool).collect();
            if flags.is_empty() {
                query.push(empty_result);
            } else {
                query.push(mapping.column).push(" = ANY(");
                query.push_bind(flags);
                query.push(")");
            }
        }
        FieldKind::Timestamp => {
            let timestamps: Vec<DateTime<Utc>> = items
                .iter()
                .filter_map(|item| item.as_str().and_then(queries::parse_timestamp))
                .collect();
            if timestamps.is_empty() {
                query.push(empty_result);
            } else {
                query.push(mapping.column).push(" = ANY(");
                query.push_bind(timestamps);
                query.push(")");
            }
        }
        FieldKind::IdList => {
            // membership against an array field: match when the arrays share any element
            let texts: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect();
            if texts.is_empty() {
                query.push(empty_result);
            } else {
                query.push(mapping.column).push(" && ");
                query.push_bind(texts);
            }
        }
    }

    if negated {
        query.push(")");
    }
}

/// Appends an ORDER BY clause for the mapped sort keys. Unknown fields are skipped; if
/// nothing is left, no ordering is applied.
pub fn push_sort(query: &mut QueryBuilder<Postgres>, sort: &SortSpec, fields: &[FieldMapping]) {
    let known: Vec<_> = sort
        .0
        .iter()
        .filter_map(|(field, direction)| {
            mapping_for(fields, field).map(|mapping| (mapping, *direction))
        })
        .collect();
    if known.is_empty() {
        return;
    }

    query.push(" ORDER BY ");
    let mut first = true;
    for (mapping, direction) in known {
        if !first {
            query.push(", ");
        }
        first = false;
        query.push(mapping.column).push(" ").push(direction);
    }
}

/// Appends LIMIT/OFFSET for the caller's pagination parameters.
pub fn push_page(query: &mut QueryBuilder<Postgres>, skip: Option<u64>, limit: Option<u64>) {
    if let Some(limit) = limit {
        query.push(" LIMIT ");
        query.push_bind(limit as i64);
    }
    if let Some(skip) = skip {
        query.push(" OFFSET ");
        query.push_bind(skip as i64);
    }
}
