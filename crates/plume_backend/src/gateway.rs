//! Raw statement gateway: caller-supplied SQL text with JSON parameters.
//!
//! The typed store methods cover every known query shape; this module is the
//! escape hatch for the dynamic queries the UI layer still issues. SQL and
//! parameters are treated as opaque. Callers of the swallowing wrappers in
//! `sqlite_store` cannot distinguish "no rows matched" from "query failed";
//! that ambiguity is part of the contract and diagnostic detail goes to the
//! log only.

use anyhow::{Context as _, anyhow};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Statement, ToSql, params_from_iter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row, keyed by column name in select-list order.
pub type Row = serde_json::Map<String, Value>;

/// One statement of a batch. `params` follows the same shapes as single
/// statements, plus list-of-lists for bulk application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchStatement {
    pub sql: String,
    #[serde(default)]
    pub params: Value,
}

/// Runs a single statement. Statements that produce rows are rejected.
pub(crate) fn run(conn: &Connection, sql: &str, params: &Value) -> anyhow::Result<()> {
    let mut stmt = prepare(conn, sql)?;
    let bound = bind_values(&stmt, params)?;
    execute_bound(&mut stmt, &bound).with_context(|| format!("failed to run: {sql}"))?;
    Ok(())
}

/// Returns every matching row as a column-name → JSON-value map.
pub(crate) fn query_all(conn: &Connection, sql: &str, params: &Value) -> anyhow::Result<Vec<Row>> {
    let mut stmt = prepare(conn, sql)?;
    let bound = bind_values(&stmt, params)?;
    query_bound(&mut stmt, &bound).with_context(|| format!("failed to query: {sql}"))
}

/// Returns the first matching row, or `None`.
pub(crate) fn query_one(
    conn: &Connection,
    sql: &str,
    id: &Value,
) -> anyhow::Result<Option<Row>> {
    let mut stmt = prepare(conn, sql)?;
    let bound = bind_values(&stmt, id)?;
    let rows = query_bound(&mut stmt, &bound).with_context(|| format!("failed to query: {sql}"))?;
    Ok(rows.into_iter().next())
}

/// Runs an ordered batch as one atomic unit. Every statement is prepared
/// before any data is touched, so a malformed statement anywhere fails the
/// batch without side effects. A statement whose params are a list of lists
/// runs once per inner list, in order; any other shape runs once.
pub(crate) fn run_batch(conn: &Connection, statements: &[BatchStatement]) -> anyhow::Result<()> {
    let mut prepared = Vec::with_capacity(statements.len());
    for statement in statements {
        prepared.push(prepare(conn, &statement.sql)?);
    }

    conn.execute_batch("BEGIN IMMEDIATE;")
        .context("failed to begin batch transaction")?;
    let result = run_prepared_batch(&mut prepared, statements);
    if result.is_ok() {
        conn.execute_batch("COMMIT;")
            .context("failed to commit batch transaction")?;
    } else {
        let _ = conn.execute_batch("ROLLBACK;");
    }
    result
}

fn run_prepared_batch(
    prepared: &mut [Statement<'_>],
    statements: &[BatchStatement],
) -> anyhow::Result<()> {
    for (stmt, statement) in prepared.iter_mut().zip(statements) {
        match &statement.params {
            Value::Array(elements) if elements.iter().any(Value::is_array) => {
                for element in elements {
                    let bound = bind_values(stmt, element)?;
                    execute_bound(stmt, &bound)
                        .with_context(|| format!("failed to run: {}", statement.sql))?;
                }
            }
            params => {
                let bound = bind_values(stmt, params)?;
                execute_bound(stmt, &bound)
                    .with_context(|| format!("failed to run: {}", statement.sql))?;
            }
        }
    }
    Ok(())
}

fn prepare<'conn>(conn: &'conn Connection, sql: &str) -> anyhow::Result<Statement<'conn>> {
    conn.prepare(sql)
        .with_context(|| format!("failed to prepare: {sql}"))
}

enum Bound {
    Positional(Vec<SqlValue>),
    Named(Vec<(String, SqlValue)>),
}

/// Converts JSON params into bindable values. `Null` binds nothing, an array
/// binds positionally, an object binds by name, any other scalar binds as
/// the single positional parameter.
fn bind_values(stmt: &Statement<'_>, params: &Value) -> anyhow::Result<Bound> {
    match params {
        Value::Null => Ok(Bound::Positional(Vec::new())),
        Value::Array(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(to_sql_value(element)?);
            }
            Ok(Bound::Positional(values))
        }
        Value::Object(entries) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let name = named_parameter(stmt, key)?
                    .ok_or_else(|| anyhow!("no such statement parameter: {key}"))?;
                pairs.push((name, to_sql_value(value)?));
            }
            Ok(Bound::Named(pairs))
        }
        scalar => Ok(Bound::Positional(vec![to_sql_value(scalar)?])),
    }
}

/// Object keys arrive bare; the statement text may spell the placeholder
/// with any of the three SQLite prefixes.
fn named_parameter(stmt: &Statement<'_>, key: &str) -> anyhow::Result<Option<String>> {
    for prefix in [':', '@', '$'] {
        let name = format!("{prefix}{key}");
        if stmt
            .parameter_index(&name)
            .with_context(|| format!("failed to resolve parameter {key}"))?
            .is_some()
        {
            return Ok(Some(name));
        }
    }
    Ok(None)
}

fn to_sql_value(value: &Value) -> anyhow::Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Ok(SqlValue::Integer(int))
            } else if let Some(real) = number.as_f64() {
                Ok(SqlValue::Real(real))
            } else {
                Err(anyhow!("unbindable numeric parameter: {number}"))
            }
        }
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        Value::Array(_) | Value::Object(_) => {
            Err(anyhow!("nested value cannot bind as a single parameter"))
        }
    }
}

fn execute_bound(stmt: &mut Statement<'_>, bound: &Bound) -> rusqlite::Result<usize> {
    match bound {
        Bound::Positional(values) => stmt.execute(params_from_iter(values.iter())),
        Bound::Named(pairs) => {
            let refs: Vec<(&str, &dyn ToSql)> = pairs
                .iter()
                .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
                .collect();
            stmt.execute(refs.as_slice())
        }
    }
}

fn query_bound(stmt: &mut Statement<'_>, bound: &Bound) -> rusqlite::Result<Vec<Row>> {
    let names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| (*name).to_owned())
        .collect();
    let mut rows = match bound {
        Bound::Positional(values) => stmt.query(params_from_iter(values.iter()))?,
        Bound::Named(pairs) => {
            let refs: Vec<(&str, &dyn ToSql)> = pairs
                .iter()
                .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
                .collect();
            stmt.query(refs.as_slice())?
        }
    };

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut mapped = Row::new();
        for (index, name) in names.iter().enumerate() {
            mapped.insert(name.clone(), from_sql_value(row.get(index)?));
        }
        out.push(mapped);
    }
    Ok(out)
}

fn from_sql_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(int) => Value::from(int),
        SqlValue::Real(real) => serde_json::Number::from_f64(real)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(text) => Value::String(text),
        SqlValue::Blob(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (id TEXT PRIMARY KEY, body TEXT, score INTEGER);",
        )
        .unwrap();
        conn
    }

    fn note_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn positional_params_round_trip() {
        let conn = memory_db();
        run(
            &conn,
            "INSERT INTO notes (id, body, score) VALUES (?1, ?2, ?3)",
            &json!(["n1", "hello", 7]),
        )
        .unwrap();

        let rows = query_all(
            &conn,
            "SELECT id, body, score FROM notes WHERE id = ?1",
            &json!(["n1"]),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["body"], json!("hello"));
        assert_eq!(rows[0]["score"], json!(7));
    }

    #[test]
    fn named_params_resolve_any_prefix() {
        let conn = memory_db();
        run(
            &conn,
            "INSERT INTO notes (id, body, score) VALUES (:id, @body, $score)",
            &json!({"id": "n1", "body": "prefixed", "score": 3}),
        )
        .unwrap();

        let row = query_one(&conn, "SELECT body FROM notes WHERE id = ?1", &json!("n1"))
            .unwrap()
            .unwrap();
        assert_eq!(row["body"], json!("prefixed"));
    }

    #[test]
    fn unknown_named_param_is_an_error() {
        let conn = memory_db();
        let err = run(
            &conn,
            "INSERT INTO notes (id) VALUES (:id)",
            &json!({"id": "n1", "bogus": 1}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn scalar_param_binds_as_the_single_placeholder() {
        let conn = memory_db();
        run(&conn, "INSERT INTO notes (id) VALUES (?1)", &json!("solo")).unwrap();
        assert!(
            query_one(&conn, "SELECT id FROM notes WHERE id = ?1", &json!("solo"))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn nested_value_in_scalar_position_is_an_error() {
        let conn = memory_db();
        assert!(
            run(
                &conn,
                "INSERT INTO notes (id, body) VALUES (?1, ?2)",
                &json!(["n1", {"not": "bindable"}]),
            )
            .is_err()
        );
        assert_eq!(note_count(&conn), 0);
    }

    #[test]
    fn invalid_sql_fails_without_side_effects() {
        let conn = memory_db();
        assert!(run(&conn, "INSRT INTO notes VALUES (1)", &Value::Null).is_err());
        assert_eq!(note_count(&conn), 0);
    }

    #[test]
    fn query_all_on_no_match_is_empty_and_query_one_is_none() {
        let conn = memory_db();
        let rows = query_all(
            &conn,
            "SELECT * FROM notes WHERE id = ?1",
            &json!(["missing"]),
        )
        .unwrap();
        assert!(rows.is_empty());
        let row = query_one(
            &conn,
            "SELECT * FROM notes WHERE id = ?1",
            &json!("missing"),
        )
        .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn null_columns_surface_as_json_null() {
        let conn = memory_db();
        run(&conn, "INSERT INTO notes (id) VALUES ('n1')", &Value::Null).unwrap();
        let row = query_one(
            &conn,
            "SELECT body, score FROM notes WHERE id = ?1",
            &json!("n1"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(row["body"], Value::Null);
        assert_eq!(row["score"], Value::Null);
    }

    #[test]
    fn batch_applies_list_of_lists_once_per_inner_list_in_order() {
        let conn = memory_db();
        run_batch(
            &conn,
            &[BatchStatement {
                sql: "INSERT INTO notes (id, body, score) VALUES (?1, ?2, ?3)".to_owned(),
                params: json!([["a", "first", 1], ["b", "second", 2], ["c", "third", 3]]),
            }],
        )
        .unwrap();

        let rows = query_all(
            &conn,
            "SELECT id FROM notes ORDER BY score ASC",
            &Value::Null,
        )
        .unwrap();
        let ids: Vec<&Value> = rows.iter().map(|row| &row["id"]).collect();
        assert_eq!(ids, [&json!("a"), &json!("b"), &json!("c")]);
    }

    #[test]
    fn batch_rolls_back_as_a_unit_when_a_later_statement_fails() {
        let conn = memory_db();
        run(&conn, "INSERT INTO notes (id) VALUES ('keep')", &Value::Null).unwrap();

        let err = run_batch(
            &conn,
            &[
                BatchStatement {
                    sql: "INSERT INTO notes (id) VALUES (?1)".to_owned(),
                    params: json!(["one"]),
                },
                BatchStatement {
                    sql: "INSERT INTO notes (id) VALUES (?1)".to_owned(),
                    params: json!(["keep"]),
                },
                BatchStatement {
                    sql: "INSERT INTO notes (id) VALUES (?1)".to_owned(),
                    params: json!(["three"]),
                },
            ],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("failed to run"));
        assert_eq!(note_count(&conn), 1);
    }

    #[test]
    fn batch_with_a_malformed_statement_fails_before_touching_data() {
        let conn = memory_db();
        assert!(
            run_batch(
                &conn,
                &[
                    BatchStatement {
                        sql: "INSERT INTO notes (id) VALUES ('x')".to_owned(),
                        params: Value::Null,
                    },
                    BatchStatement {
                        sql: "INSRT nonsense".to_owned(),
                        params: Value::Null,
                    },
                ],
            )
            .is_err()
        );
        assert_eq!(note_count(&conn), 0);
    }

    #[test]
    fn batch_runs_flat_params_once() {
        let conn = memory_db();
        run_batch(
            &conn,
            &[BatchStatement {
                sql: "INSERT INTO notes (id, body) VALUES (?1, ?2)".to_owned(),
                params: json!(["only", "once"]),
            }],
        )
        .unwrap();
        assert_eq!(note_count(&conn), 1);
    }
}
