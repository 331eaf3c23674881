use plume_backend::{BatchStatement, SqliteStore};
use plume_domain::paths::sqlite_path;
use serde_json::{Value, json};

fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
    SqliteStore::new(sqlite_path(dir.path())).unwrap()
}

#[test]
fn raw_run_reports_success_and_swallows_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    assert!(store.run(
        "INSERT INTO prompts (id, name, createdAt) VALUES (:id, :name, :createdAt)".to_owned(),
        json!({ "id": "p1", "name": "greeting", "createdAt": 100 }),
    ));

    // Malformed SQL comes back as a plain false, never a panic or error.
    assert!(!store.run("INSERT INTO nowhere VALUES (1)".to_owned(), Value::Null));
    // So does a constraint violation.
    assert!(!store.run(
        "INSERT INTO prompts (id, createdAt) VALUES (?, ?)".to_owned(),
        json!(["p1", 200]),
    ));
}

#[test]
fn raw_queries_return_maps_keyed_by_column_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    assert!(store.run(
        "INSERT INTO chats (id, summary, createdAt) VALUES (?, ?, ?)".to_owned(),
        json!(["c1", "first", 10]),
    ));
    assert!(store.run(
        "INSERT INTO chats (id, summary, createdAt) VALUES (?, ?, ?)".to_owned(),
        json!(["c2", "second", 20]),
    ));

    let rows = store.query_all(
        "SELECT id, summary FROM chats ORDER BY createdAt ASC".to_owned(),
        Value::Null,
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], json!("c1"));
    assert_eq!(rows[1]["summary"], json!("second"));

    let row = store
        .query_one(
            "SELECT id, summary, folderId FROM chats WHERE id = ?".to_owned(),
            json!("c1"),
        )
        .unwrap();
    assert_eq!(row["summary"], json!("first"));
    assert_eq!(row["folderId"], Value::Null);

    assert!(
        store
            .query_one(
                "SELECT id FROM chats WHERE id = ?".to_owned(),
                json!("missing"),
            )
            .is_none()
    );

    // A broken query degrades to an empty result set.
    assert!(
        store
            .query_all("SELECT * FROM nowhere".to_owned(), Value::Null)
            .is_empty()
    );
}

#[test]
fn batches_commit_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    assert!(store.run(
        "INSERT INTO chats (id, summary, createdAt) VALUES ('keep', 'survivor', 1)".to_owned(),
        Value::Null,
    ));

    // The second statement violates the primary key, so the first insert
    // must be rolled back too.
    assert!(!store.run_batch(vec![
        BatchStatement {
            sql: "INSERT INTO chats (id, createdAt) VALUES (?, ?)".to_owned(),
            params: json!(["gone", 2]),
        },
        BatchStatement {
            sql: "INSERT INTO chats (id, createdAt) VALUES (?, ?)".to_owned(),
            params: json!(["keep", 3]),
        },
    ]));

    let rows = store.query_all("SELECT id FROM chats".to_owned(), Value::Null);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!("keep"));
}

#[test]
fn batch_statements_fan_out_over_nested_parameter_lists() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    assert!(store.run_batch(vec![BatchStatement {
        sql: "INSERT INTO chats (id, summary, createdAt) VALUES (?, ?, ?)".to_owned(),
        params: json!([["c1", "a", 1], ["c2", "b", 2], ["c3", "c", 3]]),
    }]));

    let rows = store.query_all(
        "SELECT id FROM chats ORDER BY createdAt ASC".to_owned(),
        Value::Null,
    );
    let ids: Vec<&Value> = rows.iter().map(|row| &row["id"]).collect();
    assert_eq!(ids, [&json!("c1"), &json!("c2"), &json!("c3")]);
}

#[test]
fn typed_operations_round_trip_through_the_worker() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let chat: plume_domain::Chat = serde_json::from_value(json!({
        "id": "c1",
        "name": "planning",
        "provider": "openai",
        "model": "gpt-4o",
        "createdAt": 1,
    }))
    .unwrap();
    store.create_chat(chat).unwrap();

    let loaded = store.get_chat("c1".to_owned()).unwrap().unwrap();
    assert_eq!(loaded.name.as_deref(), Some("planning"));
    assert!(loaded.stream);
    assert_eq!(loaded.max_ctx_messages, 10);

    assert!(store.delete_chat("c1".to_owned()).unwrap());
    assert!(store.get_chat("c1".to_owned()).unwrap().is_none());
    assert!(!store.delete_chat("c1".to_owned()).unwrap());
}

#[test]
fn clones_share_one_worker_and_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let clone = store.clone();

    assert!(clone.run(
        "INSERT INTO chats (id, createdAt) VALUES ('c1', 1)".to_owned(),
        Value::Null,
    ));
    assert!(
        store
            .query_one("SELECT id FROM chats WHERE id = ?".to_owned(), json!("c1"))
            .is_some()
    );
}

#[test]
fn open_failure_surfaces_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    // Make the would-be parent directory an ordinary file.
    let blocker = dir.path().join("data");
    std::fs::write(&blocker, b"not a directory").unwrap();

    assert!(SqliteStore::new(blocker.join("plume.db")).is_err());
}
