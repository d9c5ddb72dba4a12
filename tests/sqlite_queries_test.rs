//! Integration tests against SQLite database files.
//!
//! Tests verify that:
//! - Chains share one connection and transaction
//! - Committed work is visible to a later run, rolled back work is not
//! - Errors and domain failures roll back and are returned unchanged
//! - Transactions can be swapped mid-chain
//! - Query files resolve per backend and alternation dispatches by source
//! - Streams and table commands run on real connections

use chrono::NaiveDate;
use db_queries::db::types::{
    value_to_bool, value_to_bytes, value_to_date_time, value_to_f64, value_to_i64,
    value_to_string,
};
use db_queries::db::{MemoryQueries, QueryState, Transaction, TransactionState};
use db_queries::{
    CommandFactory, ConnectionContext, ConnectionSource, DbError, DbParameter, LogicalType,
    OneOf2, PgBackend, Queries, QueryLocator, SqliteBackend, Table, TableCommand,
    set_transaction,
};
use futures_util::{FutureExt, StreamExt};
use include_dir::{Dir, include_dir};
use rust_decimal::Decimal;
use serde_json::json;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

static QUERIES: Dir = include_dir!("$CARGO_MANIFEST_DIR/tests/fixtures/queries");

type Lite = ConnectionContext<SqliteBackend>;

/// A SQLite file with a `users` table. Keep it alive for the duration of the test.
struct TestDb {
    _dir: TempDir,
    source: ConnectionSource<SqliteBackend>,
}

/// Set RUST_LOG=db_queries=debug to see the statements the tests run.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn setup_db() -> TestDb {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("test.db").display());
    let source = ConnectionSource::<SqliteBackend>::new(&url)
        .unwrap()
        .with_locator(QueryLocator::embedded(&QUERIES));

    CommandFactory::<Lite>::new(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            age INTEGER,
            score REAL,
            active INTEGER,
            joined TEXT,
            avatar BLOB
        )",
        [],
    )
    .execute()
    .run(&source)
    .await
    .unwrap();

    TestDb { _dir: dir, source }
}

fn insert_user(name: &str) -> Queries<u64, Lite> {
    CommandFactory::from_file("insert_user", [DbParameter::nvarchar("name", name)]).execute()
}

fn count_users() -> Queries<i64, Lite> {
    CommandFactory::from_file("count_users", [])
        .fetch_scalar()
        .map(|v| v.as_ref().and_then(value_to_i64).unwrap_or(0))
}

fn current_transaction() -> Queries<Option<Transaction>, Lite> {
    Queries::new(|context: &mut Lite| {
        let transaction = context.transaction().cloned();
        async move { Ok(transaction) }.boxed()
    })
}

fn failing_statement() -> Queries<u64, Lite> {
    CommandFactory::new("INSERT INTO missing_table (x) VALUES (1)", []).execute()
}

#[tokio::test]
async fn test_chain_shares_connection() {
    let db = setup_db().await;
    let total = insert_user("ann")
        .and_then(|_| insert_user("bob"))
        .and_then(|_| count_users())
        .run(&db.source)
        .await
        .unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn test_committed_work_is_visible() {
    let db = setup_db().await;
    let affected = insert_user("ann")
        .zip(insert_user("bob"))
        .map(|(a, b)| a + b)
        .run_with_transaction(&db.source)
        .await
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(count_users().run(&db.source).await.unwrap(), 2);
}

#[tokio::test]
async fn test_error_mid_chain_rolls_back() {
    let db = setup_db().await;
    let err = insert_user("ann")
        .and_then(|_| failing_statement())
        .and_then(|_| insert_user("never"))
        .run_with_transaction(&db.source)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }), "got {err:?}");
    assert_eq!(count_users().run(&db.source).await.unwrap(), 0);
}

#[tokio::test]
async fn test_domain_failure_rolls_back_and_is_returned() {
    let db = setup_db().await;
    let rejected = insert_user("ann")
        .and_then(|_| count_users())
        .map(|n| if n > 0 { Err(format!("{n} users is too many")) } else { Ok(n) })
        .run_with_transaction_result(&db.source)
        .await
        .unwrap();
    assert_eq!(rejected, Err("1 users is too many".to_string()));
    assert_eq!(count_users().run(&db.source).await.unwrap(), 0);

    let accepted = insert_user("ann")
        .map(Ok::<u64, String>)
        .and_then_ok(|_| count_users().map(Ok))
        .run_with_transaction_result(&db.source)
        .await
        .unwrap();
    assert_eq!(accepted, Ok(1));
    assert_eq!(count_users().run(&db.source).await.unwrap(), 1);
}

#[tokio::test]
async fn test_set_transaction_commits_and_continues() {
    let db = setup_db().await;
    let checkpoint = set_transaction::<SqliteBackend, _>(|session, current| {
        async move {
            session.commit(&current).await?;
            session.begin().await
        }
        .boxed()
    });

    let (before, after) = current_transaction()
        .and_then(|before| insert_user("ann").map(move |_| before))
        .and_then(|before| checkpoint.map(move |_| before))
        .and_then(|before| current_transaction().map(move |after| (before, after)))
        .run(&db.source)
        .await
        .unwrap();
    // No transaction was begun by `run`, so the swap is a no-op
    assert!(before.is_none() && after.is_none());

    let checkpoint = set_transaction::<SqliteBackend, _>(|session, current| {
        async move {
            session.commit(&current).await?;
            session.begin().await
        }
        .boxed()
    });
    let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = captured.clone();
    let err = insert_user("ann")
        .and_then(|_| current_transaction())
        .and_then(move |first| {
            checkpoint.and_then(move |_| {
                current_transaction().map(move |second| {
                    seen.lock().unwrap().extend([first, second]);
                })
            })
        })
        .and_then(|_| insert_user("bob"))
        .and_then(|_| failing_statement())
        .run_with_transaction(&db.source)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }));

    let captured = captured.lock().unwrap().clone();
    let first = captured[0].as_ref().unwrap();
    let second = captured[1].as_ref().unwrap();
    assert!(!first.same_as(second));
    assert_eq!(first.state(), TransactionState::Disposed);
    assert_eq!(second.state(), TransactionState::RolledBack);

    // The first run's insert and the second ann committed by the swap; bob was rolled back
    // with the second transaction
    assert_eq!(count_users().run(&db.source).await.unwrap(), 2);
}

#[tokio::test]
async fn test_set_transaction_same_instance_disposes_nothing() {
    let db = setup_db().await;
    let keep = set_transaction::<SqliteBackend, _>(|_, current| async move { Ok(current) }.boxed());
    let (before, after) = current_transaction()
        .and_then(|before| keep.map(move |_| before))
        .and_then(|before| current_transaction().map(move |after| (before, after)))
        .run_with_transaction(&db.source)
        .await
        .unwrap();
    let (before, after) = (before.unwrap(), after.unwrap());
    assert!(before.same_as(&after));
    assert_eq!(before.state(), TransactionState::Committed);
}

#[tokio::test]
async fn test_query_file_with_substitution() {
    let db = setup_db().await;
    let others = insert_user("ann")
        .and_then(|_| insert_user("bob"))
        .and_then(|_| {
            CommandFactory::from_file_with(
                "count_rows_except",
                ["users"],
                [DbParameter::nvarchar("name", "ann")],
            )
            .fetch_scalar()
        })
        .run(&db.source)
        .await
        .unwrap();
    assert_eq!(others.as_ref().and_then(value_to_i64), Some(1));
}

#[tokio::test]
async fn test_unknown_query_file_fails() {
    let db = setup_db().await;
    let err = CommandFactory::<Lite>::from_file("no_such_query", [])
        .execute()
        .run_with_transaction(&db.source)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::QueryResourceNotFound { ref file, .. } if file == "no_such_query.sqlite"
    ));
}

#[tokio::test]
async fn test_runtime_query_store() {
    let db = setup_db().await;
    let source = db.source.clone().with_locator(QueryLocator::new(
        MemoryQueries::new().with("adhoc/answer.sqlite", "SELECT 42 AS answer"),
    ));
    let answer = CommandFactory::<Lite>::from_file("answer", [])
        .fetch_scalar()
        .run(&source)
        .await
        .unwrap();
    assert_eq!(answer, Some(json!(42)));
}

#[tokio::test]
async fn test_alternation_dispatches_to_sqlite() {
    let db = setup_db().await;
    insert_user("ann").run(&db.source).await.unwrap();

    let count_named = CommandFactory::<ConnectionContext<PgBackend>>::new(
        "SELECT COUNT(*) FROM users WHERE name = $1",
        [],
    )
    .or(CommandFactory::<Lite>::new(
        "SELECT COUNT(*) FROM users WHERE name = ?1",
        [],
    ))
    .add_parameters([DbParameter::nvarchar("name", "ann")])
    .fetch_scalar()
    .map(|v| v.as_ref().and_then(value_to_i64));

    let source: OneOf2<ConnectionSource<PgBackend>, ConnectionSource<SqliteBackend>> =
        OneOf2::Second(db.source.clone());
    assert_eq!(count_named.run(&source).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_stream_names() {
    let db = setup_db().await;
    insert_user("ann")
        .and_then(|_| insert_user("bob"))
        .and_then(|_| insert_user("cy"))
        .run_with_transaction(&db.source)
        .await
        .unwrap();

    let names: Vec<String> = CommandFactory::<Lite>::new("SELECT name FROM users ORDER BY name", [])
        .fetch_all()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("name").and_then(value_to_string))
                .collect::<Vec<_>>()
        })
        .into_stream(db.source.clone())
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(names, ["ann", "bob", "cy"]);

    // Dropping a stream early releases its connection
    let mut partial = CommandFactory::<Lite>::new("SELECT name FROM users", [])
        .fetch_all()
        .into_stream(db.source.clone());
    assert_ok!(partial.next().await.unwrap());
    drop(partial);
    assert_eq!(count_users().run(&db.source).await.unwrap(), 3);
}

#[tokio::test]
async fn test_table_insert_and_fill() {
    let db = setup_db().await;
    let mut incoming = Table::new(["full_name", "age"]);
    incoming.append_rows([
        json!({"full_name": "ann", "age": 31}).as_object().unwrap().clone(),
        json!({"full_name": "bob", "age": null}).as_object().unwrap().clone(),
    ]);

    let insert = TableCommand::insert(CommandFactory::<Lite>::new(
        "INSERT INTO users (name, age, active) VALUES (?1, ?2, ?3)",
        [
            DbParameter::null("name", LogicalType::NVarChar),
            DbParameter::null("age", LogicalType::SmallInt),
            DbParameter::boolean("active", true),
        ],
    ))
    .map_parameter("name", "full_name")
    .skip_parameter("active");

    let affected = insert
        .apply_rows(incoming)
        .run_with_transaction(&db.source)
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let table = CommandFactory::<Lite>::new("SELECT name, age, active FROM users ORDER BY id", [])
        .fill_table(Table::default())
        .run(&db.source)
        .await
        .unwrap();
    assert_eq!(table.columns, ["name", "age", "active"]);
    assert_eq!(table.rows[0]["age"], json!(31));
    assert!(table.rows[1]["age"].is_null());
    assert_eq!(value_to_bool(&table.rows[1]["active"]), Some(true));
}

#[tokio::test]
async fn test_typed_parameters_round_trip() {
    let db = setup_db().await;
    let joined = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(13, 45, 0)
        .unwrap();

    let row = CommandFactory::<Lite>::new(
        concat!(
            "INSERT INTO users (name, age, score, active, joined, avatar) ",
            "VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        [
            DbParameter::nvarchar("name", "a very long name").with_size(6),
            DbParameter::small_int("age", 42),
            DbParameter::decimal("score", Decimal::new(95, 1)),
            DbParameter::boolean("active", false),
            DbParameter::date_time("joined", joined),
            DbParameter::blob("avatar", vec![0u8, 1, 2, 255]),
        ],
    )
    .execute()
    .and_then(|_| {
        CommandFactory::new("SELECT name, age, score, active, joined, avatar FROM users", [])
            .fetch_optional()
    })
    .run_with_transaction(&db.source)
    .await
    .unwrap()
    .unwrap();

    assert_eq!(value_to_string(&row["name"]).as_deref(), Some("a very"));
    assert_eq!(value_to_i64(&row["age"]), Some(42));
    assert_eq!(value_to_f64(&row["score"]), Some(9.5));
    assert_eq!(value_to_bool(&row["active"]), Some(false));
    assert_eq!(value_to_date_time(&row["joined"]), Some(joined));
    assert_eq!(value_to_bytes(&row["avatar"]), Some(vec![0u8, 1, 2, 255]));
}

#[tokio::test]
async fn test_backend_mismatch_is_rejected() {
    let err = assert_err!(ConnectionSource::<PgBackend>::new("sqlite::memory:"));
    assert!(matches!(err, DbError::UnsupportedBackend { .. }));
    assert_ok!(ConnectionSource::<SqliteBackend>::new("sqlite::memory:"));
}
