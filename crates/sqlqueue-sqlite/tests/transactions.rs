use sqlqueue_core::{Error, QueryErrorKind, Row, Value};
use sqlqueue_sqlite::{DatabaseLocation, SqliteConfig, SqliteConnection, TransactionKind};

fn cars() -> SqliteConnection {
    let conn = SqliteConnection::open_memory().unwrap();
    conn.execute("CREATE TABLE cars (name TEXT, price REAL)").unwrap();
    conn
}

fn count(conn: &SqliteConnection) -> i64 {
    conn.query("SELECT count(*) FROM cars", &[]).unwrap()
}

fn snapshot(conn: &SqliteConnection) -> Vec<(String, Option<f64>)> {
    conn.fetch_all("SELECT name, price FROM cars ORDER BY rowid", &[])
        .unwrap()
        .iter()
        .map(|row: &Row| (row.get_as(0).unwrap(), row.get_as(1).unwrap()))
        .collect()
}

fn insert(conn: &SqliteConnection, name: &str, price: f64) -> sqlqueue_core::Result<()> {
    conn.run(
        "INSERT INTO cars (name, price) VALUES (?, ?)",
        &[Value::from(name), Value::from(price)],
    )
}

#[test]
fn cars_scenario() {
    let conn = cars();

    conn.transaction(TransactionKind::Immediate, |c| {
        insert(c, "Tesla", 40_000.0)?;
        insert(c, "Audi", 35_000.0)
    })
    .unwrap();
    assert_eq!(count(&conn), 2);

    let err = conn
        .transaction(TransactionKind::Deferred, |c| {
            insert(c, "Fiat", 9_000.0)?;
            Err::<(), _>(Error::custom("changed my mind"))
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "changed my mind");
    assert_eq!(count(&conn), 2);

    conn.savepoint("s1", |c| {
        let inner = c.savepoint("s2", |c| {
            insert(c, "Lada", 1_000.0)?;
            Err::<(), _>(Error::custom("s2 failed"))
        });
        assert!(inner.is_err());
        assert_eq!(count(c), 2);
        // s1 is still open.
        assert!(!c.is_autocommit());
        Ok(())
    })
    .unwrap();

    assert_eq!(count(&conn), 2);
    assert!(conn.is_autocommit());
}

#[test]
fn failed_transaction_changes_nothing() {
    let conn = cars();
    insert(&conn, "Volvo", 30_000.0).unwrap();
    let before = snapshot(&conn);

    let err = conn
        .transaction(TransactionKind::Exclusive, |c| {
            insert(c, "Saab", 20_000.0)?;
            c.execute("UPDATE cars SET price = price * 2")?;
            c.execute("DELETE FROM cars WHERE name = 'Volvo'")?;
            c.execute("INSERT INTO no_such_table VALUES (1)")
        })
        .unwrap_err();

    assert!(matches!(err, Error::Query(_)));
    assert_eq!(snapshot(&conn), before);
}

#[test]
fn commit_failure_rolls_back_and_reports_commit_error() {
    let conn = SqliteConnection::open_memory().unwrap();
    conn.execute(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE parent (id INTEGER PRIMARY KEY);
         CREATE TABLE child (pid INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED);",
    )
    .unwrap();

    let err = conn
        .transaction(TransactionKind::Deferred, |c| {
            c.execute("INSERT INTO child VALUES (42)")
        })
        .unwrap_err();

    assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Constraint));
    assert_eq!(err.sql(), Some("COMMIT TRANSACTION"));
    assert!(conn.is_autocommit());
    let children: i64 = conn.query("SELECT count(*) FROM child", &[]).unwrap();
    assert_eq!(children, 0);
}

#[test]
fn failed_savepoint_restores_state() {
    let conn = cars();
    insert(&conn, "Skoda", 15_000.0).unwrap();
    let before = snapshot(&conn);

    let result = conn.savepoint("sp", |c| {
        c.execute("UPDATE cars SET price = 0")?;
        insert(c, "Dacia", 8_000.0)?;
        Err::<(), _>(Error::custom("rollback please"))
    });

    assert!(result.is_err());
    assert_eq!(snapshot(&conn), before);
    assert!(conn.is_autocommit());
}

#[test]
fn failed_savepoint_inside_transaction_restores_state() {
    let conn = cars();
    conn.transaction(TransactionKind::Deferred, |c| {
        insert(c, "Opel", 12_000.0)?;
        let before = snapshot(c);

        let result = c.savepoint("inner", |c| {
            c.execute("DELETE FROM cars")?;
            Err::<(), _>(Error::custom("undo the delete"))
        });
        assert!(result.is_err());
        assert_eq!(snapshot(c), before);
        Ok(())
    })
    .unwrap();

    assert_eq!(count(&conn), 1);
}

#[test]
fn releasing_outer_savepoint_releases_inner() {
    let conn = cars();
    conn.savepoint("outer", |c| {
        c.execute("SAVEPOINT \"inner\"")?;
        insert(c, "Mini", 25_000.0)
    })
    .unwrap();

    assert!(conn.is_autocommit());
    assert_eq!(count(&conn), 1);

    let err = conn.execute("RELEASE SAVEPOINT \"inner\"").unwrap_err();
    assert!(err.to_string().contains("no such savepoint"));
}

#[test]
fn savepoint_names_never_inject_sql() {
    let conn = cars();
    conn.execute("CREATE TABLE t (x INTEGER)").unwrap();

    for name in [
        "x\"; DROP TABLE t; --",
        "x; DROP TABLE t",
        "it's",
        "\"\"",
    ] {
        conn.savepoint(name, |c| insert(c, name, 1.0)).unwrap();
        let _ = conn.savepoint(name, |_| Err::<(), _>(Error::custom("fail")));
    }

    let tables: i64 = conn
        .query(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 't'",
            &[],
        )
        .unwrap();
    assert_eq!(tables, 1);
    assert_eq!(count(&conn), 4);
}

#[test]
fn attach_and_detach() {
    let dir = tempfile::tempdir().unwrap();
    let other = DatabaseLocation::file(dir.path().join("it's other.db"));

    let conn = cars();
    conn.attach(&other, "other db").unwrap();
    conn.execute("CREATE TABLE \"other db\".garage (slot INTEGER)").unwrap();
    conn.run("INSERT INTO \"other db\".garage VALUES (?)", &[Value::from(7)])
        .unwrap();
    conn.detach("other db").unwrap();
    assert!(conn.execute("SELECT * FROM \"other db\".garage").is_err());

    let reopened = SqliteConnection::open(&SqliteConfig::new(other)).unwrap();
    let slot: i64 = reopened.query("SELECT slot FROM garage", &[]).unwrap();
    assert_eq!(slot, 7);
}

#[test]
fn attach_in_memory_and_temporary() {
    let conn = cars();
    conn.attach(&DatabaseLocation::InMemory, "scratch").unwrap();
    conn.attach(&DatabaseLocation::Temporary, "spill").unwrap();
    conn.execute("CREATE TABLE scratch.notes (body TEXT); CREATE TABLE spill.rows (n INTEGER)")
        .unwrap();
    conn.detach("scratch").unwrap();
    conn.detach("spill").unwrap();
    assert!(conn.detach("spill").is_err());
}

#[test]
fn named_and_optional_queries() {
    let conn = cars();
    conn.run_named(
        "INSERT INTO cars (name, price) VALUES (:name, :price)",
        &[("name", Value::from("Kia")), ("price", Value::Null)],
    )
    .unwrap();

    let price: Option<f64> = conn
        .query_optional_named("SELECT price FROM cars WHERE name = :n", &[("n", Value::from("Kia"))])
        .unwrap();
    assert_eq!(price, None);

    let missing: Option<String> = conn
        .query_optional("SELECT name FROM cars WHERE name = ?", &[Value::from("Nope")])
        .unwrap();
    assert_eq!(missing, None);

    let err = conn
        .fetch_named("SELECT * FROM cars WHERE name = :n", &[("n", Value::from("Nope"))])
        .unwrap_err();
    assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::NotFound));
}
