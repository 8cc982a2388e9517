//! Event-level tests for the object-store engine

use std::sync::mpsc;
use std::time::Duration;

use idbridge_engine::{
    record, Connection, Engine, EngineError, ErrorKind, Event, EventKind, Key, Mode, Request,
    Response, Value,
};
use pretty_assertions::assert_eq;

const WAIT: Duration = Duration::from_secs(5);

/// Attach success/error listeners and wait for the terminal event.
/// Callers must issue the request and call this inside the same turn.
fn listen(req: &Request) -> mpsc::Receiver<Result<Response, EngineError>> {
    let (tx, rx) = mpsc::channel();
    let err_tx = tx.clone();
    req.add_listener(EventKind::Success, move |event| {
        if let Event::Success(response) = event {
            let _ = tx.send(Ok(response.clone()));
        }
    });
    req.add_listener(EventKind::Error, move |event| {
        if let Event::Error(err) = event {
            let _ = err_tx.send(Err(err.clone()));
        }
    });
    rx
}

/// Open a database whose upgrade creates `product` keyed on `ID` with a
/// unique `Sku` index.
fn open_shop(engine: &Engine, name: &str) -> Connection {
    let rx = {
        let _turn = engine.turn();
        let req = engine.open(name, None).unwrap();
        req.add_listener(EventKind::UpgradeNeeded, |event| {
            if let Event::UpgradeNeeded(upgrade) = event {
                let store = upgrade
                    .connection()
                    .create_object_store("product", "ID")
                    .unwrap();
                store.create_index("Name", "Name", false).unwrap();
                store.create_index("Sku", "Sku", true).unwrap();
            }
        });
        listen(&req)
    };
    match rx.recv_timeout(WAIT).unwrap().unwrap() {
        Response::Connection(conn) => conn,
        other => panic!("expected a connection, got {:?}", other),
    }
}

fn product(id: &str, name: &str, sku: &str) -> idbridge_engine::Record {
    record([
        ("ID", Value::from(id)),
        ("Name", Value::from(name)),
        ("Sku", Value::from(sku)),
    ])
}

fn put_all(conn: &Connection, records: Vec<idbridge_engine::Record>) {
    let rx = {
        let _turn = conn.turn();
        let txn = conn.transaction("product", Mode::ReadWrite).unwrap();
        let store = txn.object_store("product").unwrap();
        for r in records {
            store.add(r).unwrap();
        }
        let (tx, rx) = mpsc::channel();
        txn.add_listener(EventKind::Complete, move |_| {
            let _ = tx.send(());
        });
        rx
    };
    rx.recv_timeout(WAIT).unwrap();
}

fn get(conn: &Connection, key: &str) -> Option<idbridge_engine::Record> {
    let rx = {
        let _turn = conn.turn();
        let txn = conn.transaction("product", Mode::ReadOnly).unwrap();
        let req = txn.object_store("product").unwrap().get(key).unwrap();
        listen(&req)
    };
    match rx.recv_timeout(WAIT).unwrap().unwrap() {
        Response::Record(r) => r,
        other => panic!("expected a record, got {:?}", other),
    }
}

#[test]
fn test_open_creates_schema_in_upgrade() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "schema_db");

    assert_eq!(conn.version(), 1);
    assert_eq!(conn.object_store_names(), vec!["product".to_string()]);

    let txn = conn.transaction("product", Mode::ReadOnly).unwrap();
    let store = txn.object_store("product").unwrap();
    assert_eq!(store.key_path().unwrap(), "ID");
    assert_eq!(store.index_names().unwrap(), vec!["Name", "Sku"]);
    assert!(store.index("Sku").unwrap().unique);
    assert!(!store.index("Name").unwrap().unique);
}

#[test]
fn test_reopen_without_upgrade() {
    let engine = Engine::new().unwrap();
    drop(open_shop(&engine, "reopen_db"));

    let (upgrades, upgraded) = mpsc::channel();
    let done = {
        let _turn = engine.turn();
        let req = engine.open("reopen_db", None).unwrap();
        req.add_listener(EventKind::UpgradeNeeded, move |_| {
            let _ = upgrades.send(());
        });
        listen(&req)
    };

    match done.recv_timeout(WAIT).unwrap().unwrap() {
        Response::Connection(conn) => assert_eq!(conn.version(), 1),
        other => panic!("expected a connection, got {:?}", other),
    }
    assert!(upgraded.try_recv().is_err(), "no upgrade expected on reopen");
}

#[test]
fn test_lower_version_is_rejected() {
    let engine = Engine::new().unwrap();
    let rx = {
        let _turn = engine.turn();
        let req = engine.open("versioned_db", Some(3)).unwrap();
        listen(&req)
    };
    assert!(rx.recv_timeout(WAIT).unwrap().is_ok());

    let rx = {
        let _turn = engine.turn();
        let req = engine.open("versioned_db", Some(2)).unwrap();
        listen(&req)
    };
    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Version);
}

#[test]
fn test_transaction_on_missing_store_is_refused() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "missing_store_db");
    let err = conn.transaction("user", Mode::ReadOnly).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_add_then_get() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "add_get_db");
    put_all(&conn, vec![product("p1", "Apple", "A-1")]);

    let got = get(&conn, "p1").unwrap();
    assert_eq!(got, product("p1", "Apple", "A-1"));
    assert!(get(&conn, "p9").is_none());
}

#[test]
fn test_failed_request_aborts_and_rolls_back() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "rollback_db");
    put_all(&conn, vec![product("p1", "Apple", "A-1")]);

    let (first, second, aborted) = {
        let _turn = conn.turn();
        let txn = conn.transaction("product", Mode::ReadWrite).unwrap();
        let store = txn.object_store("product").unwrap();
        let first = listen(&store.put(product("p2", "Banana", "B-1")).unwrap());
        // Duplicate key: add must fail and take the whole transaction with it
        let second = listen(&store.add(product("p1", "Cherry", "C-1")).unwrap());
        let (tx, rx) = mpsc::channel();
        txn.add_listener(EventKind::Abort, move |_| {
            let _ = tx.send(());
        });
        (first, second, rx)
    };

    assert!(first.recv_timeout(WAIT).unwrap().is_ok());
    let err = second.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    aborted.recv_timeout(WAIT).unwrap();

    assert!(get(&conn, "p2").is_none(), "p2 must be rolled back");
    assert_eq!(get(&conn, "p1").unwrap()["Name"], Value::from("Apple"));
}

#[test]
fn test_unique_index_is_enforced() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "unique_db");
    put_all(&conn, vec![product("p1", "Apple", "SKU")]);

    let rx = {
        let _turn = conn.turn();
        let txn = conn.transaction("product", Mode::ReadWrite).unwrap();
        let req = txn
            .object_store("product")
            .unwrap()
            .put(product("p2", "Banana", "SKU"))
            .unwrap();
        listen(&req)
    };
    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
}

#[test]
fn test_read_only_store_refuses_writes() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "readonly_db");
    let txn = conn.transaction("product", Mode::ReadOnly).unwrap();
    let err = txn
        .object_store("product")
        .unwrap()
        .put(product("p1", "Apple", "A"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);
}

#[test]
fn test_cursor_reuses_request_per_advance() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "cursor_db");
    put_all(
        &conn,
        vec![
            product("p3", "Cherry", "C"),
            product("p1", "Apple", "A"),
            product("p2", "Banana", "B"),
        ],
    );

    let (tx, rx) = mpsc::channel::<Option<Key>>();
    {
        let _turn = conn.turn();
        let txn = conn.transaction("product", Mode::ReadOnly).unwrap();
        let req = txn.object_store("product").unwrap().open_cursor().unwrap();
        // One listener serves every advance
        req.add_listener(EventKind::Success, move |event| {
            if let Event::Success(Response::Cursor(cursor)) = event {
                match cursor {
                    Some(c) => {
                        let _ = tx.send(Some(c.key().clone()));
                        c.continue_().unwrap();
                    }
                    None => {
                        let _ = tx.send(None);
                    }
                }
            }
        });
    }

    let mut keys = Vec::new();
    while let Some(key) = rx.recv_timeout(WAIT).unwrap() {
        keys.push(key.into_string());
    }
    assert_eq!(keys, vec!["p1", "p2", "p3"]);
}

#[test]
fn test_cursor_cannot_continue_twice() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "cursor_twice_db");
    put_all(&conn, vec![product("p1", "Apple", "A"), product("p2", "Banana", "B")]);

    let txn = conn.transaction("product", Mode::ReadOnly).unwrap();
    let rx = {
        let _turn = conn.turn();
        let req = txn.object_store("product").unwrap().open_cursor().unwrap();
        listen(&req)
    };
    let cursor = match rx.recv_timeout(WAIT).unwrap().unwrap() {
        Response::Cursor(Some(c)) => c,
        other => panic!("expected a cursor, got {:?}", other),
    };
    let _turn = conn.turn();
    cursor.continue_().unwrap();
    let err = cursor.continue_().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_explicit_abort_discards_writes() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "abort_db");

    let rx = {
        let _turn = conn.turn();
        let txn = conn.transaction("product", Mode::ReadWrite).unwrap();
        let done = listen(&txn.object_store("product").unwrap().add(product("p1", "A", "A")).unwrap());
        let (tx, rx) = mpsc::channel();
        txn.add_listener(EventKind::Abort, move |_| {
            let _ = tx.send(());
        });
        drop(_turn);
        done.recv_timeout(WAIT).unwrap().unwrap();
        txn.abort().unwrap();
        rx
    };
    rx.recv_timeout(WAIT).unwrap();
    assert!(get(&conn, "p1").is_none());
}

#[test]
fn test_abort_overrides_pending_commit() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "abort_commit_db");

    let (done, aborted) = {
        let _turn = conn.turn();
        let txn = conn.transaction("product", Mode::ReadWrite).unwrap();
        let done = listen(&txn.object_store("product").unwrap().add(product("p1", "A", "A")).unwrap());
        let (tx, aborted) = mpsc::channel();
        txn.add_listener(EventKind::Abort, move |_| {
            let _ = tx.send(());
        });
        txn.commit().unwrap();
        txn.abort().unwrap();
        assert_eq!(txn.abort().unwrap_err().kind(), ErrorKind::InvalidState);
        (done, aborted)
    };

    let err = done.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Abort);
    aborted.recv_timeout(WAIT).unwrap();
    assert!(get(&conn, "p1").is_none());
}

#[test]
fn test_closed_connection_refuses_transactions() {
    let engine = Engine::new().unwrap();
    let conn = open_shop(&engine, "closed_db");
    conn.close();
    let err = conn.transaction("product", Mode::ReadOnly).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_delete_database() {
    let engine = Engine::new().unwrap();
    drop(open_shop(&engine, "doomed_db"));
    assert_eq!(engine.database_names(), vec!["doomed_db"]);

    let rx = {
        let _turn = engine.turn();
        listen(&engine.delete_database("doomed_db"))
    };
    rx.recv_timeout(WAIT).unwrap().unwrap();
    assert!(engine.database_names().is_empty());
}
