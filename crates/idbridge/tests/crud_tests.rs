//! CRUD operation tests for the adapter

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use idbridge::{
    Action, Adapter, AdapterConfig, Condition, Error, FnSink, Model, Query, Slot, Template, Value,
};
use pretty_assertions::assert_eq;

#[derive(Debug, Default, Clone, PartialEq)]
struct User {
    id: String,
    name: String,
    email: String,
}

impl User {
    fn new(id: &str, name: &str, email: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Model for User {
    fn table_name(&self) -> &str {
        "user"
    }

    fn columns(&self) -> &[&str] {
        &["ID", "Name", "Email"]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.as_str().into(),
            self.name.as_str().into(),
            self.email.as_str().into(),
        ]
    }

    fn pointers(&mut self) -> Vec<Slot<'_>> {
        vec![
            Slot::Text(&mut self.id),
            Slot::Text(&mut self.name),
            Slot::Text(&mut self.email),
        ]
    }
}

/// Every supported field type in one record
#[derive(Debug, Default, Clone, PartialEq)]
struct Reading {
    id: String,
    count: i64,
    level: f64,
    ok: bool,
}

impl Model for Reading {
    fn table_name(&self) -> &str {
        "reading"
    }

    fn columns(&self) -> &[&str] {
        &["IDReading", "Count", "Level", "Ok"]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.as_str().into(),
            self.count.into(),
            self.level.into(),
            self.ok.into(),
        ]
    }

    fn pointers(&mut self) -> Vec<Slot<'_>> {
        vec![
            Slot::Text(&mut self.id),
            Slot::Int(&mut self.count),
            Slot::Float(&mut self.level),
            Slot::Bool(&mut self.ok),
        ]
    }
}

/// Helper to open an adapter with the user and reading tables
fn open_test_db(name: &str) -> Adapter {
    let counter = AtomicUsize::new(0);
    Adapter::builder(AdapterConfig::new(name))
        .id_generator(move || format!("{}", counter.fetch_add(1, Ordering::SeqCst) + 1))
        .table(Template::new("user", ["ID", "Name", "Email"]))
        .table(Template::new("reading", ["IDReading", "Count", "Level", "Ok"]))
        .open()
        .unwrap()
}

fn by_id(id: &str) -> Query {
    Query::read_one("user").filter(Condition::eq("ID", id))
}

#[test]
fn test_create_and_read_one() {
    let db = open_test_db("crud_create_db");
    let user = User::new("1", "John", "john@example.com");

    db.insert(&user).unwrap();

    let mut read = User::default();
    db.read_one(&by_id("1"), &mut read).unwrap();
    assert_eq!(read, user);
}

#[test]
fn test_crud_scenario() {
    let db = open_test_db("crud_scenario_db");
    let mut user = User::new("1", "John", "john@example.com");

    db.insert(&user).unwrap();
    let mut read = User::default();
    db.read_one(&by_id("1"), &mut read).unwrap();
    assert_eq!(read.name, "John");

    user.name = "Jane".into();
    db.upsert(&user).unwrap();
    let mut updated = User::default();
    db.read_one(&by_id("1"), &mut updated).unwrap();
    assert_eq!(updated, User::new("1", "Jane", "john@example.com"));

    db.delete(&Query::delete("user").filter(Condition::eq("ID", "1")))
        .unwrap();
    let mut gone = User::default();
    let err = db.read_one(&by_id("1"), &mut gone).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_create_duplicate_fails() {
    let db = open_test_db("crud_duplicate_db");
    let user = User::new("1", "John", "john@example.com");

    db.insert(&user).unwrap();
    let err = db.insert(&user).unwrap_err();
    assert!(
        matches!(err, Error::RequestFailed { op: "add", ref table, .. } if table == "user"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn test_failed_create_leaves_table_unchanged() {
    let db = open_test_db("crud_failed_create_db");
    db.insert(&User::new("1", "John", "john@example.com")).unwrap();
    assert!(db.insert(&User::new("1", "Other", "other@example.com")).is_err());

    let all: Vec<User> = db.read_all(&Query::read_all("user")).unwrap();
    assert_eq!(all, vec![User::new("1", "John", "john@example.com")]);
}

#[test]
fn test_update_nonexistent_creates() {
    let db = open_test_db("crud_upsert_db");
    let user = User::new("42", "Ghost", "ghost@example.com");

    db.upsert(&user).unwrap();

    let mut read = User::default();
    db.read_one(&by_id("42"), &mut read).unwrap();
    assert_eq!(read, user);
}

#[test]
fn test_delete_nonexistent_is_ok() {
    let db = open_test_db("crud_delete_missing_db");
    db.delete(&Query::delete("user").filter(Condition::eq("ID", "nope")))
        .unwrap();
}

#[test]
fn test_delete_without_conditions_is_unsupported() {
    let db = open_test_db("crud_delete_all_db");
    let err = db.delete(&Query::delete("user")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)));
}

#[test]
fn test_read_one_missing() {
    let db = open_test_db("crud_missing_db");
    let mut read = User::default();
    let err = db.read_one(&by_id("1"), &mut read).unwrap_err();
    assert!(matches!(err, Error::NotFound { ref table } if table == "user"));
    assert_eq!(read, User::default());
}

#[test]
fn test_read_one_by_non_key_field() {
    let db = open_test_db("crud_scan_one_db");
    db.insert(&User::new("1", "John", "john@example.com")).unwrap();
    db.insert(&User::new("2", "Jane", "jane@example.com")).unwrap();

    let mut read = User::default();
    let query = Query::read_one("user").filter(Condition::eq("Email", "jane@example.com"));
    db.read_one(&query, &mut read).unwrap();
    assert_eq!(read.id, "2");
}

#[test]
fn test_supported_types_round_trip() {
    let db = open_test_db("crud_types_db");
    let reading = Reading {
        id: "r1".into(),
        count: 12,
        level: 0.75,
        ok: true,
    };
    db.insert(&reading).unwrap();

    let mut read = Reading::default();
    let query = Query::read_one("reading").filter(Condition::eq("IDReading", "r1"));
    db.read_one(&query, &mut read).unwrap();
    assert_eq!(read, reading);
}

#[test]
fn test_create_with_mismatched_columns_is_invalid() {
    let db = open_test_db("crud_invalid_db");
    let mut query = Query::create("user").set("ID", "1").set("Name", "John");
    query.values.pop();
    let err = db.create(&query).unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
}

#[test]
fn test_execute_dispatches_actions() {
    let db = open_test_db("crud_execute_db");
    let mut scratch = User::default();

    let john = User::new("1", "John", "john@example.com");
    db.execute(&Query::for_model(Action::Create, &john), &mut scratch, None)
        .unwrap();
    let jane = User::new("2", "Jane", "jane@example.com");
    db.execute(&Query::for_model(Action::Create, &jane), &mut scratch, None)
        .unwrap();

    db.execute(&by_id("2"), &mut scratch, None).unwrap();
    assert_eq!(scratch, jane);

    let mut seen = Vec::new();
    let mut sink = FnSink::new(
        || Box::new(User::default()) as Box<dyn Model>,
        |model: Box<dyn Model>| seen.push(model.values()[0].clone()),
    );
    db.execute(&Query::read_all("user"), &mut scratch, Some(&mut sink))
        .unwrap();
    drop(sink);
    assert_eq!(seen, vec![Value::from("1"), Value::from("2")]);
}

#[test]
fn test_execute_read_all_needs_sink() {
    let db = open_test_db("crud_execute_sink_db");
    let mut scratch = User::default();
    let err = db
        .execute(&Query::read_all("user"), &mut scratch, None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
}

#[test]
fn test_new_id() {
    let db = open_test_db("crud_id_db");
    assert_eq!(db.new_id(), "1");
    assert_eq!(db.new_id(), "2");

    let plain = Adapter::builder(AdapterConfig::new("crud_no_id_db"))
        .open()
        .unwrap();
    assert_eq!(plain.new_id(), "");
}

#[test]
fn test_closed_adapter_is_not_initialized() {
    let db = open_test_db("crud_closed_db");
    db.close();

    assert!(!db.is_open());
    assert!(!db.table_exists("user"));
    let err = db.insert(&User::new("1", "John", "john@example.com")).unwrap_err();
    assert!(matches!(err, Error::NotInitialized));
}

#[test]
fn test_operations_within_timeout() {
    let db = Adapter::builder(
        AdapterConfig::new("crud_timeout_db").with_request_timeout(Duration::from_secs(5)),
    )
    .table(Template::new("user", ["ID", "Name", "Email"]))
    .open()
    .unwrap();

    db.insert(&User::new("1", "John", "john@example.com")).unwrap();
    let mut read = User::default();
    db.read_one(&by_id("1"), &mut read).unwrap();
    assert_eq!(read.name, "John");
}

#[test]
fn test_concurrent_writers() {
    let db = open_test_db("crud_concurrent_db");

    std::thread::scope(|scope| {
        for t in 0..4 {
            let db = &db;
            scope.spawn(move || {
                for i in 0..10 {
                    let id = format!("{}-{}", t, i);
                    db.insert(&User::new(&id, "N", &format!("{}@example.com", id)))
                        .unwrap();
                }
            });
        }
    });

    let all: Vec<User> = db.read_all(&Query::read_all("user")).unwrap();
    assert_eq!(all.len(), 40);
}
