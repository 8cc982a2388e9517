//! Schema bootstrap tests

use idbridge_engine::Mode;
use idbridge::{
    Adapter, AdapterConfig, Condition, Engine, Error, Query, RecordType, TableSchema, Template,
};
use pretty_assertions::assert_eq;

/// A record type that cannot name its table
struct Anonymous;

impl RecordType for Anonymous {
    fn field_names(&self) -> Vec<String> {
        vec!["ID".into(), "Body".into()]
    }
}

fn user() -> Template {
    Template::new("user", ["ID", "Name", "Email"])
}

fn product() -> Template {
    Template::new("product", ["IDProduct", "Name", "Price"])
}

/// Key path and sorted index names of a table
fn layout(db: &Adapter, table: &str) -> (String, Vec<String>) {
    let conn = db.connection().unwrap();
    let txn = conn.transaction(table, Mode::ReadOnly).unwrap();
    let store = txn.object_store(table).unwrap();
    (store.key_path().unwrap(), store.index_names().unwrap())
}

#[test]
fn test_bootstrap_creates_keyed_tables_with_indexes() {
    let db = Adapter::builder(AdapterConfig::new("schema_create_db"))
        .table(user())
        .table(product())
        .open()
        .unwrap();

    assert_eq!(db.table_names(), vec!["product", "user"]);
    assert_eq!(
        layout(&db, "user"),
        ("ID".to_string(), vec!["Email".to_string(), "Name".to_string()])
    );
    assert_eq!(
        layout(&db, "product"),
        (
            "IDProduct".to_string(),
            vec!["Name".to_string(), "Price".to_string()]
        )
    );

    let report = db.bootstrap_report();
    assert!(report.upgraded);
    assert_eq!(report.created, vec!["user", "product"]);
    assert!(report.skipped.is_empty());
}

#[test]
fn test_bad_types_are_skipped_not_fatal() {
    let db = Adapter::builder(AdapterConfig::new("schema_skip_db"))
        .table(Template::new("note", ["Title", "Body"]))
        .table(user())
        .table(Template::new("item", ["ID", "IDItem", "Name"]))
        .table(Anonymous)
        .open()
        .unwrap();

    assert_eq!(db.table_names(), vec!["user"]);
    let skipped: Vec<&str> = db
        .bootstrap_report()
        .skipped
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(skipped, vec!["note", "item", "#3"]);
}

#[test]
fn test_crud_on_skipped_table_fails() {
    let db = Adapter::builder(AdapterConfig::new("schema_skipped_crud_db"))
        .table(Template::new("note", ["Title", "Body"]))
        .open()
        .unwrap();

    let err = db
        .create(&Query::create("note").set("Title", "t").set("Body", "b"))
        .unwrap_err();
    assert!(matches!(err, Error::TransactionFailed { ref table, .. } if table == "note"));

    let err = db
        .delete(&Query::delete("note").filter(Condition::eq("Title", "t")))
        .unwrap_err();
    assert!(matches!(err, Error::TransactionFailed { .. }));
}

#[test]
fn test_explicit_schema() {
    let schema = TableSchema::new("account", "Email")
        .field("Name", false)
        .field("Handle", true);
    let db = Adapter::builder(AdapterConfig::new("schema_explicit_db"))
        .table(Template::from_schema(schema))
        .open()
        .unwrap();

    let conn = db.connection().unwrap();
    let txn = conn.transaction("account", Mode::ReadOnly).unwrap();
    let store = txn.object_store("account").unwrap();
    assert_eq!(store.key_path().unwrap(), "Email");
    assert!(store.index("Handle").unwrap().unique);
    assert!(!store.index("Name").unwrap().unique);
}

#[test]
fn test_reopen_keeps_data_without_upgrade() {
    let engine = Engine::new().unwrap();
    let config = AdapterConfig::new("schema_reopen_db");

    let first = Adapter::open(
        engine.clone(),
        config.clone(),
        None,
        vec![Box::new(user()) as Box<dyn RecordType>],
    )
    .unwrap();
    first
        .create(&Query::create("user").set("ID", "1").set("Name", "John").set("Email", "j@x"))
        .unwrap();
    first.close();

    let second = Adapter::open(engine, config, None, vec![Box::new(user()) as Box<dyn RecordType>]).unwrap();
    assert!(!second.bootstrap_report().upgraded);
    assert!(second.table_exists("user"));

    let rows = second.read_all::<Row>(&Query::read_all("user")).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_version_bump_adds_new_tables() {
    let engine = Engine::new().unwrap();

    let v1 = Adapter::builder(AdapterConfig::new("schema_bump_db"))
        .engine(engine.clone())
        .table(user())
        .open()
        .unwrap();
    v1.close();

    let v2 = Adapter::builder(AdapterConfig::new("schema_bump_db").with_version(2))
        .engine(engine)
        .table(user())
        .table(product())
        .open()
        .unwrap();

    let report = v2.bootstrap_report();
    assert_eq!(report.existing, vec!["user"]);
    assert_eq!(report.created, vec!["product"]);
    assert_eq!(v2.connection().unwrap().version(), 2);
}

#[test]
fn test_lower_version_fails_to_open() {
    let engine = Engine::new().unwrap();
    Adapter::builder(AdapterConfig::new("schema_version_db").with_version(3))
        .engine(engine.clone())
        .open()
        .unwrap();

    let err = Adapter::builder(AdapterConfig::new("schema_version_db").with_version(2))
        .engine(engine)
        .open()
        .unwrap_err();
    assert!(matches!(err, Error::Open(_)));
}

#[test]
fn test_delete_database() {
    let engine = Engine::new().unwrap();
    let db = Adapter::builder(AdapterConfig::new("schema_doomed_db"))
        .engine(engine.clone())
        .table(user())
        .open()
        .unwrap();
    db.close();

    Adapter::delete_database(&engine, "schema_doomed_db").unwrap();
    assert!(engine.database_names().is_empty());

    let fresh = Adapter::builder(AdapterConfig::new("schema_doomed_db"))
        .engine(engine)
        .open()
        .unwrap();
    assert!(fresh.table_names().is_empty());
}

/// Minimal model for counting rows
#[derive(Default)]
struct Row {
    id: String,
}

impl idbridge::Model for Row {
    fn table_name(&self) -> &str {
        "user"
    }

    fn columns(&self) -> &[&str] {
        &["ID"]
    }

    fn values(&self) -> Vec<idbridge::Value> {
        vec![self.id.as_str().into()]
    }

    fn pointers(&mut self) -> Vec<idbridge::Slot<'_>> {
        vec![idbridge::Slot::Text(&mut self.id)]
    }
}
