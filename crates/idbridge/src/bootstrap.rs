//! Opening the database and creating tables on upgrade
//!
//! `open` issues the engine's open request. When the engine asks for an
//! upgrade, every registered record type gets a table keyed on its primary
//! key plus one index per remaining field. A failing type is logged and
//! skipped; the others still get their tables. The caller is released by the
//! first of: open success, open error, or the upgrade transaction's
//! complete / error / abort.

use std::sync::Arc;

use idbridge_engine::{
    Connection, EngineError, Engine, Event, EventKind, Request, Response, UpgradeEvent,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bridge::{EventFuture, Gate, Outcome, Waiter};
use crate::config::AdapterConfig;
use crate::error::{Error, Result};
use crate::schema::{RecordType, TableSchema};
use crate::tracing::prefix;

/// What bootstrap did with each registered record type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Whether the open ran an upgrade at all
    pub upgraded: bool,
    /// Tables created during the upgrade
    pub created: Vec<String>,
    /// Tables that already existed
    pub existing: Vec<String>,
    /// Record types skipped, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Open `config.db_name`, running schema bootstrap if the engine asks for it.
pub(crate) fn open(
    engine: &Engine,
    config: &AdapterConfig,
    templates: Vec<Box<dyn RecordType>>,
    waiter: &Waiter,
) -> Result<(Connection, BootstrapReport)> {
    let db = config.db_name.clone();
    let report = Arc::new(Mutex::new(BootstrapReport::default()));

    let ready = {
        let _turn = engine.turn();
        let request = engine
            .open(&db, config.version)
            .map_err(|err| Error::Open(err.to_string()))?;
        let (_latch, ready) = listen(&request, &db, templates, &report);
        ready
    };

    let conn = waiter
        .wait(&db, "open", ready)?
        .map_err(|err| Error::Open(format!("{}: {}", db, err)))?;

    let report = report.lock().clone();
    info!(
        "{} {} v{} ready ({} tables created, {} skipped)",
        prefix::OPEN,
        db,
        conn.version(),
        report.created.len(),
        report.skipped.len()
    );
    Ok((conn, report))
}

/// Attach the bootstrap listeners to an open request. Must run in the turn
/// the request was issued in.
///
/// The returned future resolves once, with the first of: open success, open
/// error, or the upgrade transaction finishing.
fn listen(
    request: &Request,
    db: &str,
    templates: Vec<Box<dyn RecordType>>,
    report: &Arc<Mutex<BootstrapReport>>,
) -> (Gate<Outcome<Connection>>, EventFuture<Connection>) {
    let (latch, rx) = Gate::<Outcome<Connection>>::new();

    let templates = Arc::new(templates);
    let upgrade_latch = latch.clone();
    let upgrade_report = Arc::clone(report);
    request.add_listener(EventKind::UpgradeNeeded, move |event| {
        if let Event::UpgradeNeeded(upgrade) = event {
            run_upgrade(upgrade, &templates, &upgrade_report, &upgrade_latch);
        }
    });

    let on_success = latch.clone();
    request.add_listener(EventKind::Success, move |event| {
        if let Event::Success(Response::Connection(conn)) = event {
            on_success.resolve(Ok(conn.clone()));
        }
    });
    let on_error = latch.clone();
    let open_db = db.to_string();
    request.add_listener(EventKind::Error, move |event| {
        if let Event::Error(err) = event {
            warn!("{} open {} failed: {}", prefix::DB, open_db, err);
            on_error.resolve(Err(err.clone()));
        }
    });

    (latch, EventFuture::from_receiver(rx))
}

/// Create the tables and hook the latch onto the upgrade transaction.
/// Runs on the event loop.
fn run_upgrade(
    upgrade: &UpgradeEvent,
    templates: &[Box<dyn RecordType>],
    report: &Mutex<BootstrapReport>,
    latch: &Gate<Outcome<Connection>>,
) {
    let conn = upgrade.connection();
    debug!(
        "{} upgrading {} from v{} to v{}",
        prefix::DB,
        conn.name(),
        upgrade.old_version(),
        upgrade.new_version()
    );

    {
        let mut report = report.lock();
        report.upgraded = true;
        for (index, template) in templates.iter().enumerate() {
            create_for(conn, index, template.as_ref(), &mut report);
        }
    }

    let transaction = upgrade.transaction();

    let on_complete = latch.clone();
    let completed = conn.clone();
    transaction.add_listener(EventKind::Complete, move |_| {
        on_complete.resolve(Ok(completed.clone()));
    });

    // Error and abort still release the caller; the connection is closed so
    // every later operation reports NotInitialized.
    let on_error = latch.clone();
    let errored = conn.clone();
    transaction.add_listener(EventKind::Error, move |event| {
        if let Event::Error(err) = event {
            warn!("{} version change transaction error: {}", prefix::DB, err);
        }
        errored.close();
        on_error.resolve(Ok(errored.clone()));
    });
    let on_abort = latch.clone();
    let aborted = conn.clone();
    transaction.add_listener(EventKind::Abort, move |event| {
        if let Event::Abort(err) = event {
            warn!("{} version change transaction aborted: {}", prefix::DB, err);
        }
        aborted.close();
        on_abort.resolve(Ok(aborted.clone()));
    });
}

fn create_for(
    conn: &Connection,
    index: usize,
    template: &dyn RecordType,
    report: &mut BootstrapReport,
) {
    let Some(table) = template.struct_name() else {
        warn!(
            "{} table {} has no table name; skipped",
            prefix::DB,
            index
        );
        report
            .skipped
            .push((format!("#{}", index), "no table name".to_string()));
        return;
    };

    if conn.has_object_store(&table) {
        debug!("{} table {} already exists", prefix::DB, table);
        report.existing.push(table);
        return;
    }

    let schema = match template.schema() {
        Some(schema) => schema.validate(&table).map(|_| schema),
        None => TableSchema::infer(&table, &template.field_names()),
    };
    let schema = match schema {
        Ok(schema) => schema,
        Err(err) => {
            warn!("{} {}; table {} skipped", prefix::DB, err, table);
            report.skipped.push((table, err.to_string()));
            return;
        }
    };

    match create_table(conn, &schema) {
        Ok(()) => {
            debug!("{} created {}", prefix::DB, schema);
            report.created.push(table);
        }
        Err(err) => {
            warn!("{} creating table {} failed: {}", prefix::DB, table, err);
            report.skipped.push((table, err.to_string()));
        }
    }
}

fn create_table(conn: &Connection, schema: &TableSchema) -> std::result::Result<(), EngineError> {
    let store = conn.create_object_store(&schema.table, &schema.key)?;
    for field in &schema.fields {
        store.create_index(&field.name, &field.name, field.unique)?;
    }
    Ok(())
}
