//! Blocking CRUD and query adapter over an event-driven object store
//!
//! The engine in [`idbridge_engine`] reports everything through events: a
//! request returns immediately and its `success` or `error` arrives later on
//! the engine's event loop. This crate turns that into the plain
//! call-and-return contract an ORM layer expects:
//!
//! - **bridge**: single-fire gates and futures over request, transaction and
//!   cursor events, driven to completion on the calling thread
//! - **resolver**: a fresh transaction and object store per operation
//! - **predicate**: in-process filtering for anything that is not a key lookup
//! - **crud**: create, update (upsert), delete, read-one and read-all
//! - **bootstrap**: tables and indexes created once, at open, from the
//!   registered record types
//!
//! # Example
//!
//! ```rust
//! use idbridge::{Adapter, AdapterConfig, Condition, Model, Query, Slot, Template, Value};
//!
//! #[derive(Default)]
//! struct Product {
//!     id: String,
//!     name: String,
//!     price: f64,
//! }
//!
//! impl Model for Product {
//!     fn table_name(&self) -> &str {
//!         "product"
//!     }
//!
//!     fn columns(&self) -> &[&str] {
//!         &["IDProduct", "Name", "Price"]
//!     }
//!
//!     fn values(&self) -> Vec<Value> {
//!         vec![self.id.as_str().into(), self.name.as_str().into(), self.price.into()]
//!     }
//!
//!     fn pointers(&mut self) -> Vec<Slot<'_>> {
//!         vec![
//!             Slot::Text(&mut self.id),
//!             Slot::Text(&mut self.name),
//!             Slot::Float(&mut self.price),
//!         ]
//!     }
//! }
//!
//! # fn main() -> idbridge::Result<()> {
//! let adapter = Adapter::builder(AdapterConfig::new("shop"))
//!     .table(Template::new("product", ["IDProduct", "Name", "Price"]))
//!     .open()?;
//!
//! let apple = Product { id: "p1".into(), name: "Apple".into(), price: 1.5 };
//! let banana = Product { id: "p2".into(), name: "Banana".into(), price: 2.0 };
//! adapter.insert(&apple)?;
//! adapter.insert(&banana)?;
//!
//! let query = Query::read_all("product").filter(Condition::gt("Price", 1.8));
//! let expensive: Vec<Product> = adapter.read_all(&query)?;
//! assert_eq!(expensive.len(), 1);
//! assert_eq!(expensive[0].name, "Banana");
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod crud;
pub mod error;
pub mod model;
pub mod predicate;
pub mod query;
pub mod resolver;
pub mod schema;
pub mod tracing;

pub use adapter::{Adapter, AdapterBuilder, IdGenerator};
pub use bootstrap::BootstrapReport;
pub use config::{AdapterConfig, DEFAULT_DB_NAME};
pub use crud::{FnSink, Sink};
pub use error::{Error, Result};
pub use model::{map_record, Model, Slot};
pub use query::{Action, Condition, Operator, Query};
pub use schema::{is_primary_key, FieldSpec, RecordType, SchemaError, TableSchema, Template};

pub use idbridge_engine::{Engine, Key, Record, Value};
