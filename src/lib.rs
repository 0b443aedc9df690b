//! # weft
//!
//! A small web application substrate: schema-driven records over a pooled SQL
//! connection, and a request-dispatch layer that binds declared handler
//! signatures to HTTP requests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use weft::context::Args;
//! use weft::database::{Database, SqlitePool};
//! use weft::handler::{ApiError, HandlerError, Reply, Signature};
//! use weft::model::{Field, Schema};
//! use weft::{Method, Request, Router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::from_pool(SqlitePool::memory().await?);
//!     let blogs = Schema::builder("Blog")
//!         .table("blogs")
//!         .field("id", Field::string().primary_key().ddl("varchar(50)"))
//!         .field("name", Field::string().ddl("varchar(50)"))
//!         .build()?;
//!     db.execute(&blogs.create_table_sql(), &[]).await?;
//!
//!     let mut router = Router::new();
//!     let (db2, blogs2) = (db.clone(), blogs.clone());
//!     router.get("/api/blogs/:id", Signature::new("api_get_blog").param("id"), move |args: Args| {
//!         let (db, blogs) = (db2.clone(), blogs2.clone());
//!         async move {
//!             let id: String = args.value("id")?;
//!             let blog = blogs
//!                 .find(&db, id)
//!                 .await?
//!                 .ok_or_else(|| ApiError::not_found("blog", "no such blog"))?;
//!             Reply::json(&blog)
//!         }
//!     })?;
//!
//!     let response = router.route(Request::new(Method::Get, "/api/blogs/1")).await;
//!     println!("{} {}", response.status(), response.text());
//!     db.close().await;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod database;
pub mod handler;
pub mod http;
pub mod model;
pub mod router;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use database::{Database, DbError, PoolConfig, Value};
pub use handler::{ApiError, HandlerError, Reply, Signature};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use model::{Field, FindOptions, Record, Schema};
pub use router::{Endpoint, Router};
