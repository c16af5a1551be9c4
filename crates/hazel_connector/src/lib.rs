//! Request building and HTTP connectors for hazel.
//!
//! - [`request`] - The fluent [`RequestBuilder`] and the [`RequestExecutor`] seam
//! - [`connector`] - The [`Connector`] trait, [`ConnectionOptions`] and [`ConnectorFactory`]
//! - [`http`] - [`HttpConnector`], the `reqwest` implementation
//! - [`executor`] - Executors routing built requests to a connector or over a transport
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hazel_connector::{ConnectionOptions, Connector, HttpConnector, RequestBuilder};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), hazel_connector::RequestError> {
//! let connector: Arc<dyn Connector> =
//!     Arc::new(HttpConnector::new(ConnectionOptions::new("https://api.example.com"))?);
//!
//! let mut builder = RequestBuilder::for_connector("example", connector);
//! builder.get("/0/users/:id").params(json!({ "id": 7 }));
//! let user = builder.execute().await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

pub mod connector;
pub mod error;
pub mod executor;
pub mod http;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod request;

pub use connector::{
    ApiRequest, ConnectionOptions, Connector, ConnectorFactory, Method, ProgressCallback,
};
pub use error::RequestError;
pub use executor::{ConnectorExecutor, EventExecutor};
pub use http::{HttpConnector, HttpConnectorFactory};
pub use request::{BuiltRequest, RequestBuilder, RequestExecutor};
