//! HTTP control surface.
//!
//! Every route maps one-to-one onto a supervisor operation. Query arguments
//! are validated before any manager is touched, so a rejected request never
//! changes controller state.

mod query;
mod routes;

pub use query::QueryArgs;
pub use routes::{build_router, run_http_server, ControlReply, ControlState, HttpServerError};
