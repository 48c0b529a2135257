//! HTTP API surface

mod extract;
mod router;
mod server;

pub use extract::TokenRequestBody;
pub use router::{AppState, create_router};
pub use server::{Broker, http_client};
