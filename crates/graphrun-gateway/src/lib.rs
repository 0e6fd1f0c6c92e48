mod protocol;
mod routes;
mod server;
mod sse;
mod state;

pub use protocol::ControlResponse;
pub use server::{router, GatewayServer, RegistryLoader};
pub use state::AppState;
