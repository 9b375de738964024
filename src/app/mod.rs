pub mod context;
pub mod server;

pub use context::AppContext;
pub use server::{StubRouterServer, create_router};
