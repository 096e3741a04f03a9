pub mod api_docs;
pub mod auth;
pub mod config;
pub mod error;
pub mod janitor;
pub mod response;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use janitor::{run_janitor_pass, start_janitor_task};
pub use response::Envelope;
pub use routes::create_app;
pub use state::AppState;
