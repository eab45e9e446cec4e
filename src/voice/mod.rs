pub mod events;
pub mod handlers;
pub mod session;

use crate::state::AppState;
use axum::Router;

pub use session::CallRegistry;

pub fn router() -> Router<AppState> {
    handlers::voice_routes()
}
