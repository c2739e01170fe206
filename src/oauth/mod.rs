pub mod types;
pub mod pkce;
pub mod hooks;
pub mod device;
pub mod state_store;
pub mod session_store;
pub mod token_store;
pub mod callback_server;
pub mod manager;
pub mod refresh;
pub mod providers;

pub use types::*;
pub use pkce::*;
pub use state_store::{StateData, StateStore, start_state_sweeper};
pub use session_store::{SessionState, SessionStatus, SessionStore, start_session_sweeper};
pub use token_store::*;
pub use callback_server::*;
pub use manager::*;
pub use refresh::*;
