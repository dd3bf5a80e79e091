pub mod password;
pub mod session;
pub mod state;
pub mod types;

pub use state::AuthState;
