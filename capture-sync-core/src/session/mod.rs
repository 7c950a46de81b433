pub mod capture_session;
pub mod runtime;
pub mod state_machine;
