pub mod credential_refresh;

pub use credential_refresh::RefreshScheduler;
