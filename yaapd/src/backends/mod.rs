//! Board backends the daemon can serve.
pub mod sim;
