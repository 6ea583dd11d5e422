//! Campaign Flow — session and workflow coordination for a pipeline of
//! conversational agents.

pub mod agents;
pub mod config;
pub mod error;
pub mod flow;
pub mod routes;
pub mod session;
pub mod store;
