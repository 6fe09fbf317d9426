//! Tools built on top of capability servers

pub mod graph;
pub mod promql;

pub use graph::{GraphEnvelope, GraphProxy, GraphRequest};
