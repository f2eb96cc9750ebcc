pub mod dispatch;
pub mod engine;
mod pipelines;

pub use dispatch::{dispatch, DispatchRequest};
pub use engine::AgentEngine;
