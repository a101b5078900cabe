mod agent;

pub use agent::{AgentQuery, AgentRecord};
