//! ReAct agent: prompt rendering, response parsing and the reasoning/acting loop

mod agent_loop;
mod parser;
mod prompt;
mod state;

pub use agent_loop::AgentLoop;
pub use prompt::load_static_history;
pub use state::{AgentConfig, RunOutcome, RunReport};
