//! Call metadata delivered in the `agi_*` block at connection start.

mod agi_variable;
mod channel_variables;

pub use agi_variable::{AgiVariable, ParseAgiVariableError};
pub use channel_variables::ChannelVariables;
