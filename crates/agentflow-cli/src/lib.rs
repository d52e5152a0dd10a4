//! Library half of the `agentflow` binary, so command logic can be tested
//! without spawning a process.

pub mod commands;
