//! Agent turn execution: one bounded tool-calling loop per agent input.
//!
//! ```text
//! system prompt + history + user message
//!            │
//!            ▼
//!      ModelClient ──► tool calls? ──yes──► fan-out to ToolRegistry ──┐
//!            ▲              │                                         │
//!            │              no                                        │
//!            │              ▼                                         │
//!            │         final answer                                   │
//!            └────────── tool results appended to transcript ◄────────┘
//! ```

pub mod turn;

pub use turn::{ToolExecution, TurnExecutor, TurnOptions, TurnResult, TurnTermination};
