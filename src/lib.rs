pub mod ast;
pub mod engine;
pub mod lexer;
pub mod parser;
pub mod types;

pub use engine::{AnalysisEvent, Engine, EngineOptions, EventListener, Report};
pub use types::Value;
