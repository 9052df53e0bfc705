//! Analysis events observed by plugins. Events fire synchronously at the
//! point the underlying operation completes, so listeners see a total
//! order matching source evaluation order.

use crate::engine::Engine;
use crate::engine::types::PropertyDescriptor;
use crate::types::Value;

#[derive(Clone, Debug)]
pub enum AnalysisEvent {
    PropertyReferenced {
        object: u64,
        name: String,
        descriptor: Option<PropertyDescriptor>,
    },
    PropertySet {
        object: u64,
        name: String,
        value: Value,
    },
    PropertyDefined {
        object: u64,
        name: String,
    },
    PropertyDeleted {
        object: u64,
        name: String,
    },
    UndeclaredGlobalVariableCreated {
        name: String,
    },
    ErrorReported {
        kind: String,
        message: String,
        stack_trace: Vec<String>,
    },
    WarningReported {
        kind: String,
        message: String,
        stack_trace: Vec<String>,
    },
    EnteredFile {
        filename: String,
    },
}

pub trait EventListener {
    fn on_event(&mut self, engine: &mut Engine, event: &AnalysisEvent);
}

#[derive(Clone, Debug, Default)]
pub struct Diagnostic {
    pub kind: String,
    pub message: String,
    pub stack_trace: Vec<String>,
}

/// The structured result of a recovery-mode run: every reported error and
/// warning plus the files the analysis entered.
#[derive(Clone, Debug, Default)]
pub struct Report {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub entered_files: Vec<String>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}
