use crate::heap::HeapError;
use flood_core::{diagnostic, Diagnostic, Span, TraceFrame};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub code: &'static str,
    pub message: String,
    /// Innermost call first.
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        let line = self.trace.first().map(|frame| frame.line).unwrap_or(1);
        let mut diag = diagnostic(
            self.code,
            self.message.clone(),
            file,
            Span::line(line),
            Vec::new(),
            None,
        );
        diag.trace = self.trace.clone();
        diag
    }
}

impl From<HeapError> for RuntimeError {
    fn from(err: HeapError) -> Self {
        runtime_error("E0400", err.to_string())
    }
}

pub(crate) fn runtime_error(code: &'static str, message: impl Into<String>) -> RuntimeError {
    RuntimeError {
        code,
        message: message.into(),
        trace: Vec::new(),
    }
}
