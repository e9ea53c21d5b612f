use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn line(line: u32) -> Self {
        let pos = Position::new(line, 1);
        Self::new(pos, pos)
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::line(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edit {
    pub file: String,
    pub span: Span,
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixIt {
    pub title: String,
    pub edits: Vec<Edit>,
}

/// One call-stack entry of a runtime error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceFrame {
    pub function: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: &'static str,
    pub message: String,
    pub file: String,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceFrame>,
    pub notes: Vec<String>,
    pub fixits: Vec<FixIt>,
    pub help: Option<String>,
}

pub fn diagnostic(
    code: &'static str,
    message: impl Into<String>,
    file: &str,
    span: Span,
    notes: Vec<String>,
    help: Option<String>,
) -> Diagnostic {
    Diagnostic {
        code,
        severity: "error",
        message: message.into(),
        file: file.to_string(),
        span,
        trace: Vec::new(),
        notes,
        fixits: Vec::new(),
        help,
    }
}

/// Renders a diagnostic the way a terminal user reads it: header, location,
/// the offending source line and a caret underline below the span.
/// Runtime diagnostics carry a call trace instead of the source excerpt.
pub fn render(diag: &Diagnostic, source: &str) -> String {
    let mut out = format!(
        "{}[{}]: {}\n --> {}:{}:{}\n",
        diag.severity, diag.code, diag.message, diag.file, diag.span.start.line, diag.span.start.col
    );
    let line_no = diag.span.start.line as usize;
    let excerpt = if diag.trace.is_empty() {
        line_no.checked_sub(1).and_then(|idx| source.lines().nth(idx))
    } else {
        None
    };
    if let Some(text) = excerpt {
        let gutter = line_no.to_string();
        let pad = " ".repeat(gutter.len());
        let start = diag.span.start.col.max(1) as usize;
        let end = if diag.span.end.line == diag.span.start.line {
            (diag.span.end.col as usize).max(start + 1)
        } else {
            text.chars().count() + 1
        };
        let width = end.saturating_sub(start).max(1);
        out.push_str(&format!("{pad} |\n{gutter} | {text}\n{pad} | "));
        out.push_str(&" ".repeat(start - 1));
        out.push_str(&"^".repeat(width));
        out.push('\n');
    }
    for frame in &diag.trace {
        out.push_str(&format!("[line {}] in {}\n", frame.line, frame.function));
    }
    for note in &diag.notes {
        out.push_str(&format!(" = note: {note}\n"));
    }
    if let Some(help) = &diag.help {
        out.push_str(&format!(" = help: {help}\n"));
    }
    out
}
