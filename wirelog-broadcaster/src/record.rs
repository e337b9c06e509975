use tracing::Level;

/// Severity of an intercepted log record.
///
/// The five classes and their wire labels are the compatibility surface of
/// the stream; existing line-oriented consumers key on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Critical,
    Fatal,
}

impl Severity {
    /// Lowercase wire label.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Fatal => "fatal",
        }
    }
}

impl From<Level> for Severity {
    /// `tracing` has no fatal level; [`Severity::Fatal`] is only reachable
    /// through a hand-built [`LogRecord`].
    fn from(level: Level) -> Self {
        if level == Level::ERROR {
            Severity::Critical
        } else if level == Level::WARN {
            Severity::Warning
        } else if level == Level::INFO {
            Severity::Info
        } else {
            Severity::Debug
        }
    }
}

/// One diagnostic message at the moment of emission.
///
/// Transient: built by the hook, rendered to a wire line, then discarded.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub severity: Severity,
    /// Source file path as reported by the emitter; may be empty.
    pub file: String,
    /// Source line, 0 when unknown.
    pub line: u32,
    pub message: String,
}

impl LogRecord {
    pub fn new(
        severity: Severity,
        file: impl Into<String>,
        line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Render the fixed-width broadcast line.
    ///
    /// Layout: severity label left-justified to 9 columns, file base name
    /// left-justified to 15, line number right-justified to 5, one space,
    /// the message, CRLF. Over-long fields are not truncated.
    pub fn to_wire_line(&self) -> String {
        format!(
            "{:<9}{:<15}{:>5} {}\r\n",
            self.severity.label(),
            basename(&self.file),
            self.line,
            self.message
        )
    }
}

/// Last path segment of `file`, with both separator styles handled.
fn basename(file: &str) -> &str {
    file.rsplit(['/', '\\']).next().unwrap_or(file)
}
