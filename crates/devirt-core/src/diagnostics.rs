use crate::error::Error;
use crate::span::Span;
use miette::Diagnostic as _;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub span: Option<Span>,
    pub suggestions: Vec<String>,
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Info, message)
    }

    fn with_level(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            span: None,
            suggestions: Vec::new(),
            code: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl From<&Error> for Diagnostic {
    fn from(error: &Error) -> Self {
        let mut diagnostic = Diagnostic::error(error.to_string());
        if let Some(span) = error.span() {
            diagnostic = diagnostic.with_span(span);
        }
        if let Some(code) = error.code() {
            diagnostic = diagnostic.with_code(code.to_string());
        }
        if let Some(help) = error.help() {
            diagnostic = diagnostic.with_suggestion(help.to_string());
        }
        diagnostic
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }

        if !self.suggestions.is_empty() {
            let hints = self.suggestions.join("; ");
            write!(f, " (hints: {})", hints)?;
        }

        Ok(())
    }
}

/// Collects diagnostics for one compilation. Owned by whoever drives the
/// compilation; there is no global instance.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticManager {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn report(&mut self, error: &Error) {
        self.add(Diagnostic::from(error));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.level == DiagnosticLevel::Error)
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }

    /// Plain-text rendering, one header line per diagnostic plus location and
    /// suggestion lines. Info entries are only shown when `verbose` is set.
    pub fn render_plain(&self, context: &str, verbose: bool) -> Vec<String> {
        let mut lines = Vec::new();
        for diagnostic in &self.diagnostics {
            if diagnostic.level == DiagnosticLevel::Info && !verbose {
                continue;
            }
            let level = match diagnostic.level {
                DiagnosticLevel::Error => "ERROR",
                DiagnosticLevel::Warning => "WARNING",
                DiagnosticLevel::Info => "INFO",
            };
            lines.push(match diagnostic.code.as_ref() {
                Some(code) => format!("[{}] {}: {} ({})", context, level, diagnostic.message, code),
                None => format!("[{}] {}: {}", context, level, diagnostic.message),
            });
            if let Some(span) = diagnostic.span.filter(|span| !span.is_dummy()) {
                lines.push(format!("   at {}", span));
            }
            for suggestion in &diagnostic.suggestions {
                lines.push(format!("   suggestion: {}", suggestion));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_code_span_and_help() {
        let error = Error::UnknownBase {
            class: "B".into(),
            base: "Missing".into(),
            span: Span::new(1, 10, 20),
        };
        let mut manager = DiagnosticManager::new();
        manager.report(&error);
        assert!(manager.has_errors());

        let diagnostic = &manager.diagnostics()[0];
        assert_eq!(diagnostic.code.as_deref(), Some("devirt::unknown_base"));
        assert_eq!(diagnostic.span, Some(Span::new(1, 10, 20)));

        let lines = manager.render_plain("hierarchy", false);
        assert!(lines[0].starts_with("[hierarchy] ERROR: class `B` extends unknown base `Missing`"));
        assert_eq!(lines[1], "   at Span(1:10-20)");
        assert!(lines[2].starts_with("   suggestion: "));
    }

    #[test]
    fn synthesized_spans_are_not_rendered() {
        let mut manager = DiagnosticManager::new();
        manager.add(Diagnostic::warning("narrowing can never succeed").with_span(Span::dummy()));
        assert!(!manager.has_errors());
        assert_eq!(
            manager.render_plain("devirt", false),
            vec!["[devirt] WARNING: narrowing can never succeed".to_string()]
        );
    }

    #[test]
    fn info_is_hidden_unless_verbose() {
        let mut manager = DiagnosticManager::new();
        manager.add(Diagnostic::info("monomorphic call"));
        assert!(manager.render_plain("dispatch", false).is_empty());
        assert_eq!(manager.render_plain("dispatch", true).len(), 1);
        assert!(!manager.has_errors());
    }
}
