use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind};
use entangle_span::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
    Hint,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    location: SourceLocation,
    message: String,
    label: Option<String>,
    suggestion: Option<String>,
    help: Option<String>,
    related: Vec<(SourceLocation, String)>,
}

impl Diagnostic {
    pub fn new(
        severity: DiagnosticSeverity,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            location,
            message: message.into(),
            label: None,
            suggestion: None,
            help: None,
            related: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Attach a secondary location, e.g. the other half of a collision.
    pub fn with_related(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.related.push((location, message.into()));
        self
    }

    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn related(&self) -> &[(SourceLocation, String)] {
        &self.related
    }

    pub fn report_kind(&self) -> ReportKind<'_> {
        match self.severity {
            DiagnosticSeverity::Error => ReportKind::Error,
            DiagnosticSeverity::Warning => ReportKind::Warning,
            DiagnosticSeverity::Info | DiagnosticSeverity::Hint => ReportKind::Advice,
        }
    }

    /// Create an error diagnostic
    pub fn error(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, location, message)
    }

    /// Create a warning diagnostic
    pub fn warning(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, location, message)
    }

    /// Plain one-line rendering, used when the source text is unavailable.
    pub fn render_plain(&self) -> String {
        let kind = match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Info => "info",
            DiagnosticSeverity::Hint => "hint",
        };
        let mut text = format!("{}: {kind}: {}", self.location, self.message);
        for (location, message) in &self.related {
            text.push_str(&format!("\n{location}: note: {message}"));
        }
        if let Some(suggestion) = &self.suggestion {
            text.push_str(&format!("\nSuggestion: {suggestion}"));
        }
        if let Some(help) = &self.help {
            text.push_str(&format!("\n{help}"));
        }
        text
    }
}

/// Header text keyed by display path, read lazily from disk.
#[derive(Default)]
struct SourceCache {
    sources: BTreeMap<String, Option<String>>,
}

impl SourceCache {
    fn load(&mut self, location: &SourceLocation) -> Option<(String, Range<usize>)> {
        if !location.is_known() {
            return None;
        }
        let id = location.file().display().to_string();
        let text = self
            .sources
            .entry(id.clone())
            .or_insert_with(|| fs::read_to_string(location.file()).ok())
            .as_deref()?;
        let start = location.offset_in(text);
        let end = (start + 1).min(text.len()).max(start);
        Some((id, start..end))
    }
}

pub fn emit_diagnostics(diagnostics: &[Diagnostic]) {
    let mut cache = SourceCache::default();

    for diagnostic in diagnostics {
        let color = match diagnostic.severity {
            DiagnosticSeverity::Error => Color::Red,
            DiagnosticSeverity::Warning => Color::Yellow,
            DiagnosticSeverity::Info => Color::Blue,
            DiagnosticSeverity::Hint => Color::Cyan,
        };

        let Some((id, span)) = cache.load(diagnostic.location()) else {
            eprintln!("{}", diagnostic.render_plain());
            continue;
        };

        let mut report = Report::build(diagnostic.report_kind(), id.clone(), span.start)
            .with_message(diagnostic.message());

        let primary = Label::new((id, span)).with_color(color);
        report = match diagnostic.label() {
            Some(label_text) => report.with_label(primary.with_message(label_text)),
            None => report.with_label(primary),
        };

        for (location, message) in diagnostic.related() {
            match cache.load(location) {
                Some(related) => {
                    report = report.with_label(
                        Label::new(related)
                            .with_message(message)
                            .with_color(Color::Cyan),
                    );
                }
                None => report = report.with_note(format!("{location}: {message}")),
            }
        }

        if let Some(suggestion) = diagnostic.suggestion() {
            report = report.with_note(format!("Suggestion: {suggestion}"));
        }
        if let Some(help) = diagnostic.help() {
            report = report.with_help(help);
        }

        let sources = cache
            .sources
            .iter()
            .filter_map(|(id, text)| text.as_ref().map(|text| (id.clone(), text.clone())))
            .collect::<Vec<_>>();
        let _ = report.finish().eprint(ariadne::sources(sources));
    }
}
