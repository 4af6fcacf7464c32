//! Human-readable rendering of parse diagnostics.
//!
//! Parsing itself never fails; syntax problems come back as
//! [`Diagnostic`] records. This module renders one of those against its
//! source with the offending span highlighted, for CLI and log output.

use annotate_snippets::{Level, Renderer, Snippet};
use pythia_core::diagnostics::{Diagnostic, Severity};
use pythia_core::span::LineIndex;

/// Render `diagnostic` against `source` with a source snippet and the
/// span underlined. `label` names the origin (usually the file path).
pub fn render_diagnostic(source: &str, label: &str, diagnostic: &Diagnostic) -> String {
    let index = LineIndex::from_source(source);
    let start_line = index.position_of(diagnostic.span.start).line as usize;
    let end_line = index.position_of(diagnostic.span.end).line as usize;

    // One line of context on each side.
    let snippet_first = start_line.saturating_sub(1).max(1);
    let snippet_last = (end_line + 1).min(index.line_count() as usize);
    let snippet_start = index
        .offset_of(pythia_core::span::Position::new(snippet_first as u32, 0))
        .unwrap_or(0) as usize;
    let snippet_end = if snippet_last >= index.line_count() as usize {
        source.len()
    } else {
        index
            .offset_of(pythia_core::span::Position::new(snippet_last as u32 + 1, 0))
            .unwrap_or(source.len() as u32) as usize
    };

    let snippet_source = &source[snippet_start..snippet_end];
    let mut start = diagnostic.span.start as usize - snippet_start;
    let mut end = diagnostic.span.end as usize - snippet_start;
    if start == end {
        end = (end + 1).min(snippet_source.len().max(1));
        start = start.min(end.saturating_sub(1));
    }

    let level = match diagnostic.severity {
        Severity::Error => Level::Error,
        Severity::Warning => Level::Warning,
        Severity::Information => Level::Info,
    };
    let title = format!("{} [{}]", label, diagnostic.code);
    let rendered = Renderer::styled()
        .render(
            level.title(&title).snippet(
                Snippet::source(snippet_source)
                    .line_start(snippet_first)
                    .fold(false)
                    .annotations(vec![level.span(start..end).label(&diagnostic.message)]),
            ),
        )
        .to_string();
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use pythia_core::diagnostics::DiagnosticCode;
    use pythia_core::span::Span;

    #[test]
    fn renders_with_label_and_message() {
        let source = "x = 1\ny = $\nz = 3\n";
        let diagnostic = Diagnostic::new(
            DiagnosticCode::ParseError,
            Span::new(10, 11),
            "unexpected character '$'",
        );
        let rendered = render_diagnostic(source, "example.py", &diagnostic);
        assert!(rendered.contains("example.py"));
        assert!(rendered.contains("unexpected character"));
    }

    #[test]
    fn tolerates_empty_span_at_eof() {
        let source = "x =\n";
        let diagnostic = Diagnostic::new(DiagnosticCode::ParseError, Span::at(4), "expected value");
        let rendered = render_diagnostic(source, "f.py", &diagnostic);
        assert!(rendered.contains("expected value"));
    }
}
