// Diagnostic channel for the Kei compiler
// Collects severity-tagged, located messages from every pass and renders
// them Rust-style with spans, colors, and suggestions.

use colored::Colorize;
use std::fmt;

pub mod source_map;
pub use source_map::{Location, SourceFile, Span};

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "{}", "error".red().bold()),
            Severity::Warning => write!(f, "{}", "warning".yellow().bold()),
            Severity::Info => write!(f, "{}", "info".blue().bold()),
        }
    }
}

/// Structured diagnostic message
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String, // e.g. "E0201" for type mismatch
    pub message: String,
    pub location: Location,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: &str, message: String, location: Location) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message,
            location,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn error(code: &str, message: String, location: Location) -> Self {
        Self::new(Severity::Error, code, message, location)
    }

    pub fn warning(code: &str, message: String, location: Location) -> Self {
        Self::new(Severity::Warning, code, message, location)
    }

    pub fn info(code: &str, message: String, location: Location) -> Self {
        Self::new(Severity::Info, code, message, location)
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Format in Rust style with a source snippet and caret underline.
    pub fn format(&self, file: &SourceFile) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{}[{}]: {}\n",
            self.severity,
            self.code,
            self.message.bold()
        ));

        output.push_str(&format!(
            " {} {}:{}:{}\n",
            "-->".cyan().bold(),
            self.location.file,
            self.location.line,
            self.location.column
        ));

        if let Some(line) = file.line_text(self.location.line) {
            let line_num_width = self.location.line.to_string().len().max(2);
            output.push_str(&format!(" {}\n", " ".repeat(line_num_width + 1)));
            output.push_str(&format!(
                " {} {} {}\n",
                format!("{:>width$}", self.location.line, width = line_num_width)
                    .cyan()
                    .bold(),
                "|".cyan().bold(),
                line
            ));
            let padding = " ".repeat(line_num_width + 3 + self.location.column.max(1) as usize - 1);
            output.push_str(&format!(
                " {}{}{}\n",
                " ".repeat(line_num_width + 1),
                padding,
                "^".red().bold()
            ));
        }

        for note in &self.notes {
            output.push_str(&format!(" {} {}\n", "=".cyan().bold(), note.cyan()));
        }

        if let Some(help) = &self.help {
            output.push_str(&format!(" {} {}\n", "help:".green().bold(), help));
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {} ({})",
            self.severity, self.code, self.message, self.location
        )
    }
}

/// Append-only diagnostic collection shared across all compiler passes.
///
/// The channel length is save/restore-able: the parser's speculative
/// generic-argument parse takes a savepoint with [`DiagnosticEngine::len`]
/// and rolls back with [`DiagnosticEngine::truncate_to`] when it backtracks.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn emit_error(&mut self, code: &str, message: String, location: Location) {
        self.emit(Diagnostic::error(code, message, location));
    }

    pub fn emit_warning(&mut self, code: &str, message: String, location: Location) {
        self.emit(Diagnostic::warning(code, message, location));
    }

    pub fn emit_info(&mut self, code: &str, message: String, location: Location) {
        self.emit(Diagnostic::info(code, message, location));
    }

    /// Savepoint for speculative parsing.
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Discard every diagnostic emitted after the `len` savepoint.
    pub fn truncate_to(&mut self, len: usize) {
        self.diagnostics.truncate(len);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Print all diagnostics to stderr.
    pub fn print_all(&self, file: &SourceFile) {
        for diag in &self.diagnostics {
            eprintln!("{}", diag.format(file));
        }
    }

    pub fn print_summary(&self) {
        let errors = self.error_count();
        let warnings = self.warning_count();
        if errors > 0 {
            eprintln!(
                "{}: {} error{} emitted",
                "error".red().bold(),
                errors,
                if errors == 1 { "" } else { "s" }
            );
        }
        if warnings > 0 {
            eprintln!(
                "{}: {} warning{} emitted",
                "warning".yellow().bold(),
                warnings,
                if warnings == 1 { "" } else { "s" }
            );
        }
    }

    /// Export diagnostics as JSON for IDEs and tooling.
    pub fn to_json(&self) -> String {
        let mut json = String::from("{\"diagnostics\":[");

        for (i, diag) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                json.push(',');
            }

            let severity = match diag.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Info => "info",
            };

            json.push_str(&format!(
                "{{\"severity\":\"{}\",\"code\":\"{}\",\"message\":\"{}\",\"file\":\"{}\",\"line\":{},\"column\":{},\"offset\":{}",
                severity,
                diag.code,
                diag.message.replace('\\', "\\\\").replace('"', "\\\""),
                diag.location.file.replace('\\', "\\\\").replace('"', "\\\""),
                diag.location.line,
                diag.location.column,
                diag.location.offset
            ));

            if let Some(help) = &diag.help {
                json.push_str(&format!(
                    ",\"help\":\"{}\"",
                    help.replace('\\', "\\\\").replace('"', "\\\"")
                ));
            }

            json.push('}');
        }

        json.push_str("]}");
        json
    }
}

/// Common error codes
pub mod error_codes {
    // Lexical errors (E00xx)
    pub const UNEXPECTED_CHARACTER: &str = "E0001";
    pub const UNTERMINATED_STRING: &str = "E0002";
    pub const UNTERMINATED_COMMENT: &str = "E0003";
    pub const MALFORMED_LITERAL: &str = "E0004";
    pub const INVALID_ESCAPE: &str = "E0005";
    pub const RESERVED_KEYWORD: &str = "E0006";

    // Syntax errors (E01xx)
    pub const UNEXPECTED_TOKEN: &str = "E0101";
    pub const EXPECTED_DECLARATION: &str = "E0102";
    pub const EXPECTED_EXPRESSION: &str = "E0103";
    pub const EXPECTED_TYPE: &str = "E0104";
    pub const INVALID_MODIFIER: &str = "E0105";

    // Type errors (E02xx)
    pub const TYPE_MISMATCH: &str = "E0201";
    pub const UNDEFINED_TYPE: &str = "E0202";
    pub const UNDEFINED_NAME: &str = "E0203";
    pub const ARITY_MISMATCH: &str = "E0204";
    pub const DUPLICATE_DEFINITION: &str = "E0205";
    pub const NO_SUCH_FIELD: &str = "E0206";
    pub const NO_SUCH_METHOD: &str = "E0207";
    pub const CANNOT_INFER: &str = "E0208";
    pub const AMBIGUOUS_OVERLOAD: &str = "E0209";
    pub const INVALID_CAST: &str = "E0210";
    pub const NOT_CALLABLE: &str = "E0211";
    pub const IMMUTABLE_ASSIGN: &str = "E0212";
    pub const LITERAL_OUT_OF_RANGE: &str = "E0213";
    pub const INVALID_CONDITION: &str = "E0214";

    // Struct and lifecycle errors (E03xx)
    pub const PTR_IN_PLAIN_STRUCT: &str = "E0301";
    pub const MISSING_LIFECYCLE_HOOK: &str = "E0302";
    pub const HOOK_SIGNATURE: &str = "E0303";
    pub const DUPLICATE_METHOD: &str = "E0304";
    pub const DUPLICATE_VARIANT: &str = "E0305";
    pub const DUPLICATE_FIELD: &str = "E0306";

    // Move errors (E04xx)
    pub const USE_AFTER_MOVE: &str = "E0401";
    pub const INVALID_MOVE: &str = "E0402";

    // Unsafe errors (E05xx)
    pub const UNSAFE_REQUIRED: &str = "E0501";

    // Throws and control-flow errors (E06xx)
    pub const UNCAUGHT_THROWS: &str = "E0601";
    pub const MISSING_CATCH_ARM: &str = "E0602";
    pub const UNDECLARED_THROW: &str = "E0603";
    pub const NON_EXHAUSTIVE_SWITCH: &str = "E0604";
    pub const BREAK_OUTSIDE_LOOP: &str = "E0605";
    pub const RETURN_TYPE: &str = "E0606";
}

/// Fuzzy matching for "did you mean?" suggestions
pub mod fuzzy {
    use strsim::jaro_winkler;

    /// Candidate names similar to `target`, best first.
    pub fn find_similar_names(
        target: &str,
        candidates: &[String],
        threshold: f64,
        max_suggestions: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|candidate| (candidate.clone(), jaro_winkler(target, candidate)))
            .filter(|(_, score)| *score > threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(max_suggestions)
            .map(|(name, _)| name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, column: u32) -> Location {
        Location {
            file: "test.kei".to_string(),
            line,
            column,
            offset: 0,
        }
    }

    #[test]
    fn test_savepoint_rollback() {
        let mut engine = DiagnosticEngine::new();
        engine.emit_error(error_codes::UNEXPECTED_TOKEN, "first".to_string(), loc(1, 1));

        let savepoint = engine.len();
        engine.emit_error(error_codes::UNEXPECTED_TOKEN, "spec 1".to_string(), loc(2, 1));
        engine.emit_warning(error_codes::UNEXPECTED_TOKEN, "spec 2".to_string(), loc(2, 5));
        assert_eq!(engine.len(), 3);

        engine.truncate_to(savepoint);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.warning_count(), 0);
    }

    #[test]
    fn test_has_errors_ignores_warnings() {
        let mut engine = DiagnosticEngine::new();
        engine.emit_warning("W0001", "just a warning".to_string(), loc(1, 1));
        assert!(!engine.has_errors());
        engine.emit_error(error_codes::TYPE_MISMATCH, "mismatched types".to_string(), loc(1, 2));
        assert!(engine.has_errors());
    }

    #[test]
    fn test_diagnostic_format() {
        let file = SourceFile::new("test.kei", "let x = 42;\nlet y = @;\n");
        let diag = Diagnostic::error(
            error_codes::UNEXPECTED_CHARACTER,
            "Unexpected character '@'".to_string(),
            file.location(8 + 12),
        )
        .with_help("remove this character".to_string());

        let formatted = diag.format(&file);
        assert!(formatted.contains("E0001"));
        assert!(formatted.contains("Unexpected character"));
        assert!(formatted.contains("test.kei:2:9"));
        assert!(formatted.contains("let y = @;"));
    }

    #[test]
    fn test_json_export() {
        let mut engine = DiagnosticEngine::new();
        engine.emit_error(
            error_codes::USE_AFTER_MOVE,
            "use of moved variable 'a'".to_string(),
            loc(3, 12),
        );
        let json = engine.to_json();
        assert!(json.contains("\"severity\":\"error\""));
        assert!(json.contains("use of moved variable 'a'"));
        assert!(json.contains("\"line\":3"));
    }

    #[test]
    fn test_fuzzy_suggestions() {
        let candidates = vec![
            "count".to_string(),
            "counter".to_string(),
            "total".to_string(),
        ];
        let found = fuzzy::find_similar_names("countr", &candidates, 0.7, 3);
        assert!(found.contains(&"counter".to_string()));
        assert!(!found.contains(&"total".to_string()));
    }
}
