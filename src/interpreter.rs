//! svelte-check `--output machine-verbose` interpreter.
//!
//! Parses the checker's line-oriented stream into typed lifecycle events
//! and accumulates diagnostics per check cycle.
//!
//! # Wire format
//!
//! Every meaningful line carries a millisecond timestamp prefix:
//!
//! ```text
//! 1770255832071 START "/workspace"
//! 1770255834342 {"type":"ERROR","filename":"src/a.ts",...}
//! 1770255834342 COMPLETED 100 FILES 1 ERRORS 0 WARNINGS 1 FILES_WITH_PROBLEMS
//! 1770255834342 FAILURE "Connection closed"
//! ```
//!
//! Empty lines and `#` comments are skipped. Lines matching none of the
//! productions are dropped; the format is owned upstream and may grow.

use std::fmt;
use std::io::BufRead;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

// ============================================================================
// Diagnostic Types
// ============================================================================

/// Location in a file. Zero-based on the wire; rendered one-based for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

/// Diagnostic severity as reported by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "WARNING")]
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

/// Diagnostic code: numeric for type-system errors, symbolic for
/// higher-level lints. The distinction is preserved through JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticCode {
    Number(i64),
    Name(String),
}

/// A single error or warning from svelte-check.
///
/// The timestamp is taken from the line prefix rather than the JSON
/// payload, so each diagnostic records when the checker emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub severity: Severity,
    pub filename: String,
    pub start: Position,
    pub end: Position,
    pub message: String,
    pub code: DiagnosticCode,
    /// "js", "ts", "svelte", "css", or empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

// ============================================================================
// Events
// ============================================================================

/// Outcome of a completed check cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckCompleted {
    pub timestamp: i64,
    pub diagnostics: Vec<Diagnostic>,
    pub file_count: u32,
    pub error_count: u32,
    pub warning_count: u32,
    pub files_with_problems: u32,
}

/// Event emitted by the interpreter for each protocol line of interest.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckEvent {
    /// The checker began a new cycle; any prior accumulation is void.
    Started { timestamp: i64, workspace: String },
    /// The checker finished a cycle with the given diagnostics and counts.
    Completed(CheckCompleted),
    /// The checker hit a runtime error; the current snapshot stays as-is.
    Failed { timestamp: i64, message: String },
}

// ============================================================================
// Interpreter
// ============================================================================

/// Read checker output line by line and send events to the channel.
///
/// Blocks until the reader ends. A read error is returned to the caller;
/// the sender is left open either way, so the caller decides when the
/// receiving side observes end-of-stream.
pub fn interpret_output<R: BufRead>(
    reader: R,
    events: &Sender<CheckEvent>,
) -> std::io::Result<()> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    for line in reader.lines() {
        let line = line?;

        // Empty lines and comments carry no protocol content.
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((timestamp, rest)) = parse_timestamp_prefix(&line) else {
            continue;
        };

        if let Some(quoted) = rest.strip_prefix("START ") {
            // Cycle boundary: the accumulator must be empty before any
            // diagnostic of the new cycle arrives.
            diagnostics.clear();
            let event = CheckEvent::Started {
                timestamp,
                workspace: quoted.trim_matches('"').to_string(),
            };
            if events.send(event).is_err() {
                return Ok(());
            }
            continue;
        }

        if rest.starts_with("COMPLETED ") {
            let (file_count, error_count, warning_count, files_with_problems) =
                parse_completed_counts(rest);
            let event = CheckEvent::Completed(CheckCompleted {
                timestamp,
                diagnostics: std::mem::take(&mut diagnostics),
                file_count,
                error_count,
                warning_count,
                files_with_problems,
            });
            if events.send(event).is_err() {
                return Ok(());
            }
            continue;
        }

        if let Some(quoted) = rest.strip_prefix("FAILURE ") {
            let event = CheckEvent::Failed {
                timestamp,
                message: quoted.trim_matches('"').to_string(),
            };
            if events.send(event).is_err() {
                return Ok(());
            }
            continue;
        }

        if rest.starts_with('{') {
            // Unparseable diagnostics are dropped: the checker may add
            // fields or shapes this build does not know about.
            if let Ok(mut diagnostic) = serde_json::from_str::<Diagnostic>(rest) {
                diagnostic.timestamp = timestamp;
                diagnostics.push(diagnostic);
            }
        }
    }

    Ok(())
}

/// Split `"1770255832071 rest..."` into timestamp and remainder.
fn parse_timestamp_prefix(line: &str) -> Option<(i64, &str)> {
    let (prefix, rest) = line.split_once(' ')?;
    let timestamp = prefix.parse().ok()?;
    Some((timestamp, rest))
}

/// Extract counts from
/// `COMPLETED 159 FILES 9 ERRORS 7 WARNINGS 4 FILES_WITH_PROBLEMS`.
fn parse_completed_counts(rest: &str) -> (u32, u32, u32, u32) {
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 9 {
        return (0, 0, 0, 0);
    }
    let count = |field: &str| field.parse().unwrap_or(0);
    (
        count(fields[1]),
        count(fields[3]),
        count(fields[5]),
        count(fields[7]),
    )
}

// ============================================================================
// Output Formatting
// ============================================================================

/// Render a completed check the way svelte-check prints to a terminal.
pub fn format_human(event: &CheckCompleted) -> String {
    if event.diagnostics.is_empty() {
        return format!(
            "svelte-check found no issues ({} files checked)\n",
            event.file_count
        );
    }

    let mut out = String::new();
    for diagnostic in &event.diagnostics {
        // filename:line:char - SEVERITY: message, with 1-based positions
        out.push_str(&format!(
            "{}:{}:{} - {}: {}\n",
            diagnostic.filename,
            diagnostic.start.line + 1,
            diagnostic.start.character + 1,
            diagnostic.severity,
            diagnostic.message,
        ));
    }

    out.push_str(&format!(
        "\nsvelte-check: {} errors, {} warnings ({} files checked)\n",
        event.error_count, event.warning_count, event.file_count
    ));

    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::Cursor;

    fn interpret(input: &str) -> Vec<CheckEvent> {
        let (tx, rx) = unbounded();
        interpret_output(Cursor::new(input), &tx).expect("interpret error");
        drop(tx);
        rx.iter().collect()
    }

    fn completed(event: &CheckEvent) -> &CheckCompleted {
        match event {
            CheckEvent::Completed(done) => done,
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn test_emits_start_event() {
        let events = interpret("1770255832071 START \"/Users/tyler/src/myproject\"\n");
        assert_eq!(
            events,
            vec![CheckEvent::Started {
                timestamp: 1770255832071,
                workspace: "/Users/tyler/src/myproject".to_string(),
            }]
        );
    }

    #[test]
    fn test_emits_complete_event_with_diagnostic() {
        let input = concat!(
            "1770255832071 START \"/workspace\"\n",
            "1770255834342 {\"type\":\"ERROR\",\"filename\":\"src/lib/utils.ts\",\"start\":{\"line\":0,\"character\":38},\"end\":{\"line\":0,\"character\":44},\"message\":\"Cannot find module 'clsx'\",\"code\":2307}\n",
            "1770255834342 COMPLETED 100 FILES 1 ERRORS 0 WARNINGS 1 FILES_WITH_PROBLEMS\n",
        );
        let events = interpret(input);
        assert_eq!(events.len(), 2);

        let done = completed(&events[1]);
        assert_eq!(done.timestamp, 1770255834342);
        assert_eq!(done.file_count, 100);
        assert_eq!(done.error_count, 1);
        assert_eq!(done.warning_count, 0);
        assert_eq!(done.files_with_problems, 1);
        assert_eq!(done.diagnostics.len(), 1);

        let diag = &done.diagnostics[0];
        assert_eq!(diag.timestamp, 1770255834342);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.filename, "src/lib/utils.ts");
        assert_eq!(diag.start, Position { line: 0, character: 38 });
        assert_eq!(diag.end, Position { line: 0, character: 44 });
        assert_eq!(diag.message, "Cannot find module 'clsx'");
        assert_eq!(diag.code, DiagnosticCode::Number(2307));
    }

    #[test]
    fn test_counts_errors_and_warnings() {
        let input = concat!(
            "1770255832071 START \"/workspace\"\n",
            "1770255834342 {\"type\":\"ERROR\",\"filename\":\"src/a.ts\",\"start\":{\"line\":0,\"character\":0},\"end\":{\"line\":0,\"character\":1},\"message\":\"Error one\",\"code\":2322}\n",
            "1770255834342 {\"type\":\"ERROR\",\"filename\":\"src/b.ts\",\"start\":{\"line\":1,\"character\":0},\"end\":{\"line\":1,\"character\":1},\"message\":\"Error two\",\"code\":2322}\n",
            "1770255834342 {\"type\":\"WARNING\",\"filename\":\"src/c.svelte\",\"start\":{\"line\":2,\"character\":0},\"end\":{\"line\":2,\"character\":1},\"message\":\"Warning one\",\"code\":\"a11y_missing_attribute\",\"source\":\"svelte\"}\n",
            "1770255834342 {\"type\":\"WARNING\",\"filename\":\"src/d.svelte\",\"start\":{\"line\":3,\"character\":0},\"end\":{\"line\":3,\"character\":1},\"message\":\"Warning two\",\"code\":\"css_unused_selector\",\"source\":\"svelte\"}\n",
            "1770255834342 COMPLETED 100 FILES 2 ERRORS 2 WARNINGS 4 FILES_WITH_PROBLEMS\n",
        );
        let events = interpret(input);
        let done = completed(&events[1]);
        assert_eq!(done.error_count, 2);
        assert_eq!(done.warning_count, 2);
        assert_eq!(done.diagnostics.len(), 4);
        assert_eq!(done.diagnostics[2].source, "svelte");
    }

    #[test]
    fn test_multiple_cycles_discard_previous_accumulator() {
        let input = concat!(
            "1770255832071 START \"/workspace\"\n",
            "1770255834342 {\"type\":\"ERROR\",\"filename\":\"src/a.ts\",\"start\":{\"line\":0,\"character\":0},\"end\":{\"line\":0,\"character\":1},\"message\":\"First error\",\"code\":2322}\n",
            "1770255834342 COMPLETED 100 FILES 1 ERRORS 0 WARNINGS 1 FILES_WITH_PROBLEMS\n",
            "1770255844663 START \"/workspace\"\n",
            "1770255844689 {\"type\":\"ERROR\",\"filename\":\"src/b.ts\",\"start\":{\"line\":1,\"character\":0},\"end\":{\"line\":1,\"character\":1},\"message\":\"Second error\",\"code\":2322}\n",
            "1770255844689 COMPLETED 100 FILES 1 ERRORS 0 WARNINGS 1 FILES_WITH_PROBLEMS\n",
        );
        let events = interpret(input);
        assert_eq!(events.len(), 4);

        let first = completed(&events[1]);
        assert_eq!(first.diagnostics.len(), 1);
        assert_eq!(first.diagnostics[0].message, "First error");

        let second = completed(&events[3]);
        assert_eq!(second.diagnostics.len(), 1);
        assert_eq!(second.diagnostics[0].message, "Second error");
    }

    #[test]
    fn test_clean_cycle_has_no_diagnostics() {
        let input = concat!(
            "1770255832071 START \"/ws\"\n",
            "1770255834342 COMPLETED 100 FILES 0 ERRORS 0 WARNINGS 0 FILES_WITH_PROBLEMS\n",
        );
        let events = interpret(input);
        assert_eq!(
            events,
            vec![
                CheckEvent::Started {
                    timestamp: 1770255832071,
                    workspace: "/ws".to_string(),
                },
                CheckEvent::Completed(CheckCompleted {
                    timestamp: 1770255834342,
                    diagnostics: Vec::new(),
                    file_count: 100,
                    error_count: 0,
                    warning_count: 0,
                    files_with_problems: 0,
                }),
            ]
        );
    }

    #[test]
    fn test_numeric_and_symbolic_codes_stay_distinct() {
        let input = concat!(
            "1770255832071 START \"/workspace\"\n",
            "1770255834342 {\"type\":\"ERROR\",\"filename\":\"src/a.ts\",\"start\":{\"line\":0,\"character\":0},\"end\":{\"line\":0,\"character\":1},\"message\":\"TS Error\",\"code\":2322}\n",
            "1770255834342 {\"type\":\"WARNING\",\"filename\":\"src/b.svelte\",\"start\":{\"line\":1,\"character\":0},\"end\":{\"line\":1,\"character\":1},\"message\":\"Svelte Warning\",\"code\":\"a11y_missing_attribute\",\"source\":\"svelte\"}\n",
            "1770255834342 COMPLETED 100 FILES 1 ERRORS 1 WARNINGS 2 FILES_WITH_PROBLEMS\n",
        );
        let events = interpret(input);
        let done = completed(&events[1]);
        assert_eq!(done.diagnostics[0].code, DiagnosticCode::Number(2322));
        assert_eq!(
            done.diagnostics[1].code,
            DiagnosticCode::Name("a11y_missing_attribute".to_string())
        );

        // The distinction survives serialization.
        let json = serde_json::to_string(&done.diagnostics[0]).unwrap();
        assert!(json.contains("\"code\":2322"));
        let json = serde_json::to_string(&done.diagnostics[1]).unwrap();
        assert!(json.contains("\"code\":\"a11y_missing_attribute\""));
    }

    #[test]
    fn test_emits_failure_event() {
        let input = concat!(
            "1770255832071 START \"/workspace\"\n",
            "1770255834342 FAILURE \"Connection closed\"\n",
        );
        let events = interpret(input);
        assert_eq!(
            events[1],
            CheckEvent::Failed {
                timestamp: 1770255834342,
                message: "Connection closed".to_string(),
            }
        );
    }

    #[test]
    fn test_skips_comments_and_empty_lines() {
        let input = concat!(
            "# This is a comment\n",
            "1770255832071 START \"/workspace\"\n",
            "\n",
            "# Another comment\n",
            "1770255834342 COMPLETED 100 FILES 0 ERRORS 0 WARNINGS 0 FILES_WITH_PROBLEMS\n",
        );
        let events = interpret(input);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_skips_lines_without_timestamp() {
        let input = concat!(
            "not-a-timestamp START \"/workspace\"\n",
            "STANDALONE\n",
            "1770255832071 START \"/workspace\"\n",
        );
        let events = interpret(input);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_drops_malformed_json_diagnostic() {
        let input = concat!(
            "1770255832071 START \"/workspace\"\n",
            "1770255834342 {\"type\":\"ERROR\",\"filename\":\n",
            "1770255834342 {\"unexpected\":\"shape\"}\n",
            "1770255834342 COMPLETED 100 FILES 0 ERRORS 0 WARNINGS 0 FILES_WITH_PROBLEMS\n",
        );
        let events = interpret(input);
        let done = completed(&events[1]);
        assert!(done.diagnostics.is_empty());
    }

    #[test]
    fn test_ignores_unknown_remainder() {
        let input = concat!(
            "1770255832071 PROGRESS 42\n",
            "1770255832071 START \"/workspace\"\n",
        );
        let events = interpret(input);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_truncated_completed_line_yields_zero_counts() {
        let input = concat!(
            "1770255832071 START \"/ws\"\n",
            "1770255834342 COMPLETED 100 FILES\n",
        );
        let events = interpret(input);
        let done = completed(&events[1]);
        assert_eq!(done.file_count, 0);
        assert_eq!(done.error_count, 0);
    }

    #[test]
    fn test_format_human_no_issues() {
        let event = CheckCompleted {
            timestamp: 0,
            diagnostics: Vec::new(),
            file_count: 100,
            error_count: 0,
            warning_count: 0,
            files_with_problems: 0,
        };
        assert_eq!(
            format_human(&event),
            "svelte-check found no issues (100 files checked)\n"
        );
    }

    #[test]
    fn test_format_human_with_diagnostics() {
        let event = CheckCompleted {
            timestamp: 0,
            diagnostics: vec![
                Diagnostic {
                    timestamp: 0,
                    severity: Severity::Error,
                    filename: "src/lib/utils.ts".to_string(),
                    start: Position { line: 0, character: 10 },
                    end: Position { line: 0, character: 16 },
                    message: "Type 'string' is not assignable to type 'number'.".to_string(),
                    code: DiagnosticCode::Number(2322),
                    source: "ts".to_string(),
                },
                Diagnostic {
                    timestamp: 0,
                    severity: Severity::Warning,
                    filename: "src/components/Button.svelte".to_string(),
                    start: Position { line: 5, character: 0 },
                    end: Position { line: 5, character: 4 },
                    message: "Unused CSS selector".to_string(),
                    code: DiagnosticCode::Name("css_unused_selector".to_string()),
                    source: "css".to_string(),
                },
            ],
            file_count: 100,
            error_count: 1,
            warning_count: 1,
            files_with_problems: 2,
        };

        let output = format_human(&event);
        // Positions render 1-based.
        assert!(output.contains("src/lib/utils.ts:1:11 - ERROR: Type 'string'"));
        assert!(output.contains("src/components/Button.svelte:6:1 - WARNING: Unused CSS selector"));
        assert!(output.ends_with("\nsvelte-check: 1 errors, 1 warnings (100 files checked)\n"));
    }

    #[test]
    fn test_json_round_trip_uses_camel_case_counts() {
        let event = CheckCompleted {
            timestamp: 1,
            diagnostics: Vec::new(),
            file_count: 5,
            error_count: 2,
            warning_count: 1,
            files_with_problems: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"fileCount\":5"));
        assert!(json.contains("\"errorCount\":2"));
        assert!(json.contains("\"warningCount\":1"));
        assert!(json.contains("\"filesWithProblems\":2"));
    }
}
