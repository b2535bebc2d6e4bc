//! Stream Line Parser: turns decoded stdout/stderr lines into either a raw
//! log line or a structured record to be merged into a task's telemetry.
//!
//! UTF-8 decode failures are fatal at the line level: a single bad line
//! stops that stream's drain (the task keeps running and its other stream
//! keeps draining), it does not abort the whole run.

use std::collections::VecDeque;

use serde_json::{Map, Value};

/// How one decoded line was understood.
pub enum ParsedLine {
    Raw(String),
    Record(Map<String, Value>),
}

/// Pluggable parsing policy for a task's stdout stream.
pub trait LineParser: Send + Sync {
    fn parse(&self, line: &str) -> ParsedLine;
}

/// Treats every line as an opaque log line. Used for stderr, and for
/// stdout when a task declares `structured_stdout = false`.
pub struct RawLineParser;

impl LineParser for RawLineParser {
    fn parse(&self, line: &str) -> ParsedLine {
        ParsedLine::Raw(line.to_string())
    }
}

/// Parses each line as a JSON object; lines that don't decode to an object
/// fall back to being treated as raw log output rather than erroring, since
/// a model binary is free to interleave plain log lines with structured
/// progress records on the same stream.
pub struct JsonRecordParser;

impl LineParser for JsonRecordParser {
    fn parse(&self, line: &str) -> ParsedLine {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => ParsedLine::Record(map),
            _ => ParsedLine::Raw(line.to_string()),
        }
    }
}

const LOG_TAIL_CAPACITY: usize = 200;

/// Accumulated per-task state built up from its stream lines: a progress
/// map (last-write-wins across structured records) plus a capped tail of
/// raw log lines, and a running byte count kept separately per stream
/// (spec.md §3/§4.3: "total bytes per stream").
#[derive(Debug, Default, Clone)]
pub struct Telemetry {
    pub progress: Map<String, Value>,
    pub log_tail: VecDeque<String>,
    pub bytes_read_stdout: u64,
    pub bytes_read_stderr: u64,
}

impl Telemetry {
    pub fn ingest_stdout(&mut self, parsed: ParsedLine) {
        match parsed {
            ParsedLine::Record(fields) => {
                for (key, value) in fields {
                    // Last write wins: later records override earlier keys.
                    self.progress.insert(key, value);
                }
            }
            ParsedLine::Raw(line) => self.push_log_tail(line),
        }
    }

    pub fn ingest_stderr(&mut self, line: String) {
        self.push_log_tail(line);
    }

    fn push_log_tail(&mut self, line: String) {
        if self.log_tail.len() >= LOG_TAIL_CAPACITY {
            self.log_tail.pop_front();
        }
        self.log_tail.push_back(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_parser_always_returns_raw() {
        let parser = RawLineParser;
        match parser.parse(r#"{"a": 1}"#) {
            ParsedLine::Raw(s) => assert_eq!(s, r#"{"a": 1}"#),
            ParsedLine::Record(_) => panic!("expected raw"),
        }
    }

    #[test]
    fn json_parser_decodes_objects() {
        let parser = JsonRecordParser;
        match parser.parse(r#"{"step": 5, "progress": 0.5}"#) {
            ParsedLine::Record(map) => {
                assert_eq!(map.get("step"), Some(&json!(5)));
            }
            ParsedLine::Raw(_) => panic!("expected record"),
        }
    }

    #[test]
    fn json_parser_falls_back_to_raw_for_non_objects() {
        let parser = JsonRecordParser;
        match parser.parse("just a log line") {
            ParsedLine::Raw(s) => assert_eq!(s, "just a log line"),
            ParsedLine::Record(_) => panic!("expected raw fallback"),
        }
        match parser.parse("[1, 2, 3]") {
            ParsedLine::Raw(_) => {}
            ParsedLine::Record(_) => panic!("array is not an object record"),
        }
    }

    #[test]
    fn last_write_wins_across_records() {
        let mut telemetry = Telemetry::default();
        telemetry.ingest_stdout(ParsedLine::Record(
            json!({"step": 1, "stage": "init"}).as_object().unwrap().clone(),
        ));
        telemetry.ingest_stdout(ParsedLine::Record(
            json!({"step": 2}).as_object().unwrap().clone(),
        ));
        assert_eq!(telemetry.progress.get("step"), Some(&json!(2)));
        assert_eq!(telemetry.progress.get("stage"), Some(&json!("init")));
    }

    #[test]
    fn log_tail_is_capped() {
        let mut telemetry = Telemetry::default();
        for i in 0..(LOG_TAIL_CAPACITY + 10) {
            telemetry.ingest_stderr(format!("line {i}"));
        }
        assert_eq!(telemetry.log_tail.len(), LOG_TAIL_CAPACITY);
        assert_eq!(telemetry.log_tail.front().unwrap(), "line 10");
    }
}
