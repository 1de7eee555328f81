//! Warning log for query guardrails.
//!
//! The engine emits exactly one kind of diagnostic: advisory warnings from
//! evaluation guardrails. Each warning is a single JSON object per line,
//! written synchronously to stderr with deterministic field order, so
//! repeated events compare byte-for-byte and can be deduplicated.

use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::{Mutex, OnceLock};

use serde_json::{Map, Value};

fn emitted_once() -> &'static Mutex<HashSet<String>> {
    static EMITTED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    EMITTED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Structured warning logger
pub struct Logger;

impl Logger {
    /// Emits a warning line.
    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::emit(&Self::render(event, fields));
    }

    /// Emits a warning line at most once per process for a given
    /// event + field signature. Returns whether the line was emitted.
    ///
    /// Guardrails fire on every evaluation of a hot query and would
    /// otherwise flood the log.
    pub fn warn_no_repeat(event: &str, fields: &[(&str, &str)]) -> bool {
        let line = Self::render(event, fields);
        let fresh = emitted_once().lock().unwrap().insert(line.clone());
        if fresh {
            Self::emit(&line);
        }
        fresh
    }

    /// Renders one warning as a newline-terminated JSON object.
    ///
    /// Keys iterate in sorted order, so the same event and fields always
    /// produce the same bytes.
    fn render(event: &str, fields: &[(&str, &str)]) -> String {
        let mut object = Map::new();
        object.insert("event".to_string(), Value::from(event));
        object.insert("severity".to_string(), Value::from("WARN"));
        for (key, value) in fields {
            object.insert((*key).to_string(), Value::from(*value));
        }
        let mut line = Value::Object(object).to_string();
        line.push('\n');
        line
    }

    fn emit(line: &str) {
        let mut stderr = io::stderr();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}
