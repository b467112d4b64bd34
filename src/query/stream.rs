//! Result stream consumed by the interpreter.

use std::collections::BTreeMap;

use crate::query::typed_value::TypedValue;

/// Sink for query output: exactly one header, zero or more rows, then
/// exactly one summary.
pub trait ResultStream {
    fn header(&mut self, fields: Vec<String>);
    fn result(&mut self, values: Vec<TypedValue>);
    fn summary(&mut self, summary: BTreeMap<String, TypedValue>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Start,
    WritingResults,
    Done,
}

/// In-memory stream that records everything sent to it and asserts the
/// protocol ordering. Used by tests and embedders that want the whole
/// result set at once.
#[derive(Debug)]
pub struct CollectingStream {
    state: StreamState,
    header: Vec<String>,
    results: Vec<Vec<TypedValue>>,
    summary: BTreeMap<String, TypedValue>,
}

impl CollectingStream {
    pub fn new() -> Self {
        Self {
            state: StreamState::Start,
            header: Vec::new(),
            results: Vec::new(),
            summary: BTreeMap::new(),
        }
    }

    pub fn header(&self) -> &[String] {
        assert!(self.state != StreamState::Start, "header not written");
        &self.header
    }

    pub fn results(&self) -> &[Vec<TypedValue>] {
        &self.results
    }

    pub fn summary(&self) -> &BTreeMap<String, TypedValue> {
        assert!(self.state == StreamState::Done, "summary not written");
        &self.summary
    }
}

impl Default for CollectingStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStream for CollectingStream {
    fn header(&mut self, fields: Vec<String>) {
        assert!(
            self.state == StreamState::Start,
            "header can only be written first"
        );
        self.header = fields;
        self.state = StreamState::WritingResults;
    }

    fn result(&mut self, values: Vec<TypedValue>) {
        assert!(
            self.state == StreamState::WritingResults,
            "results must come after the header and before the summary"
        );
        self.results.push(values);
    }

    fn summary(&mut self, summary: BTreeMap<String, TypedValue>) {
        assert!(self.state != StreamState::Done, "summary already written");
        self.summary = summary;
        self.state = StreamState::Done;
    }
}
