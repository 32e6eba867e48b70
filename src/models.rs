use std::fmt;

use serde_json::{Map, Value};

/// One stored xAPI statement. Accessors are lenient: a missing field or a
/// field of the wrong type reads as `None` so one malformed record never
/// aborts a report.
#[derive(Debug, Clone)]
pub struct Statement {
    pub tenant_id: String,
    pub body: Value,
}

impl Statement {
    pub fn new(tenant_id: impl Into<String>, body: Value) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            body,
        }
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.body.pointer(pointer).and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.str_at("/timestamp")
    }

    pub fn object_id(&self) -> Option<&str> {
        self.str_at("/object/id")
    }

    pub fn object_names(&self) -> Option<&Map<String, Value>> {
        self.body
            .pointer("/object/definition/name")
            .and_then(Value::as_object)
    }

    pub fn verb_display(&self) -> Option<&Map<String, Value>> {
        self.body.pointer("/verb/display").and_then(Value::as_object)
    }

    pub fn has_score(&self) -> bool {
        self.body.pointer("/result/score").is_some()
    }

    pub fn raw_score(&self) -> Option<f64> {
        self.body.pointer("/result/score/raw").and_then(Value::as_f64)
    }

    pub fn min_score(&self) -> Option<f64> {
        self.body.pointer("/result/score/min").and_then(Value::as_f64)
    }

    pub fn max_score(&self) -> Option<f64> {
        self.body.pointer("/result/score/max").and_then(Value::as_f64)
    }

    pub fn is_success(&self) -> bool {
        self.body.pointer("/result/success").and_then(Value::as_bool) == Some(true)
    }

    pub fn is_completed(&self) -> bool {
        self.body
            .pointer("/result/completion")
            .and_then(Value::as_bool)
            == Some(true)
    }

    pub fn duration(&self) -> Option<&str> {
        self.str_at("/result/duration")
    }

    pub fn registration(&self) -> Option<&str> {
        self.str_at("/context/registration")
    }

    pub fn parent_ids(&self) -> impl Iterator<Item = &str> {
        self.body
            .pointer("/context/contextActivities/parent")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|parent| parent.get("id").and_then(Value::as_str))
    }

    pub fn category_id(&self) -> Option<&str> {
        self.body
            .pointer("/context/contextActivities/category/0/id")
            .and_then(Value::as_str)
    }
}

/// Picks one human-readable label out of a locale-keyed map.
///
/// The preferred locale wins when present. Otherwise the first key in the
/// map's iteration order is used; `serde_json::Map` keeps keys sorted, so
/// that is the lexicographically smallest locale.
#[derive(Debug, Clone, Default)]
pub struct LabelPolicy {
    pub preferred: Option<String>,
}

impl LabelPolicy {
    pub fn new(preferred: Option<String>) -> Self {
        Self { preferred }
    }

    pub fn pick(&self, labels: Option<&Map<String, Value>>) -> Option<String> {
        let labels = labels?;
        let preferred = self
            .preferred
            .as_deref()
            .and_then(|locale| labels.get(locale));
        preferred
            .or_else(|| labels.values().next())
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Object(String),
    ObjectVerb { url: String, verb: Option<String> },
    ContentType(Option<String>),
}

impl GroupKey {
    pub fn url(&self) -> Option<&str> {
        match self {
            GroupKey::Object(url) | GroupKey::ObjectVerb { url, .. } => Some(url),
            GroupKey::ContentType(_) => None,
        }
    }

    pub fn verb(&self) -> Option<&str> {
        match self {
            GroupKey::ObjectVerb { verb, .. } => verb.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub raw_min: Option<f64>,
    pub raw_max: Option<f64>,
    raw_sum: f64,
    raw_n: u64,
}

impl ScoreStats {
    /// Absent values take part in neither the extremes nor the average.
    pub fn observe_raw(&mut self, raw: Option<f64>) {
        let Some(raw) = raw else {
            return;
        };
        self.raw_min = Some(self.raw_min.map_or(raw, |current| current.min(raw)));
        self.raw_max = Some(self.raw_max.map_or(raw, |current| current.max(raw)));
        self.raw_sum += raw;
        self.raw_n += 1;
    }

    pub fn observe_bounds(&mut self, min: Option<f64>, max: Option<f64>) {
        if min.is_some() {
            self.min = min;
        }
        if max.is_some() {
            self.max = max;
        }
    }

    pub fn raw_avg(&self) -> Option<f64> {
        if self.raw_n == 0 {
            None
        } else {
            Some(self.raw_sum / self.raw_n as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedResult {
    pub key: GroupKey,
    pub name: Option<String>,
    pub count: Option<u64>,
    pub verbs: Vec<String>,
    pub sessions: Vec<String>,
    pub success_count: Option<u64>,
    pub score: ScoreStats,
    pub durations: Vec<String>,
}

impl GroupedResult {
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            name: None,
            count: None,
            verbs: Vec::new(),
            sessions: Vec::new(),
            success_count: None,
            score: ScoreStats::default(),
            durations: Vec::new(),
        }
    }

    pub fn increment(&mut self) {
        *self.count.get_or_insert(0) += 1;
    }

    pub fn count_success(&mut self, success: bool) {
        let count = self.success_count.get_or_insert(0);
        if success {
            *count += 1;
        }
    }

    /// Keeps the last name seen; absent names do not clear an earlier one.
    pub fn observe_name(&mut self, name: Option<String>) {
        if name.is_some() {
            self.name = name;
        }
    }

    pub fn add_verb(&mut self, verb: Option<String>) {
        insert_distinct(&mut self.verbs, verb);
    }

    pub fn add_session(&mut self, session: Option<&str>) {
        insert_distinct(&mut self.sessions, session.map(str::to_string));
    }
}

fn insert_distinct(set: &mut Vec<String>, value: Option<String>) {
    if let Some(value) = value {
        if !set.contains(&value) {
            set.push(value);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(u64),
    Float(f64),
    Empty,
}

pub type Row = Vec<Cell>;

impl From<Option<&str>> for Cell {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Cell::Empty, |text| Cell::Text(text.to_string()))
    }
}

impl From<Option<u64>> for Cell {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Cell::Empty, Cell::Int)
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Float)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(text) => f.write_str(text),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Float(value) => write!(f, "{value}"),
            Cell::Empty => Ok(()),
        }
    }
}
