//! Built-in report cases.
//!
//! Every case is a pair of pure functions: `plan_*` narrows the base
//! tenant/period filter with case predicates, and `aggregate_*` folds the
//! matching statements into grouped results. `project_*` turns one group
//! into one CSV row matching the case header.

use std::collections::HashMap;

use crate::db::RecordSource;
use crate::duration;
use crate::error::{ReportError, ReportResult};
use crate::models::{Cell, GroupKey, GroupedResult, LabelPolicy, Row, Statement};
use crate::options::PeriodOptions;
use crate::query::{BaseFilter, Predicate, QueryPlan};
use crate::registry::CaseDefinition;

pub const CONTENT_TYPE_PREFIX: &str = "http://h5p.org/libraries/";

/// Everything one case execution needs besides the record source.
#[derive(Debug, Clone)]
pub struct CaseRequest {
    pub base: BaseFilter,
    pub labels: LabelPolicy,
    pub options: Option<PeriodOptions>,
}

pub async fn run(
    source: &dyn RecordSource,
    case: &CaseDefinition,
    request: &CaseRequest,
) -> ReportResult<Vec<GroupedResult>> {
    let plan = (case.plan)(request)?;
    let statements = source.find(&plan).await?;
    tracing::debug!(case = case.name, statements = statements.len(), "statements fetched");
    Ok((case.aggregate)(&statements, &request.labels))
}

/// Groups in first-seen key order.
struct Grouper {
    index: HashMap<GroupKey, usize>,
    groups: Vec<GroupedResult>,
}

impl Grouper {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn entry(&mut self, key: GroupKey) -> &mut GroupedResult {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(GroupedResult::new(key.clone()));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        &mut self.groups[slot]
    }

    fn into_vec(self) -> Vec<GroupedResult> {
        self.groups
    }

    /// Descending count; the sort is stable so ties keep arrival order.
    fn into_sorted_by_count(self) -> Vec<GroupedResult> {
        let mut groups = self.groups;
        groups.sort_by(|a, b| b.count.cmp(&a.count));
        groups
    }
}

fn url_of(statement: &Statement) -> String {
    statement.object_id().unwrap_or_default().to_string()
}

fn by_object_and_verb(statement: &Statement, labels: &LabelPolicy) -> GroupKey {
    GroupKey::ObjectVerb {
        url: url_of(statement),
        verb: labels.pick(statement.verb_display()),
    }
}

/// `http://h5p.org/libraries/H5P.MultiChoice-1.10` becomes `H5P.MultiChoice`.
pub fn content_type(category_id: &str) -> Option<String> {
    let rest = category_id.strip_prefix(CONTENT_TYPE_PREFIX)?;
    let name = rest.split('-').next().unwrap_or(rest);
    (!name.is_empty()).then(|| name.to_string())
}

fn join_set(values: &[String]) -> Cell {
    Cell::Text(values.join(","))
}

fn score_cells(group: &GroupedResult) -> [Cell; 5] {
    [
        group.score.min.into(),
        group.score.max.into(),
        group.score.raw_min.into(),
        group.score.raw_max.into(),
        group.score.raw_avg().into(),
    ]
}

// materialInteractions

pub fn plan_material_interactions(request: &CaseRequest) -> ReportResult<QueryPlan> {
    Ok(QueryPlan::new(request.base.clone()))
}

pub fn aggregate_material_interactions(
    statements: &[Statement],
    labels: &LabelPolicy,
) -> Vec<GroupedResult> {
    let mut grouper = Grouper::new();
    for statement in statements {
        let group = grouper.entry(GroupKey::Object(url_of(statement)));
        group.increment();
        group.add_verb(labels.pick(statement.verb_display()));
        group.observe_name(labels.pick(statement.object_names()));
    }
    grouper.into_sorted_by_count()
}

pub fn project_material_interactions(group: &GroupedResult) -> Row {
    vec![
        group.key.url().into(),
        group.name.as_deref().into(),
        group.count.into(),
        join_set(&group.verbs),
    ]
}

// materialInteractionsByVerb

pub fn plan_material_interactions_by_verb(request: &CaseRequest) -> ReportResult<QueryPlan> {
    Ok(QueryPlan::new(request.base.clone()))
}

pub fn aggregate_material_interactions_by_verb(
    statements: &[Statement],
    labels: &LabelPolicy,
) -> Vec<GroupedResult> {
    let mut grouper = Grouper::new();
    for statement in statements {
        let group = grouper.entry(by_object_and_verb(statement, labels));
        group.increment();
        group.observe_name(labels.pick(statement.object_names()));
    }
    grouper.into_sorted_by_count()
}

pub fn project_material_interactions_by_verb(group: &GroupedResult) -> Row {
    vec![
        group.key.url().into(),
        group.name.as_deref().into(),
        group.key.verb().into(),
        group.count.into(),
    ]
}

// materialScores

pub fn plan_material_scores(request: &CaseRequest) -> ReportResult<QueryPlan> {
    Ok(QueryPlan::new(request.base.clone()).with(Predicate::ScoreExists))
}

pub fn aggregate_material_scores(
    statements: &[Statement],
    labels: &LabelPolicy,
) -> Vec<GroupedResult> {
    let mut grouper = Grouper::new();
    for statement in statements {
        let group = grouper.entry(by_object_and_verb(statement, labels));
        group.increment();
        group.count_success(statement.is_success());
        group.observe_name(labels.pick(statement.object_names()));
        group.score.observe_raw(statement.raw_score());
        group
            .score
            .observe_bounds(statement.min_score(), statement.max_score());
    }
    grouper.into_sorted_by_count()
}

pub fn project_material_scores(group: &GroupedResult) -> Row {
    let mut row: Row = vec![
        group.key.url().into(),
        group.key.verb().into(),
        group.name.as_deref().into(),
        group.count.into(),
        group.success_count.into(),
    ];
    row.extend(score_cells(group));
    row
}

// contentTypeVerbs

pub fn plan_content_type_verbs(request: &CaseRequest) -> ReportResult<QueryPlan> {
    Ok(QueryPlan::new(request.base.clone()))
}

pub fn aggregate_content_type_verbs(
    statements: &[Statement],
    labels: &LabelPolicy,
) -> Vec<GroupedResult> {
    let mut grouper = Grouper::new();
    for statement in statements {
        let key = GroupKey::ContentType(statement.category_id().and_then(content_type));
        grouper
            .entry(key)
            .add_verb(labels.pick(statement.verb_display()));
    }
    grouper.into_vec()
}

pub fn project_content_type_verbs(group: &GroupedResult) -> Row {
    let content_type: Cell = match &group.key {
        GroupKey::ContentType(name) => name.as_deref().into(),
        _ => Cell::Empty,
    };
    vec![content_type, join_set(&group.verbs)]
}

// materialScoresAndStatsForPeriodAndUrls

pub fn plan_period_stats(request: &CaseRequest) -> ReportResult<QueryPlan> {
    let options = request
        .options
        .as_ref()
        .ok_or(ReportError::MissingIdentifiers)?;
    let (from, to) = options.window();
    Ok(QueryPlan::new(request.base.clone())
        .with(Predicate::TimestampWithin { from, to })
        .with(Predicate::ObjectOrParentIn(options.ids.clone())))
}

pub fn aggregate_period_stats(
    statements: &[Statement],
    labels: &LabelPolicy,
) -> Vec<GroupedResult> {
    let mut grouper = Grouper::new();
    for statement in statements {
        let group = grouper.entry(by_object_and_verb(statement, labels));
        group.increment();
        group.add_session(statement.registration());
        if let Some(duration) = statement.duration() {
            group.durations.push(duration.to_string());
        }
        // here completion counts as success too
        group.count_success(statement.is_success() || statement.is_completed());
        group.observe_name(labels.pick(statement.object_names()));
        group.score.observe_raw(statement.raw_score());
        group
            .score
            .observe_bounds(statement.min_score(), statement.max_score());
    }
    grouper.into_sorted_by_count()
}

pub fn project_period_stats(group: &GroupedResult) -> Row {
    let average_duration = duration::average_seconds(group.durations.iter().map(String::as_str));
    let mut row: Row = vec![
        group.key.url().into(),
        group.key.verb().into(),
        group.name.as_deref().into(),
        Cell::Int(group.sessions.len() as u64),
        average_duration.into(),
        group.success_count.into(),
    ];
    row.extend(score_cells(group));
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn statement(body: Value) -> Statement {
        Statement::new("lrs", body)
    }

    fn interaction(url: &str, verb: &str) -> Statement {
        statement(json!({
            "object": { "id": url, "definition": { "name": { "en-US": format!("{url} name") } } },
            "verb": { "id": format!("http://adlnet.gov/expapi/verbs/{verb}"), "display": { "en-US": verb } }
        }))
    }

    fn scored(url: &str, raw: Option<f64>, success: bool) -> Statement {
        let mut body = json!({
            "object": { "id": url },
            "verb": { "display": { "en-US": "answered" } },
            "result": { "score": { "min": 0, "max": 1 }, "success": success }
        });
        if let Some(raw) = raw {
            body["result"]["score"]["raw"] = json!(raw);
        }
        statement(body)
    }

    #[test]
    fn groups_sort_by_count_keeping_tie_order() {
        let mut statements = Vec::new();
        for _ in 0..5 {
            statements.push(interaction("http://a", "answered"));
        }
        for _ in 0..2 {
            statements.push(interaction("http://b", "answered"));
        }
        for _ in 0..2 {
            statements.push(interaction("http://c", "answered"));
        }
        // interleave so first-seen order differs from contiguous blocks
        statements.swap(0, 6);

        let groups = aggregate_material_interactions(&statements, &LabelPolicy::default());
        let order: Vec<_> = groups
            .iter()
            .map(|g| (g.key.url().unwrap(), g.count.unwrap()))
            .collect();
        assert_eq!(order, vec![("http://a", 5), ("http://b", 2), ("http://c", 2)]);
    }

    #[test]
    fn tied_groups_follow_first_arrival() {
        let statements = vec![
            interaction("http://c", "answered"),
            interaction("http://b", "answered"),
            interaction("http://b", "answered"),
            interaction("http://c", "answered"),
            interaction("http://a", "answered"),
            interaction("http://a", "answered"),
            interaction("http://a", "answered"),
        ];
        let groups = aggregate_material_interactions(&statements, &LabelPolicy::default());
        let order: Vec<_> = groups.iter().map(|g| g.key.url().unwrap()).collect();
        assert_eq!(order, vec!["http://a", "http://c", "http://b"]);
    }

    #[test]
    fn material_interactions_collects_distinct_verbs() {
        let statements = vec![
            interaction("http://a", "answered"),
            interaction("http://a", "completed"),
            interaction("http://a", "answered"),
        ];
        let groups = aggregate_material_interactions(&statements, &LabelPolicy::default());
        assert_eq!(groups.len(), 1);
        let row = project_material_interactions(&groups[0]);
        assert_eq!(
            row,
            vec![
                Cell::Text("http://a".into()),
                Cell::Text("http://a name".into()),
                Cell::Int(3),
                Cell::Text("answered,completed".into()),
            ]
        );
    }

    #[test]
    fn by_verb_uses_composite_key() {
        let statements = vec![
            interaction("http://a", "answered"),
            interaction("http://a", "completed"),
            interaction("http://a", "answered"),
        ];
        let groups = aggregate_material_interactions_by_verb(&statements, &LabelPolicy::default());
        let rows: Vec<_> = groups.iter().map(project_material_interactions_by_verb).collect();
        assert_eq!(rows[0][2], Cell::Text("answered".into()));
        assert_eq!(rows[0][3], Cell::Int(2));
        assert_eq!(rows[1][2], Cell::Text("completed".into()));
        assert_eq!(rows[1][3], Cell::Int(1));
    }

    #[test]
    fn scores_skip_missing_raw_values() {
        let statements = vec![
            scored("http://a", Some(0.8), true),
            scored("http://a", None, false),
            scored("http://a", Some(0.6), true),
        ];
        let groups = aggregate_material_scores(&statements, &LabelPolicy::default());
        let group = &groups[0];
        assert_eq!(group.count, Some(3));
        assert_eq!(group.success_count, Some(2));
        assert_eq!(group.score.raw_min, Some(0.6));
        assert_eq!(group.score.raw_max, Some(0.8));
        assert!((group.score.raw_avg().unwrap() - 0.7).abs() < 1e-9);

        let row = project_material_scores(group);
        assert_eq!(row.len(), 10);
        assert_eq!(row[5], Cell::Float(0.0));
        assert_eq!(row[6], Cell::Float(1.0));
    }

    #[test]
    fn content_type_strips_library_prefix() {
        assert_eq!(
            content_type("http://h5p.org/libraries/H5P.MultiChoice-1.10").as_deref(),
            Some("H5P.MultiChoice")
        );
        assert_eq!(
            content_type("http://h5p.org/libraries/H5P.Blanks").as_deref(),
            Some("H5P.Blanks")
        );
        assert_eq!(content_type("http://example.com/category"), None);
    }

    #[test]
    fn unmatched_categories_share_a_null_group() {
        let with_category = |id: &str, verb: &str| {
            statement(json!({
                "verb": { "display": { "en-US": verb } },
                "context": { "contextActivities": { "category": [{ "id": id }] } }
            }))
        };
        let statements = vec![
            with_category("http://h5p.org/libraries/H5P.Blanks-1.8", "answered"),
            with_category("http://example.com/other", "attempted"),
            statement(json!({ "verb": { "display": { "en-US": "experienced" } } })),
            with_category("http://h5p.org/libraries/H5P.Blanks-1.9", "completed"),
        ];
        let groups = aggregate_content_type_verbs(&statements, &LabelPolicy::default());
        let rows: Vec<_> = groups.iter().map(project_content_type_verbs).collect();
        assert_eq!(
            rows,
            vec![
                vec![
                    Cell::Text("H5P.Blanks".into()),
                    Cell::Text("answered,completed".into())
                ],
                vec![Cell::Empty, Cell::Text("attempted,experienced".into())],
            ]
        );
    }

    #[test]
    fn period_stats_count_completion_as_success() {
        let statements = vec![
            statement(json!({
                "object": { "id": "http://a" },
                "verb": { "display": { "en-US": "completed" } },
                "result": { "completion": true, "duration": "PT10S", "score": { "raw": 4, "min": 0, "max": 5 } },
                "context": { "registration": "s1" }
            })),
            statement(json!({
                "object": { "id": "http://a" },
                "verb": { "display": { "en-US": "completed" } },
                "result": { "success": true, "duration": "PT20S" },
                "context": { "registration": "s2" }
            })),
            statement(json!({
                "object": { "id": "http://a" },
                "verb": { "display": { "en-US": "completed" } },
                "context": { "registration": "s1" }
            })),
        ];
        let groups = aggregate_period_stats(&statements, &LabelPolicy::default());
        assert_eq!(groups.len(), 1);
        let row = project_period_stats(&groups[0]);
        assert_eq!(row.len(), 11);
        assert_eq!(row[3], Cell::Int(2));
        assert_eq!(row[4], Cell::Float(15.0));
        assert_eq!(row[5], Cell::Int(2));
        assert_eq!(row[9], Cell::Float(4.0));

        let material_scores = aggregate_material_scores(&statements, &LabelPolicy::default());
        assert_eq!(material_scores[0].success_count, Some(1));
    }

    #[test]
    fn period_stats_leave_duration_blank_without_durations() {
        let statements = vec![statement(json!({
            "object": { "id": "http://a" },
            "verb": { "display": { "en-US": "experienced" } }
        }))];
        let groups = aggregate_period_stats(&statements, &LabelPolicy::default());
        let row = project_period_stats(&groups[0]);
        assert_eq!(row[4], Cell::Empty);
        assert_eq!(row[10], Cell::Empty);
    }

    #[test]
    fn malformed_statements_still_count() {
        let statements = vec![
            interaction("http://a", "answered"),
            statement(json!({ "object": { "id": "http://a" }, "verb": "broken" })),
        ];
        let groups = aggregate_material_interactions(&statements, &LabelPolicy::default());
        assert_eq!(groups[0].count, Some(2));
        assert_eq!(groups[0].verbs, vec!["answered"]);
    }

    #[test]
    fn period_plan_requires_options() {
        let request = CaseRequest {
            base: BaseFilter {
                tenant_id: "lrs".into(),
                from: "2018".into(),
                to: "2019".into(),
            },
            labels: LabelPolicy::default(),
            options: None,
        };
        assert!(matches!(
            plan_period_stats(&request),
            Err(ReportError::MissingIdentifiers)
        ));
        assert_eq!(
            plan_material_scores(&request).unwrap(),
            QueryPlan::new(request.base.clone()).with(Predicate::ScoreExists)
        );
    }
}
