use std::collections::HashMap;

use crate::cases::{self, CaseRequest};
use crate::error::{ReportError, ReportResult};
use crate::models::{GroupedResult, LabelPolicy, Row, Statement};
use crate::options::{self, PeriodOptions};
use crate::query::QueryPlan;

pub const ALL_CASES: &str = "all";
pub const ALL_CASES_TITLE: &str = "All (except for ones that require additional options)";

pub type PlanFn = fn(&CaseRequest) -> ReportResult<QueryPlan>;
pub type AggregateFn = fn(&[Statement], &LabelPolicy) -> Vec<GroupedResult>;
pub type ProjectFn = fn(&GroupedResult) -> Row;
pub type ResolveFn = fn(&[String]) -> ReportResult<PeriodOptions>;

/// Static description of one report.
#[derive(Debug, Clone, Copy)]
pub struct CaseDefinition {
    pub name: &'static str,
    pub title: &'static str,
    pub file: &'static str,
    pub header: &'static [&'static str],
    pub plan: PlanFn,
    pub aggregate: AggregateFn,
    pub project: ProjectFn,
    pub resolve_options: Option<ResolveFn>,
}

impl CaseDefinition {
    pub fn needs_options(&self) -> bool {
        self.resolve_options.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    All,
    Single(&'a CaseDefinition),
}

#[derive(Debug, Default)]
pub struct CaseRegistry {
    cases: Vec<CaseDefinition>,
    index: HashMap<&'static str, usize>,
}

impl CaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics on a duplicate or reserved name.
    pub fn register(&mut self, definition: CaseDefinition) {
        assert!(
            definition.name != ALL_CASES,
            "case name `{ALL_CASES}` is reserved"
        );
        assert!(
            !self.index.contains_key(definition.name),
            "case `{}` registered twice",
            definition.name
        );
        self.index.insert(definition.name, self.cases.len());
        self.cases.push(definition);
    }

    pub fn get(&self, name: &str) -> ReportResult<&CaseDefinition> {
        self.index
            .get(name)
            .map(|&slot| &self.cases[slot])
            .ok_or_else(|| ReportError::UnknownCase(name.to_string()))
    }

    pub fn select(&self, name: &str) -> ReportResult<Selection<'_>> {
        if name == ALL_CASES {
            Ok(Selection::All)
        } else {
            self.get(name).map(Selection::Single)
        }
    }

    /// Case names and titles in registration order, `all` last.
    pub fn list_all(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.cases
            .iter()
            .map(|case| (case.name, case.title))
            .chain(std::iter::once((ALL_CASES, ALL_CASES_TITLE)))
    }

    /// The cases `all` runs.
    pub fn option_free(&self) -> impl Iterator<Item = &CaseDefinition> + '_ {
        self.cases.iter().filter(|case| !case.needs_options())
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(CaseDefinition {
            name: "materialInteractions",
            title: "Material interactions",
            file: "material-interactions.csv",
            header: &["URL", "name", "count", "verbs"],
            plan: cases::plan_material_interactions,
            aggregate: cases::aggregate_material_interactions,
            project: cases::project_material_interactions,
            resolve_options: None,
        });
        registry.register(CaseDefinition {
            name: "materialInteractionsByVerb",
            title: "Material interactions by verb",
            file: "material-interactions-by-verb.csv",
            header: &["URL", "name", "verb", "count"],
            plan: cases::plan_material_interactions_by_verb,
            aggregate: cases::aggregate_material_interactions_by_verb,
            project: cases::project_material_interactions_by_verb,
            resolve_options: None,
        });
        registry.register(CaseDefinition {
            name: "materialScores",
            title: "Material scores",
            file: "material-scores.csv",
            header: &[
                "URL",
                "verb",
                "name",
                "statement count",
                "success count",
                "minimum possible score",
                "maximum possible score",
                "student minimum score (raw)",
                "student maximum score (raw)",
                "student average score (raw)",
            ],
            plan: cases::plan_material_scores,
            aggregate: cases::aggregate_material_scores,
            project: cases::project_material_scores,
            resolve_options: None,
        });
        registry.register(CaseDefinition {
            name: "contentTypeVerbs",
            title: "Verbs by content type",
            file: "content-type-verbs.csv",
            header: &["content type", "verbs"],
            plan: cases::plan_content_type_verbs,
            aggregate: cases::aggregate_content_type_verbs,
            project: cases::project_content_type_verbs,
            resolve_options: None,
        });
        registry.register(CaseDefinition {
            name: "materialScoresAndStatsForPeriodAndUrls",
            title: "Material scores and other statistics limited to certain period and object URLs",
            file: "material-scores-and-stats-for-period-and-urls.csv",
            header: &[
                "URL",
                "verb",
                "name",
                "unique sessions count",
                "average duration (seconds)",
                "success count",
                "minimum possible score",
                "maximum possible score",
                "student minimum score (raw)",
                "student maximum score (raw)",
                "student average score (raw)",
            ],
            plan: cases::plan_period_stats,
            aggregate: cases::aggregate_period_stats,
            project: cases::project_period_stats,
            resolve_options: Some(options::resolve_period),
        });
        registry
    }
}
