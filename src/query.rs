use sqlx::{Postgres, QueryBuilder};

use crate::models::Statement;

/// Tenant and reporting-period filter every plan starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseFilter {
    pub tenant_id: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    ScoreExists,
    TimestampWithin { from: String, to: String },
    ObjectOrParentIn(Vec<String>),
}

/// Timestamps are compared as strings, byte by byte. They are not
/// normalized to one timezone.
fn within(timestamp: Option<&str>, from: &str, to: &str) -> bool {
    timestamp.is_some_and(|ts| ts >= from && ts < to)
}

fn push_timestamp_window(builder: &mut QueryBuilder<'_, Postgres>, from: &str, to: &str) {
    builder.push("(statement->>'timestamp') COLLATE \"C\" >= ");
    builder.push_bind(from.to_string());
    builder.push(" AND (statement->>'timestamp') COLLATE \"C\" < ");
    builder.push_bind(to.to_string());
}

impl Predicate {
    pub fn matches(&self, statement: &Statement) -> bool {
        match self {
            Predicate::ScoreExists => statement.has_score(),
            Predicate::TimestampWithin { from, to } => within(statement.timestamp(), from, to),
            Predicate::ObjectOrParentIn(ids) => {
                let listed = |id: &str| ids.iter().any(|candidate| candidate == id);
                statement.object_id().is_some_and(listed) || statement.parent_ids().any(listed)
            }
        }
    }

    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Predicate::ScoreExists => {
                builder.push("(statement #> '{result,score}') IS NOT NULL");
            }
            Predicate::TimestampWithin { from, to } => push_timestamp_window(builder, from, to),
            Predicate::ObjectOrParentIn(ids) => {
                builder.push("((statement #>> '{object,id}') = ANY(");
                builder.push_bind(ids.clone());
                builder.push(
                    ") OR EXISTS (SELECT 1 FROM jsonb_array_elements(\
                     CASE WHEN jsonb_typeof(statement #> '{context,contextActivities,parent}') = 'array' \
                     THEN statement #> '{context,contextActivities,parent}' ELSE '[]'::jsonb END) AS parent \
                     WHERE (parent->>'id') = ANY(",
                );
                builder.push_bind(ids.clone());
                builder.push(")))");
            }
        }
    }
}

/// A query over the statement store. The base filter is fixed at
/// construction; case-specific predicates can only narrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    base: BaseFilter,
    predicates: Vec<Predicate>,
}

impl QueryPlan {
    pub fn new(base: BaseFilter) -> Self {
        Self {
            base,
            predicates: Vec::new(),
        }
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn base(&self) -> &BaseFilter {
        &self.base
    }

    pub fn matches(&self, statement: &Statement) -> bool {
        statement.tenant_id == self.base.tenant_id
            && within(statement.timestamp(), &self.base.from, &self.base.to)
            && self.predicates.iter().all(|p| p.matches(statement))
    }

    /// Renders the plan as one `SELECT` over the `statements` table, in
    /// arrival order.
    pub fn to_sql(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT statement FROM statements WHERE lrs_id = ");
        builder.push_bind(self.base.tenant_id.clone());
        builder.push(" AND ");
        push_timestamp_window(&mut builder, &self.base.from, &self.base.to);
        for predicate in &self.predicates {
            builder.push(" AND ");
            predicate.push_sql(&mut builder);
        }
        builder.push(" ORDER BY id");
        builder
    }
}
