use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::cases::{self, CaseRequest};
use crate::db::RecordSource;
use crate::error::{ReportError, ReportResult};
use crate::models::LabelPolicy;
use crate::options::PeriodOptions;
use crate::query::BaseFilter;
use crate::registry::{CaseDefinition, CaseRegistry, Selection};
use crate::report::CsvSink;

/// A validated request to run, built before any connection is opened.
#[derive(Debug, Clone)]
pub enum Invocation {
    Single {
        case: CaseDefinition,
        options: Option<PeriodOptions>,
    },
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    pub case: &'static str,
    pub file: PathBuf,
    pub rows: usize,
}

/// Looks the case up and resolves its options. Option errors surface here,
/// before any query is attempted.
pub fn prepare(registry: &CaseRegistry, name: &str, args: &[String]) -> ReportResult<Invocation> {
    match registry.select(name)? {
        Selection::All => Ok(Invocation::All),
        Selection::Single(case) => {
            let options = case.resolve_options.map(|resolve| resolve(args)).transpose()?;
            Ok(Invocation::Single {
                case: *case,
                options,
            })
        }
    }
}

#[derive(Clone)]
pub struct Runner {
    source: Arc<dyn RecordSource>,
    sink: CsvSink,
    base: BaseFilter,
    labels: LabelPolicy,
}

impl Runner {
    pub fn new(
        source: Arc<dyn RecordSource>,
        sink: CsvSink,
        base: BaseFilter,
        labels: LabelPolicy,
    ) -> Self {
        Self {
            source,
            sink,
            base,
            labels,
        }
    }

    /// Query, projection and file output for one case.
    pub async fn run_case(
        &self,
        case: &CaseDefinition,
        options: Option<PeriodOptions>,
    ) -> ReportResult<CaseOutcome> {
        tracing::info!(case = case.name, "running case");
        let request = CaseRequest {
            base: self.base.clone(),
            labels: self.labels.clone(),
            options,
        };
        let groups = cases::run(self.source.as_ref(), case, &request).await?;

        // file output is blocking; keep it off the runtime workers
        let sink = self.sink.clone();
        let (file, header, project) = (case.file, case.header, case.project);
        let rows = tokio::task::spawn_blocking(move || sink.write(file, Some(header), groups, project))
            .await
            .map_err(|err| ReportError::TaskAborted {
                case: case.name.to_string(),
                message: err.to_string(),
            })??;
        tracing::info!(case = case.name, rows, "case finished");

        Ok(CaseOutcome {
            case: case.name,
            file: self.sink.path_for(case.file),
            rows,
        })
    }

    /// Runs every option-free case concurrently and waits for all of them.
    /// A failing case does not cancel its siblings; outcomes come back in
    /// registration order.
    pub async fn run_all(&self, registry: &CaseRegistry) -> Vec<ReportResult<CaseOutcome>> {
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();
        let mut order = Vec::new();

        for case in registry.option_free().copied() {
            let runner = self.clone();
            let handle = tasks.spawn(async move { (case.name, runner.run_case(&case, None).await) });
            names.insert(handle.id(), case.name);
            order.push(case.name);
        }

        let mut finished = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, outcome) = match joined {
                Ok(done) => done,
                Err(err) => {
                    let name = names.get(&err.id()).copied().unwrap_or_default();
                    let aborted = ReportError::TaskAborted {
                        case: name.to_string(),
                        message: err.to_string(),
                    };
                    (name, Err(aborted))
                }
            };
            if let Err(err) = &outcome {
                tracing::error!(case = name, error = %err, "case failed");
            }
            finished.insert(name, outcome);
        }

        order
            .into_iter()
            .filter_map(|name| finished.remove(name))
            .collect()
    }

    pub async fn execute(
        &self,
        registry: &CaseRegistry,
        invocation: Invocation,
    ) -> Vec<ReportResult<CaseOutcome>> {
        match invocation {
            Invocation::Single { case, options } => vec![self.run_case(&case, options).await],
            Invocation::All => self.run_all(registry).await,
        }
    }
}
