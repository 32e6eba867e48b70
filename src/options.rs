use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{ReportError, ReportResult};

/// Reporting period and object ids for the period-limited case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodOptions {
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
    pub ids: Vec<String>,
}

impl PeriodOptions {
    /// Boundaries in the same textual form statement timestamps are stored
    /// in, for lexical comparison. Both are rendered in the offset of `from`
    /// so the string order matches the instant order.
    pub fn window(&self) -> (String, String) {
        let to = self.to.with_timezone(self.from.offset());
        (
            self.from.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            to.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        )
    }
}

fn parse_boundary(raw: Option<&String>, label: &str) -> ReportResult<DateTime<FixedOffset>> {
    let raw = raw
        .map(|value| value.trim())
        .ok_or_else(|| ReportError::InvalidDateRange(format!("missing {label} date")))?;

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().fixed_offset())
        .ok_or_else(|| {
            ReportError::InvalidDateRange(format!("{label} date is not suitable: {raw}"))
        })
}

/// Builds options from the positional arguments that follow the case name:
/// start, end, then one or more object ids.
pub fn resolve_period(args: &[String]) -> ReportResult<PeriodOptions> {
    let from = parse_boundary(args.first(), "beginning")?;
    let to = parse_boundary(args.get(1), "end")?;

    if to <= from {
        return Err(ReportError::InvalidDateRange(format!(
            "beginning date {} is not before the end date {}",
            from.with_timezone(&Utc),
            to.with_timezone(&Utc)
        )));
    }

    let ids: Vec<String> = args.iter().skip(2).cloned().collect();
    if ids.is_empty() {
        return Err(ReportError::MissingIdentifiers);
    }

    Ok(PeriodOptions { from, to, ids })
}
