use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(?P<years>\d+(?:[.,]\d+)?)Y)?(?:(?P<months>\d+(?:[.,]\d+)?)M)?(?:(?P<weeks>\d+(?:[.,]\d+)?)W)?(?:(?P<days>\d+(?:[.,]\d+)?)D)?(?:T(?:(?P<hours>\d+(?:[.,]\d+)?)H)?(?:(?P<minutes>\d+(?:[.,]\d+)?)M)?(?:(?P<seconds>\d+(?:[.,]\d+)?)S)?)?$",
    )
    .expect("duration pattern is valid")
});

const UNITS: [(&str, f64); 7] = [
    ("years", 365.0 * 86_400.0),
    ("months", 30.0 * 86_400.0),
    ("weeks", 7.0 * 86_400.0),
    ("days", 86_400.0),
    ("hours", 3_600.0),
    ("minutes", 60.0),
    ("seconds", 1.0),
];

/// Converts an ISO-8601 duration such as `PT1M30.5S` to seconds.
///
/// Calendar units use fixed lengths: a year is 365 days and a month 30.
/// Returns `None` for anything that is not a duration, including a bare
/// `P` or `PT`.
pub fn to_seconds(duration: &str) -> Option<f64> {
    let captures = ISO_DURATION.captures(duration.trim())?;
    let mut seen = false;
    let mut total = 0.0;
    for (unit, seconds) in UNITS {
        if let Some(value) = captures.name(unit) {
            let value: f64 = value.as_str().replace(',', ".").parse().ok()?;
            total += value * seconds;
            seen = true;
        }
    }
    seen.then_some(total)
}

/// Mean length in seconds of the durations that parse; `None` when none do.
pub fn average_seconds<'a, I>(durations: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut total = 0.0;
    let mut n = 0usize;
    for duration in durations {
        match to_seconds(duration) {
            Some(seconds) => {
                total += seconds;
                n += 1;
            }
            None => tracing::debug!(duration, "skipping unparsable duration"),
        }
    }
    (n > 0).then(|| total / n as f64)
}
