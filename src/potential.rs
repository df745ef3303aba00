use serde::Serialize;
use serde_json::{json, Value};

/// Highest per-task score; the denominator of the percentage.
const MAX_SCORE: i64 = 5;

pub const PERCENT_RANGE: std::ops::RangeInclusive<i64> = 0..=100;

/// Ordinal quality rating given to a graded task, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TaskStatus {
    Worse,
    Bad,
    Good,
    Better,
    Perfect,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Worse,
        TaskStatus::Bad,
        TaskStatus::Good,
        TaskStatus::Better,
        TaskStatus::Perfect,
    ];

    pub fn score(self) -> i64 {
        match self {
            TaskStatus::Worse => 1,
            TaskStatus::Bad => 2,
            TaskStatus::Good => 3,
            TaskStatus::Better => 4,
            TaskStatus::Perfect => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Worse => "Worse",
            TaskStatus::Bad => "Bad",
            TaskStatus::Good => "Good",
            TaskStatus::Better => "Better",
            TaskStatus::Perfect => "Perfect",
        }
    }

    /// Wire names are matched ASCII case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }
}

/// Label bands over the mean adjusted score, checked from the top.
/// Anything below the last band is `Worse`.
const LABEL_BANDS: [(f64, TaskStatus); 4] = [
    (4.5, TaskStatus::Perfect),
    (3.5, TaskStatus::Better),
    (2.5, TaskStatus::Good),
    (1.5, TaskStatus::Bad),
];

fn label_for_mean(mean: f64) -> TaskStatus {
    LABEL_BANDS
        .iter()
        .find(|(min, _)| mean >= *min)
        .map(|(_, status)| *status)
        .unwrap_or(TaskStatus::Worse)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub is_overdue: bool,
}

impl TaskOutcome {
    pub fn new(status: TaskStatus, is_overdue: bool) -> Self {
        Self { status, is_overdue }
    }

    /// Rank score minus one when overdue, never below zero.
    pub fn adjusted_score(&self) -> i64 {
        let raw = self.status.score();
        let adjusted = if self.is_overdue { raw - 1 } else { raw };
        adjusted.max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialResult {
    pub percent: i64,
    pub label: TaskStatus,
    pub delta: i64,
    /// Same value as `label`; older consumers read this name.
    pub status: TaskStatus,
}

impl PotentialResult {
    fn empty() -> Self {
        Self {
            percent: 0,
            label: TaskStatus::Worse,
            delta: 0,
            status: TaskStatus::Worse,
        }
    }
}

/// Summarizes a student's recent tasks as a percentage, a quality label and
/// the change against `previous_percent`.
///
/// An empty task list yields the zero result and ignores `previous_percent`.
/// The percentage rounds half up (62.5 becomes 63) and is computed in integer
/// arithmetic so the boundary is exact. The label is banded from the
/// unrounded mean, independently of the percentage.
pub fn compute_potential(tasks: &[TaskOutcome], previous_percent: Option<i64>) -> PotentialResult {
    if tasks.is_empty() {
        return PotentialResult::empty();
    }

    let count = tasks.len() as i64;
    let sum: i64 = tasks.iter().map(TaskOutcome::adjusted_score).sum();

    // round(100 * sum / (MAX_SCORE * count)), half up.
    let percent = (200 * sum + MAX_SCORE * count) / (2 * MAX_SCORE * count);
    let label = label_for_mean(sum as f64 / count as f64);
    let delta = previous_percent
        .map(|p| percent.saturating_sub(p))
        .unwrap_or(0);

    PotentialResult {
        percent,
        label,
        delta,
        status: label,
    }
}

/// Half-up rounding to a whole percent: `Int(x + 0.5)`.
///
/// Only meaningful for finite `x` well inside the `i64` range; the cast
/// saturates outside it. Callers range-check first (see
/// `parse_previous_percent`).
pub fn round_percent_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[derive(Debug, Clone, Serialize)]
pub struct PotentialError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl PotentialError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Reads `[{ "status": "Good", "isOverdue": false }, ...]`.
///
/// Statuses outside the five ranks are rejected with `unknown_status` rather
/// than defaulted.
pub fn parse_tasks(raw: Option<&Value>) -> Result<Vec<TaskOutcome>, PotentialError> {
    let Some(raw) = raw else {
        return Err(PotentialError::new("bad_params", "missing tasks"));
    };
    let Some(items) = raw.as_array() else {
        return Err(PotentialError::new("bad_params", "tasks must be an array"));
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            return Err(
                PotentialError::new("bad_params", "each task must be an object")
                    .with_details(json!({ "index": index })),
            );
        };

        let status = match obj.get("status") {
            Some(Value::String(s)) => match TaskStatus::parse(s) {
                Some(v) => v,
                None => {
                    return Err(PotentialError::new(
                        "unknown_status",
                        format!("unknown task status: {}", s),
                    )
                    .with_details(json!({ "index": index, "value": s })))
                }
            },
            Some(other) if !other.is_null() => {
                return Err(PotentialError::new("unknown_status", "task status must be a string")
                    .with_details(json!({ "index": index, "value": other })))
            }
            _ => {
                return Err(PotentialError::new("bad_params", "task is missing status")
                    .with_details(json!({ "index": index })))
            }
        };

        let is_overdue = match obj.get("isOverdue") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(PotentialError::new("bad_params", "isOverdue must be a boolean")
                    .with_details(json!({ "index": index })))
            }
        };

        out.push(TaskOutcome::new(status, is_overdue));
    }
    Ok(out)
}

/// Absent or null means no previous score. Fractional values round half up.
/// The value must be a percentage: after rounding it lies in `0..=100`.
pub fn parse_previous_percent(raw: Option<&Value>) -> Result<Option<i64>, PotentialError> {
    let out_of_range = || {
        PotentialError::new("bad_params", "previousPercent must be between 0 and 100")
    };
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            if let Some(i) = v.as_i64() {
                return if PERCENT_RANGE.contains(&i) {
                    Ok(Some(i))
                } else {
                    Err(out_of_range())
                };
            }
            match v.as_f64() {
                // Half up maps exactly [-0.5, 100.5) onto 0..=100.
                Some(f) if (-0.5..100.5).contains(&f) => Ok(Some(round_percent_half_up(f))),
                Some(f) if f.is_finite() => Err(out_of_range()),
                _ => Err(PotentialError::new(
                    "bad_params",
                    "previousPercent must be a number",
                )),
            }
        }
    }
}
