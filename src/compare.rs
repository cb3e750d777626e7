//! Raw condition evaluation for comparative alarms.
//!
//! All six scalar operators compare numerically when both operands parse as
//! floating point, and fall back to ordinal string equality otherwise
//! (digital on/off points compare as "0"/"1"). `Between` is true iff
//! `min(v1, v2) <= observed <= max(v1, v2)`; `OutOfRange` is its negation.

use crate::CompareType;

/// Failure of a single evaluation. The evaluator degrades these to
/// fail-safe-false and logs a diagnostic; they never cross the actor
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareError {
    /// The operator requires numeric operands, but one of them does not
    /// parse as a number.
    NonNumeric {
        compare: CompareType,
        operand: String,
    },

    /// The operator requires a second threshold operand that is missing.
    /// Rejected at store write time; kept here so the evaluator stays
    /// fail-safe against stale cached definitions.
    MissingOperand(CompareType),
}

impl std::fmt::Display for CompareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareError::NonNumeric { compare, operand } => {
                write!(f, "{compare:?} requires numeric operands, got {operand:?}")
            }
            CompareError::MissingOperand(compare) => {
                write!(f, "{compare:?} is missing its second threshold operand")
            }
        }
    }
}

impl std::error::Error for CompareError {}

/// Evaluate a comparative rule against an observed value.
pub fn compare(
    compare: CompareType,
    observed: &str,
    value1: &str,
    value2: Option<&str>,
) -> Result<bool, CompareError> {
    match compare {
        CompareType::Equal => Ok(loose_equal(observed, value1)),
        CompareType::NotEqual => Ok(!loose_equal(observed, value1)),
        CompareType::Greater => numeric(compare, observed, value1).map(|(v, a)| v > a),
        CompareType::GreaterOrEqual => numeric(compare, observed, value1).map(|(v, a)| v >= a),
        CompareType::Less => numeric(compare, observed, value1).map(|(v, a)| v < a),
        CompareType::LessOrEqual => numeric(compare, observed, value1).map(|(v, a)| v <= a),
        CompareType::Between => in_range(compare, observed, value1, value2),
        CompareType::OutOfRange => in_range(compare, observed, value1, value2).map(|b| !b),
    }
}

/// Numeric equality when both sides parse, ordinal string equality
/// otherwise.
fn loose_equal(observed: &str, threshold: &str) -> bool {
    match (parse(observed), parse(threshold)) {
        (Some(v), Some(a)) => v == a,
        _ => observed.trim() == threshold.trim(),
    }
}

fn in_range(
    op: CompareType,
    observed: &str,
    value1: &str,
    value2: Option<&str>,
) -> Result<bool, CompareError> {
    let Some(value2) = value2 else {
        return Err(CompareError::MissingOperand(op));
    };

    let (v, a) = numeric(op, observed, value1)?;
    let (_, b) = numeric(op, observed, value2)?;

    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    Ok(low <= v && v <= high)
}

fn numeric(op: CompareType, observed: &str, threshold: &str) -> Result<(f64, f64), CompareError> {
    let v = parse(observed).ok_or_else(|| CompareError::NonNumeric {
        compare: op,
        operand: observed.to_string(),
    })?;
    let a = parse(threshold).ok_or_else(|| CompareError::NonNumeric {
        compare: op,
        operand: threshold.to_string(),
    })?;
    Ok((v, a))
}

fn parse(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
