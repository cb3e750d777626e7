pub mod actors;
pub mod cascade;
pub mod clock;
pub mod compare;
pub mod config;
pub mod debounce;
pub mod notify;
pub mod storage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a monitored point (analog or digital).
pub type ItemId = String;

/// Identifier of an alarm definition.
pub type AlarmId = i64;

/// A single value update for a point, as delivered by the value feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointUpdate {
    pub item_id: ItemId,

    /// Raw value text. Digital points carry "0"/"1", analog points carry
    /// decimal text.
    pub value: String,

    /// When the value was observed (always UTC).
    pub time: DateTime<Utc>,
}

/// Kind of alarm. Numeric codes are fixed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AlarmKind {
    /// Value-vs-threshold comparison.
    Comparative = 1,
    /// Liveness watchdog: fires on absence of updates.
    Timeout = 2,
}

impl From<AlarmKind> for u8 {
    fn from(kind: AlarmKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for AlarmKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(AlarmKind::Comparative),
            2 => Ok(AlarmKind::Timeout),
            other => Err(format!("unknown alarm kind code: {other}")),
        }
    }
}

/// Comparison operator for comparative alarms. Numeric codes are fixed on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CompareType {
    Equal = 0,
    NotEqual = 1,
    Greater = 2,
    GreaterOrEqual = 3,
    Less = 4,
    LessOrEqual = 5,
    Between = 6,
    OutOfRange = 7,
}

impl CompareType {
    /// Operators that require a second threshold operand.
    pub fn requires_second_operand(&self) -> bool {
        matches!(self, CompareType::Between | CompareType::OutOfRange)
    }
}

impl From<CompareType> for u8 {
    fn from(compare: CompareType) -> u8 {
        compare as u8
    }
}

impl TryFrom<u8> for CompareType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(CompareType::Equal),
            1 => Ok(CompareType::NotEqual),
            2 => Ok(CompareType::Greater),
            3 => Ok(CompareType::GreaterOrEqual),
            4 => Ok(CompareType::Less),
            5 => Ok(CompareType::LessOrEqual),
            6 => Ok(CompareType::Between),
            7 => Ok(CompareType::OutOfRange),
            other => Err(format!("unknown compare type code: {other}")),
        }
    }
}

/// Alarm priority. Numeric codes are fixed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> u8 {
        priority as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Priority::Critical),
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(format!("unknown priority code: {other}")),
        }
    }
}

/// Kind-specific payload of an alarm definition.
///
/// Comparative alarms carry the operator and threshold operands; timeout
/// alarms carry only the maximum silence window. Thresholds are stored as
/// opaque strings because watched points may be digital ("0"/"1") or analog
/// decimal text.
///
/// On the wire this flattens to a `kind` field with the numeric
/// [`AlarmKind`] code plus only the fields of that kind, matching the
/// numeric codes the other enums carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleWire", into = "RuleWire")]
pub enum AlarmRule {
    Comparative {
        compare: CompareType,
        value1: String,
        value2: Option<String>,
    },
    Timeout {
        timeout_seconds: u32,
    },
}

/// Flat wire form of [`AlarmRule`].
#[derive(Serialize, Deserialize)]
struct RuleWire {
    kind: AlarmKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compare: Option<CompareType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u32>,
}

impl From<AlarmRule> for RuleWire {
    fn from(rule: AlarmRule) -> Self {
        match rule {
            AlarmRule::Comparative {
                compare,
                value1,
                value2,
            } => RuleWire {
                kind: AlarmKind::Comparative,
                compare: Some(compare),
                value1: Some(value1),
                value2,
                timeout_seconds: None,
            },
            AlarmRule::Timeout { timeout_seconds } => RuleWire {
                kind: AlarmKind::Timeout,
                compare: None,
                value1: None,
                value2: None,
                timeout_seconds: Some(timeout_seconds),
            },
        }
    }
}

impl TryFrom<RuleWire> for AlarmRule {
    type Error = String;

    fn try_from(wire: RuleWire) -> Result<Self, Self::Error> {
        match wire.kind {
            AlarmKind::Comparative => Ok(AlarmRule::Comparative {
                compare: wire
                    .compare
                    .ok_or_else(|| "comparative alarm is missing its operator".to_string())?,
                value1: wire
                    .value1
                    .ok_or_else(|| "comparative alarm is missing value1".to_string())?,
                value2: wire.value2,
            }),
            AlarmKind::Timeout => Ok(AlarmRule::Timeout {
                timeout_seconds: wire
                    .timeout_seconds
                    .ok_or_else(|| "timeout alarm is missing timeout_seconds".to_string())?,
            }),
        }
    }
}

impl AlarmRule {
    pub fn kind(&self) -> AlarmKind {
        match self {
            AlarmRule::Comparative { .. } => AlarmKind::Comparative,
            AlarmRule::Timeout { .. } => AlarmKind::Timeout,
        }
    }

    /// Human-readable threshold description, used in transition contexts.
    pub fn threshold_text(&self) -> String {
        match self {
            AlarmRule::Comparative {
                compare,
                value1,
                value2,
            } => match value2 {
                Some(value2) => format!("{compare:?}({value1}, {value2})"),
                None => format!("{compare:?}({value1})"),
            },
            AlarmRule::Timeout { timeout_seconds } => {
                format!("Timeout({timeout_seconds}s)")
            }
        }
    }
}

/// An operator-defined alarm rule on a single watched point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    /// Unique id, assigned by the store on insert.
    pub id: AlarmId,

    /// The watched point.
    pub item_id: ItemId,

    /// Kind-specific rule payload.
    #[serde(flatten)]
    pub rule: AlarmRule,

    /// Debounce: how long the triggering condition must hold continuously
    /// before activation. Ignored for timeout alarms (the elapsed silence
    /// already encodes the delay semantics).
    pub delay_seconds: u32,

    pub priority: Priority,

    pub message: String,

    pub message_localized: String,

    /// Disabled definitions are skipped entirely by the evaluator.
    pub is_disabled: bool,

    /// Derived: true iff at least one linked external alarm exists.
    /// Maintained by the store on every external-alarm mutation.
    pub has_external_alarm: bool,
}

impl AlarmDefinition {
    /// Validate the definition for storage.
    ///
    /// Runs at store write time; a definition that fails validation never
    /// reaches the evaluator.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.rule {
            AlarmRule::Comparative {
                compare, value2, ..
            } => {
                if compare.requires_second_operand() && value2.is_none() {
                    return Err(ValidationError::MissingSecondOperand(*compare));
                }
                Ok(())
            }
            AlarmRule::Timeout { timeout_seconds } => {
                if *timeout_seconds == 0 {
                    return Err(ValidationError::NonPositiveTimeout);
                }
                Ok(())
            }
        }
    }
}

/// Validation failures for alarm definitions, rejected at store write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Between/OutOfRange require a second threshold operand.
    MissingSecondOperand(CompareType),

    /// Timeout alarms require a positive silence window.
    NonPositiveTimeout,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingSecondOperand(compare) => {
                write!(f, "{compare:?} requires a second threshold operand")
            }
            ValidationError::NonPositiveTimeout => {
                write!(f, "timeout alarms require timeout_seconds > 0")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// One row per alarm currently in the Active state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlarmRecord {
    pub id: i64,
    pub alarm_id: AlarmId,
    pub item_id: ItemId,
    pub activated_at: DateTime<Utc>,
}

/// Snapshot of the evaluation that produced a transition, persisted with
/// every history entry for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionContext {
    /// The value (or silence description) observed at transition time.
    pub observed_value: String,

    /// Threshold description of the rule at transition time.
    pub threshold: String,

    /// Whether the raw condition evaluated true.
    pub satisfied: bool,
}

/// Append-only record of one Activate or Clear transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub alarm_id: AlarmId,
    pub item_id: ItemId,
    pub time: DateTime<Utc>,

    /// true = this entry records an Activate, false = a Clear.
    pub is_active: bool,

    pub context: TransitionContext,
}

/// A cascade action: writes a configured value to another point when the
/// parent alarm activates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalAlarm {
    pub id: i64,

    /// Parent alarm definition.
    pub alarm_id: AlarmId,

    /// Target point to write.
    pub item_id: ItemId,

    /// Value to write on trigger.
    pub value: String,

    pub is_disabled: bool,
}
