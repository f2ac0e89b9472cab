//! Structured signal filters.
//!
//! A [`Predicate`] is a small boolean tree over signal fields. It can be
//! built in code, deserialized from the scan config, or parsed from a
//! one-line expression such as
//! `recent_hits > 0 && absorption_volume == true || opolv`.
//! `&&` binds tighter than `||`; there are no parentheses.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pivotlab_core::analysis::Signal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("empty filter expression")]
    Empty,

    #[error("unknown signal field '{0}'")]
    UnknownField(String),

    #[error("malformed clause '{0}': expected `field op value`")]
    MalformedClause(String),
}

// ── Fields ───────────────────────────────────────────────────────────

/// A scalar signal field that can appear in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Symbol,
    Date,
    Trade,
    #[serde(alias = "prior_hits_count")]
    PriorHits,
    #[serde(alias = "recent_hits_count")]
    RecentHits,
    #[serde(alias = "recent_hits_on_greater_volume_count")]
    RecentHitsOnGreaterVolume,
    AbsorptionVolume,
    AllRecentHitsDecreasing,
    BelowAvgVol,
    #[serde(alias = "opolv")]
    OuterPivotOnLowerVolume,
    #[serde(alias = "opolv_date")]
    OuterPivotOnLowerVolumeDate,
    Price,
    Volume,
    TrailingAvgVolume,
    Close,
    #[serde(alias = "next_close")]
    NextDayClose,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::Symbol,
        Field::Date,
        Field::Trade,
        Field::PriorHits,
        Field::RecentHits,
        Field::RecentHitsOnGreaterVolume,
        Field::AbsorptionVolume,
        Field::AllRecentHitsDecreasing,
        Field::BelowAvgVol,
        Field::OuterPivotOnLowerVolume,
        Field::OuterPivotOnLowerVolumeDate,
        Field::Price,
        Field::Volume,
        Field::TrailingAvgVolume,
        Field::Close,
        Field::NextDayClose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Symbol => "symbol",
            Field::Date => "date",
            Field::Trade => "trade",
            Field::PriorHits => "prior_hits",
            Field::RecentHits => "recent_hits",
            Field::RecentHitsOnGreaterVolume => "recent_hits_on_greater_volume",
            Field::AbsorptionVolume => "absorption_volume",
            Field::AllRecentHitsDecreasing => "all_recent_hits_decreasing",
            Field::BelowAvgVol => "below_avg_vol",
            Field::OuterPivotOnLowerVolume => "outer_pivot_on_lower_volume",
            Field::OuterPivotOnLowerVolumeDate => "outer_pivot_on_lower_volume_date",
            Field::Price => "price",
            Field::Volume => "volume",
            Field::TrailingAvgVolume => "trailing_avg_volume",
            Field::Close => "close",
            Field::NextDayClose => "next_day_close",
        }
    }

    /// Read this field from a signal.
    pub fn extract(&self, s: &Signal) -> Value {
        match self {
            Field::Symbol => Value::Text(s.symbol.clone()),
            Field::Date => Value::Date(s.date),
            Field::Trade => Value::Text(s.trade.as_str().to_string()),
            Field::PriorHits => Value::Number(s.prior_hits_count as f64),
            Field::RecentHits => Value::Number(s.recent_hits_count as f64),
            Field::RecentHitsOnGreaterVolume => {
                Value::Number(s.recent_hits_on_greater_volume_count as f64)
            }
            Field::AbsorptionVolume => Value::Bool(s.absorption_volume),
            Field::AllRecentHitsDecreasing => s.all_recent_hits_decreasing.map_or(Value::Null, Value::Bool),
            Field::BelowAvgVol => Value::Bool(s.below_avg_vol),
            Field::OuterPivotOnLowerVolume => Value::Bool(s.outer_pivot_on_lower_volume),
            Field::OuterPivotOnLowerVolumeDate => {
                s.outer_pivot_on_lower_volume_date.map_or(Value::Null, Value::Date)
            }
            Field::Price => Value::Number(s.price),
            Field::Volume => Value::Number(s.volume as f64),
            Field::TrailingAvgVolume => s.trailing_avg_volume.map_or(Value::Null, Value::Number),
            Field::Close => Value::Number(s.close),
            Field::NextDayClose => s.next_day_close.map_or(Value::Null, Value::Number),
        }
    }

    fn is_boolean(&self) -> bool {
        matches!(
            self,
            Field::AbsorptionVolume
                | Field::AllRecentHitsDecreasing
                | Field::BelowAvgVol
                | Field::OuterPivotOnLowerVolume
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if let Some(field) = Field::ALL.iter().find(|f| f.as_str() == name) {
            return Ok(*field);
        }
        match name {
            "prior_hits_count" => Ok(Field::PriorHits),
            "recent_hits_count" => Ok(Field::RecentHits),
            "recent_hits_on_greater_volume_count" => Ok(Field::RecentHitsOnGreaterVolume),
            "opolv" => Ok(Field::OuterPivotOnLowerVolume),
            "opolv_date" => Ok(Field::OuterPivotOnLowerVolumeDate),
            "next_close" => Ok(Field::NextDayClose),
            _ => Err(FilterError::UnknownField(name.to_string())),
        }
    }
}

// ── Values and comparators ───────────────────────────────────────────

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
    Null,
}

impl Value {
    /// Parse an expression literal: `true`, `false`, `null`, a number,
    /// a `YYYY-MM-DD` date, or text (optionally quoted).
    fn parse_literal(raw: &str) -> Value {
        let raw = raw.trim();
        match raw {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            "null" | "N/A" => return Value::Null,
            _ => {}
        }
        if let Ok(n) = raw.parse::<f64>() {
            return Value::Number(n);
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Value::Date(d);
        }
        let unquoted = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
            .unwrap_or(raw);
        Value::Text(unquoted.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Text(t) => write!(f, "\"{t}\""),
            Value::Null => f.write_str("null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    /// Longest tokens first so `<=` is not read as `<`.
    const TOKENS: [(&'static str, CompareOp); 8] = [
        ("===", CompareOp::Eq),
        ("!==", CompareOp::Ne),
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Compare two values.
    ///
    /// Null equals only null. Values of different kinds never match, and
    /// booleans only support equality.
    pub fn apply(&self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering;

        let ordering: Option<Ordering> = match (left, right) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) | (_, Value::Null) => {
                return matches!(self, CompareOp::Ne);
            }
            (Value::Bool(a), Value::Bool(b)) => {
                return match self {
                    CompareOp::Eq => a == b,
                    CompareOp::Ne => a != b,
                    _ => false,
                };
            }
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        };

        match (ordering, self) {
            (None, _) => false,
            (Some(o), CompareOp::Eq) => o == Ordering::Equal,
            (Some(o), CompareOp::Ne) => o != Ordering::Equal,
            (Some(o), CompareOp::Lt) => o == Ordering::Less,
            (Some(o), CompareOp::Le) => o != Ordering::Greater,
            (Some(o), CompareOp::Gt) => o == Ordering::Greater,
            (Some(o), CompareOp::Ge) => o != Ordering::Less,
        }
    }
}

// ── Predicate ────────────────────────────────────────────────────────

/// Boolean filter over signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Field against a literal.
    Compare { field: Field, op: CompareOp, value: Value },
    /// Field against another field of the same signal.
    CompareFields { left: Field, op: CompareOp, right: Field },
    /// Every clause holds. Empty is true.
    And(Vec<Predicate>),
    /// Any clause holds. Empty is false.
    Or(Vec<Predicate>),
    /// Matches everything.
    All,
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::All
    }
}

impl Predicate {
    pub fn compare(field: Field, op: CompareOp, value: Value) -> Self {
        Predicate::Compare { field, op, value }
    }

    pub fn is_true(field: Field) -> Self {
        Predicate::compare(field, CompareOp::Eq, Value::Bool(true))
    }

    /// The volume-spread setup: every recent hit traded heavier than the
    /// pivot, at least one of them heavy enough to count as absorption, the
    /// heavy hits shrinking toward the pivot, the pivot itself on light
    /// volume, and the pivot pushing past its latest hit on lower volume.
    /// With a date, only signals on that session match.
    pub fn vsa_setup(date: Option<NaiveDate>) -> Self {
        let mut clauses = vec![
            Predicate::CompareFields {
                left: Field::RecentHitsOnGreaterVolume,
                op: CompareOp::Eq,
                right: Field::RecentHits,
            },
            Predicate::compare(Field::RecentHits, CompareOp::Gt, Value::Number(0.0)),
            Predicate::is_true(Field::AbsorptionVolume),
            Predicate::is_true(Field::BelowAvgVol),
            Predicate::is_true(Field::AllRecentHitsDecreasing),
            Predicate::is_true(Field::OuterPivotOnLowerVolume),
        ];
        let setup = Predicate::And(clauses);
        match date {
            Some(date) => setup.on_date(date),
            None => setup,
        }
    }

    /// Narrow this predicate to signals on one session.
    pub fn on_date(self, date: NaiveDate) -> Self {
        let clause = Predicate::compare(Field::Date, CompareOp::Eq, Value::Date(date));
        match self {
            Predicate::All => clause,
            Predicate::And(mut clauses) => {
                clauses.push(clause);
                Predicate::And(clauses)
            }
            other => Predicate::And(vec![other, clause]),
        }
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        match self {
            Predicate::Compare { field, op, value } => op.apply(&field.extract(signal), value),
            Predicate::CompareFields { left, op, right } => {
                op.apply(&left.extract(signal), &right.extract(signal))
            }
            Predicate::And(clauses) => clauses.iter().all(|p| p.matches(signal)),
            Predicate::Or(clauses) => clauses.iter().any(|p| p.matches(signal)),
            Predicate::All => true,
        }
    }

    /// Keep the signals this predicate matches, in order.
    pub fn apply<'a>(&self, signals: &'a [Signal]) -> Vec<&'a Signal> {
        signals.iter().filter(|s| self.matches(s)).collect()
    }

    /// Parse `clause && clause || clause`.
    ///
    /// A clause is `field op value`, `field op field`, or a bare boolean
    /// field meaning `field == true`.
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        if expr.trim().is_empty() {
            return Err(FilterError::Empty);
        }
        let mut any = Vec::new();
        for alternative in expr.split("||") {
            let mut all = Vec::new();
            for clause in alternative.split("&&") {
                all.push(parse_clause(clause)?);
            }
            any.push(collapse(all, Predicate::And));
        }
        Ok(collapse(any, Predicate::Or))
    }
}

fn collapse(mut clauses: Vec<Predicate>, wrap: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        wrap(clauses)
    }
}

fn parse_clause(clause: &str) -> Result<Predicate, FilterError> {
    let clause = clause.trim();
    if clause.is_empty() {
        return Err(FilterError::MalformedClause(clause.to_string()));
    }

    let Some((at, token, op)) = find_operator(clause) else {
        let field: Field = clause.parse()?;
        if !field.is_boolean() {
            return Err(FilterError::MalformedClause(clause.to_string()));
        }
        return Ok(Predicate::is_true(field));
    };

    let lhs = clause[..at].trim();
    let rhs = clause[at + token.len()..].trim();
    if lhs.is_empty() || rhs.is_empty() {
        return Err(FilterError::MalformedClause(clause.to_string()));
    }
    let field: Field = lhs.parse()?;

    Ok(match rhs.parse::<Field>() {
        Ok(right) => Predicate::CompareFields {
            left: field,
            op,
            right,
        },
        Err(_) => Predicate::compare(field, op, Value::parse_literal(rhs)),
    })
}

fn find_operator(clause: &str) -> Option<(usize, &'static str, CompareOp)> {
    clause.char_indices().find_map(|(i, _)| {
        CompareOp::TOKENS
            .iter()
            .find(|(token, _)| clause[i..].starts_with(token))
            .map(|&(token, op)| (i, token, op))
    })
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { field, op, value } => write!(f, "{field} {} {value}", op.as_str()),
            Predicate::CompareFields { left, op, right } => {
                write!(f, "{left} {} {right}", op.as_str())
            }
            Predicate::And(clauses) if clauses.is_empty() => f.write_str("true"),
            Predicate::Or(clauses) if clauses.is_empty() => f.write_str("false"),
            Predicate::And(clauses) => join(f, clauses, " && "),
            Predicate::Or(clauses) => join(f, clauses, " || "),
            Predicate::All => f.write_str("all"),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, clauses: &[Predicate], sep: &str) -> fmt::Result {
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{clause}")?;
    }
    Ok(())
}
