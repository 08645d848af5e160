//! Parameterized WHERE-clause assembly for the job selection queries.
//!
//! Filters are collected as typed `(fragment, params)` pairs and compiled to
//! a single `AND`-joined suffix, with OR-groups for the mutually-alternative
//! status filters. Fragments use unnumbered `?` placeholders; parameters are
//! emitted in fragment order.

use rusqlite::types::Value;

#[derive(Debug, Default, Clone)]
pub struct Predicate {
    fragments: Vec<String>,
    params: Vec<Value>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one `AND` clause.
    pub fn and(&mut self, fragment: &str, params: impl IntoIterator<Item = Value>) -> &mut Self {
        self.fragments.push(fragment.to_string());
        self.params.extend(params);
        self
    }

    /// Append an `AND ( a OR b OR ... )` group.
    ///
    /// An empty alternative list appends nothing at all, which is how the
    /// "no status filter selected" fallback falls out naturally.
    pub fn and_any(&mut self, alternatives: Vec<(String, Vec<Value>)>) -> &mut Self {
        if alternatives.is_empty() {
            return self;
        }
        let group = alternatives
            .iter()
            .map(|(fragment, _)| fragment.as_str())
            .collect::<Vec<_>>()
            .join(" OR ");
        self.fragments.push(format!("( {} )", group));
        for (_, params) in alternatives {
            self.params.extend(params);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// The ` AND ...` suffix to append after a base WHERE clause.
    pub fn sql_suffix(&self) -> String {
        self.fragments
            .iter()
            .map(|fragment| format!(" AND {}", fragment))
            .collect()
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_predicate_adds_nothing() {
        let predicate = Predicate::new();
        assert!(predicate.is_empty());
        assert_eq!(predicate.sql_suffix(), "");
        assert!(predicate.params().is_empty());
    }

    #[test]
    fn test_and_clauses_keep_order() {
        let mut predicate = Predicate::new();
        predicate
            .and("end_time_ts >= ?", [Value::Integer(100)])
            .and("end_time_ts < ?", [Value::Integer(200)]);
        assert_eq!(
            predicate.sql_suffix(),
            " AND end_time_ts >= ? AND end_time_ts < ?"
        );
        assert_eq!(
            predicate.params(),
            &[Value::Integer(100), Value::Integer(200)]
        );
    }

    #[test]
    fn test_or_group_wraps_alternatives() {
        let mut predicate = Predicate::new();
        predicate.and_any(vec![
            ("process_version IS NULL".to_string(), vec![]),
            (
                "process_version = ?".to_string(),
                vec![Value::Integer(4)],
            ),
        ]);
        assert_eq!(
            predicate.sql_suffix(),
            " AND ( process_version IS NULL OR process_version = ? )"
        );
        assert_eq!(predicate.params(), &[Value::Integer(4)]);
    }

    #[test]
    fn test_empty_or_group_is_skipped() {
        let mut predicate = Predicate::new();
        predicate.and_any(vec![]);
        assert!(predicate.is_empty());
    }

    #[test]
    fn test_group_params_follow_clause_params() {
        let mut predicate = Predicate::new();
        predicate.and("end_time_ts BETWEEN ? AND ?", [
            Value::Integer(1000),
            Value::Integer(2000),
        ]);
        predicate.and_any(vec![
            (
                "( process_version > 0 AND process_version != ? )".to_string(),
                vec![Value::Integer(4)],
            ),
            (
                "process_version = ?".to_string(),
                vec![Value::Integer(-1008)],
            ),
        ]);
        predicate.and("( crc32(local_job_id_raw) % ? ) = ?", [
            Value::Integer(3),
            Value::Integer(1),
        ]);
        assert_eq!(
            predicate.params(),
            &[
                Value::Integer(1000),
                Value::Integer(2000),
                Value::Integer(4),
                Value::Integer(-1008),
                Value::Integer(3),
                Value::Integer(1),
            ]
        );
    }
}
