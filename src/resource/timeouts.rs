//! Per-operation deadlines

use crate::error::{ProviderError, Result};
use serde_json::Value;
use std::time::Duration;

const MINUTE: u64 = 60;

/// Operation a deadline applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Deadlines for each operation of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::minutes(30, 5, 30, 30)
    }
}

impl Timeouts {
    pub const fn minutes(create: u64, read: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * MINUTE),
            read: Duration::from_secs(read * MINUTE),
            update: Duration::from_secs(update * MINUTE),
            delete: Duration::from_secs(delete * MINUTE),
        }
    }

    pub fn get(&self, op: Operation) -> Duration {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Apply a user `timeouts` block, e.g. `{"create": 60, "delete": "2h"}`
    pub fn with_overrides(mut self, block: Option<&Value>) -> Result<Self> {
        let Some(block) = block.filter(|v| !v.is_null()) else {
            return Ok(self);
        };
        let Some(entries) = block.as_object() else {
            return Err(ProviderError::Validation(vec![
                "timeouts: expected an object".to_string(),
            ]));
        };

        let mut problems = Vec::new();
        for (key, value) in entries {
            let slot = match key.as_str() {
                "create" => &mut self.create,
                "read" => &mut self.read,
                "update" => &mut self.update,
                "delete" => &mut self.delete,
                other => {
                    problems.push(format!("timeouts.{}: unsupported argument", other));
                    continue;
                }
            };
            match parse_duration(value) {
                Some(d) => *slot = d,
                None => problems.push(format!(
                    "timeouts.{}: expected minutes or a duration like \"45m\" or \"1h\", got {}",
                    key, value
                )),
            }
        }

        if problems.is_empty() {
            Ok(self)
        } else {
            Err(ProviderError::Validation(problems))
        }
    }
}

/// Whole minutes, or a string with an `s`, `m` or `h` suffix
fn parse_duration(value: &Value) -> Option<Duration> {
    if let Some(minutes) = value.as_u64() {
        return minutes.checked_mul(MINUTE).map(Duration::from_secs);
    }

    let text = value.as_str()?.trim();
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let (number, unit) = text.split_at(split);
    let number: u64 = number.parse().ok()?;
    let seconds = match unit {
        "s" => Some(number),
        "m" => number.checked_mul(MINUTE),
        "h" => number.checked_mul(60 * MINUTE),
        _ => None,
    }?;
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let t = Timeouts::default();
        assert_eq!(t.create, Duration::from_secs(30 * 60));
        assert_eq!(t.read, Duration::from_secs(5 * 60));
        assert_eq!(t.get(Operation::Delete), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_overrides() {
        let t = Timeouts::default()
            .with_overrides(Some(&json!({"create": 60, "delete": "2h", "read": "90s"})))
            .unwrap();
        assert_eq!(t.create, Duration::from_secs(3600));
        assert_eq!(t.delete, Duration::from_secs(7200));
        assert_eq!(t.read, Duration::from_secs(90));
        assert_eq!(t.update, Duration::from_secs(1800));
    }

    #[test]
    fn test_bad_overrides() {
        let err = Timeouts::default()
            .with_overrides(Some(&json!({"create": "soon", "forever": 1})))
            .unwrap_err();
        match err {
            ProviderError::Validation(problems) => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_overrides_are_rejected() {
        for value in [json!(u64::MAX), json!("99999999999999999h"), json!("999999999999999999m")] {
            let err = Timeouts::default()
                .with_overrides(Some(&json!({ "create": value })))
                .unwrap_err();
            match err {
                ProviderError::Validation(problems) => {
                    assert_eq!(problems.len(), 1);
                    assert!(problems[0].starts_with("timeouts.create"));
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_block_keeps_defaults() {
        assert_eq!(
            Timeouts::default().with_overrides(None).unwrap(),
            Timeouts::default()
        );
    }
}
