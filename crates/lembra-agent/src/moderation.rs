// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offensive-content handling.
//!
//! Offenders get progressively longer timeouts (5/15/30/60 minutes by
//! offense count) instead of normal processing, and no replies at all
//! while timed out. Offense counts are monotonic; a timeout expiring does
//! not reset them, so repeat offenders escalate across windows.

use chrono::{DateTime, Duration, Utc};

/// Word-match detector over the configured blocked terms.
pub struct ModerationGuard {
    enabled: bool,
    terms: Vec<String>,
}

impl ModerationGuard {
    pub fn new(enabled: bool, terms: &[String]) -> Self {
        Self {
            enabled,
            terms: terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive whole-word match against the blocked terms.
    pub fn is_offensive(&self, text: &str) -> bool {
        if !self.enabled || self.terms.is_empty() {
            return false;
        }
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        self.terms.iter().any(|term| words.contains(&term.as_str()))
    }

    /// Timeout length for the nth offense: 5/15/30/60 minutes.
    pub fn timeout_minutes(offense_count: i64) -> i64 {
        match offense_count {
            i64::MIN..=1 => 5,
            2 => 15,
            3 => 30,
            _ => 60,
        }
    }

    /// The timeout expiry instant for the nth offense, from `now`.
    pub fn timeout_until(offense_count: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::minutes(Self::timeout_minutes(offense_count))
    }
}

/// True when a stored `timeout_until` is still in the future.
pub fn is_timed_out(timeout_until: Option<&str>, now: DateTime<Utc>) -> bool {
    timeout_until
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc) > now)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ModerationGuard {
        ModerationGuard::new(true, &["palavrão".to_string(), "xingamento".to_string()])
    }

    #[test]
    fn detects_blocked_words_case_insensitively() {
        assert!(guard().is_offensive("seu PALAVRÃO!"));
        assert!(guard().is_offensive("isso é um xingamento, viu"));
        assert!(!guard().is_offensive("mensagem educada"));
    }

    #[test]
    fn partial_words_do_not_match() {
        // "xingamentos" is a different word than the blocked term.
        assert!(!guard().is_offensive("xingamentosdemais"));
    }

    #[test]
    fn disabled_guard_never_matches() {
        let g = ModerationGuard::new(false, &["palavrão".to_string()]);
        assert!(!g.is_offensive("palavrão"));
    }

    #[test]
    fn timeout_schedule_escalates() {
        assert_eq!(ModerationGuard::timeout_minutes(1), 5);
        assert_eq!(ModerationGuard::timeout_minutes(2), 15);
        assert_eq!(ModerationGuard::timeout_minutes(3), 30);
        assert_eq!(ModerationGuard::timeout_minutes(4), 60);
        assert_eq!(ModerationGuard::timeout_minutes(99), 60);
    }

    #[test]
    fn timed_out_checks_the_window() {
        let now = Utc::now();
        let future = (now + Duration::minutes(5)).to_rfc3339();
        let past = (now - Duration::minutes(5)).to_rfc3339();
        assert!(is_timed_out(Some(&future), now));
        assert!(!is_timed_out(Some(&past), now));
        assert!(!is_timed_out(None, now));
        assert!(!is_timed_out(Some("garbage"), now));
    }
}
