//! Completion signal parsing.
//!
//! Agents report phase state through marker lines in their output:
//! `phase_complete=true` or `phase_blocked=<reason>`. Absence of both
//! means the phase ran out of signal; the engine decides by iteration
//! cap.

/// Signal extracted from one agent response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseSignal {
    /// The agent declared the phase done
    Complete,
    /// The agent hit an obstacle needing intervention
    Blocked(String),
    /// No signal emitted
    None,
}

impl PhaseSignal {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Scan agent output for the completion markers. The last signal wins
/// when both appear (an agent may declare a blocker and then resolve it
/// within the same run).
pub fn parse_completion(content: &str) -> PhaseSignal {
    let mut signal = PhaseSignal::None;
    for line in content.lines() {
        let line = line.trim();
        if let Some(value) = marker_value(line, "phase_complete") {
            if value.eq_ignore_ascii_case("true") {
                signal = PhaseSignal::Complete;
            }
        } else if let Some(reason) = marker_value(line, "phase_blocked") {
            let reason = reason.trim_matches('"').trim();
            if !reason.is_empty() && !reason.eq_ignore_ascii_case("false") {
                signal = PhaseSignal::Blocked(reason.to_string());
            }
        }
    }
    signal
}

/// Extract the value of a `key=value` or `key: value` marker line.
fn marker_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?;
    let rest = rest.trim_start();
    rest.strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_marker() {
        assert_eq!(
            parse_completion("did the work\nphase_complete=true\n"),
            PhaseSignal::Complete
        );
        assert_eq!(
            parse_completion("phase_complete: true"),
            PhaseSignal::Complete
        );
    }

    #[test]
    fn test_blocked_marker_carries_reason() {
        let signal = parse_completion("phase_blocked=missing API credentials");
        assert_eq!(
            signal,
            PhaseSignal::Blocked("missing API credentials".to_string())
        );
    }

    #[test]
    fn test_no_marker() {
        assert_eq!(parse_completion("just some prose"), PhaseSignal::None);
        assert_eq!(parse_completion("phase_complete=false"), PhaseSignal::None);
    }

    #[test]
    fn test_last_signal_wins() {
        let content = "phase_blocked=flaky test\n...retried...\nphase_complete=true";
        assert_eq!(parse_completion(content), PhaseSignal::Complete);
    }

    #[test]
    fn test_marker_must_start_line() {
        assert_eq!(
            parse_completion("the agent would emit phase_complete=true here"),
            PhaseSignal::None
        );
    }
}
