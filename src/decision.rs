use crate::models::Verdict;

/// Minimum score that earns an unconditional allow.
pub const ALLOW_THRESHOLD: u8 = 70;
/// Minimum score that earns a monitor verdict; below this is a deny.
pub const MONITOR_THRESHOLD: u8 = 50;

/// Pure threshold function. No I/O, no state; the score is the only input,
/// fetched independently by the Score Provider upstream of this call.
pub fn decide(score: u8) -> Verdict {
    if score >= ALLOW_THRESHOLD {
        Verdict::Allow
    } else if score >= MONITOR_THRESHOLD {
        Verdict::Monitor
    } else {
        Verdict::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_at_and_above_threshold() {
        assert_eq!(decide(70), Verdict::Allow);
        assert_eq!(decide(100), Verdict::Allow);
    }

    #[test]
    fn monitors_in_band() {
        assert_eq!(decide(50), Verdict::Monitor);
        assert_eq!(decide(69), Verdict::Monitor);
        assert_eq!(decide(60), Verdict::Monitor);
    }

    #[test]
    fn denies_below_monitor_band() {
        assert_eq!(decide(49), Verdict::Deny);
        assert_eq!(decide(0), Verdict::Deny);
    }
}
