//! Badge rules shared by every `BadgeChecker`

/// Badges a student qualifies for given attended and total recorded sessions
pub fn attendance_badges(attended: i64, total: i64) -> Vec<&'static str> {
    let mut badges = Vec::new();
    if attended >= 1 {
        badges.push("FIRST_CHECK_IN");
    }
    if attended >= 10 {
        badges.push("REGULAR_LEARNER");
    }
    // needs a meaningful sample
    if total >= 10 && attended == total {
        badges.push("PERFECT_ATTENDANCE");
    }
    badges
}

/// Badges a tutor qualifies for given their accrued teaching hours
pub fn tutor_badges(total_hours: f64) -> Vec<&'static str> {
    [
        (1.0, "FIRST_SESSION"),
        (10.0, "TEN_HOURS"),
        (100.0, "CENTURY_TUTOR"),
    ]
    .into_iter()
    .filter(|(threshold, _)| total_hours >= *threshold)
    .map(|(_, badge)| badge)
    .collect()
}
