/// Returns the next escalation-pass delay based on when a pass last
/// performed a transition.
///
/// Recent activity means thresholds are elapsing right now, so passes run
/// close together; a quiet book backs off to once a minute.
pub fn pass_interval(
    last_transition: time::OffsetDateTime,
    now: time::OffsetDateTime,
) -> time::Duration {
    let idle = now - last_transition;
    match idle {
        d if d < time::Duration::seconds(30) => time::Duration::seconds(5),
        d if d < time::Duration::minutes(5) => time::Duration::seconds(15),
        _ => time::Duration::seconds(60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn recent_activity_keeps_passes_tight() {
        let last = datetime!(2025-06-01 10:00:00 UTC);
        let now = datetime!(2025-06-01 10:00:10 UTC);
        assert_eq!(pass_interval(last, now), time::Duration::seconds(5));
    }

    #[test]
    fn quiet_book_backs_off() {
        let last = datetime!(2025-06-01 10:00:00 UTC);

        let now = datetime!(2025-06-01 10:02:00 UTC);
        assert_eq!(pass_interval(last, now), time::Duration::seconds(15));

        let now = datetime!(2025-06-01 11:00:00 UTC);
        assert_eq!(pass_interval(last, now), time::Duration::seconds(60));
    }
}
