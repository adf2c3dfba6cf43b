use std::time::Duration;


/// Cuts `s` to `max_chars` characters, marking the cut with `...`.
#[inline]
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}


#[inline]
pub fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_messages() {
        assert_eq!(truncate_with_ellipsis("Entry not found", 40), "Entry not found");
    }

    #[test]
    fn test_truncate_multibyte_error_body() {
        assert_eq!(truncate_with_ellipsis("Eintrag ungültig", 10), "Eintrag un...");
        assert_eq!(truncate_with_ellipsis("éééé", 2), "éé...");
    }

    #[test]
    fn test_round_seconds() {
        assert_eq!(round_seconds(Duration::from_millis(1234)), 1.23);
        assert_eq!(round_seconds(Duration::from_millis(7)), 0.01);
        assert_eq!(round_seconds(Duration::ZERO), 0.0);
    }
}
