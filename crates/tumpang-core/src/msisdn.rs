use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MsisdnError {
    #[error("msisdn is empty")]
    Empty,
    #[error("msisdn prefix is not an allowed Indonesian mobile prefix")]
    DisallowedPrefix,
    #[error("msisdn has an invalid length")]
    BadLength,
}

fn subscriber_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(811|812|813|821|822|823|851|852|853)\d{6,8}$").expect("valid msisdn regex")
    })
}

/// Normalize a raw phone number into canonical `62...` form.
///
/// Non-digits are stripped first, then one leading `62` or `0` country
/// marker. What remains must start with an allow-listed Indonesian mobile
/// prefix followed by 6-8 further digits.
pub fn normalize(raw: &str) -> Result<String, MsisdnError> {
    let digits: String = raw.chars().filter(|ch| ch.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(MsisdnError::Empty);
    }

    let subscriber = if let Some(rest) = digits.strip_prefix("62") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits.as_str()
    };

    if subscriber.len() < 9 || subscriber.len() > 11 {
        return Err(MsisdnError::BadLength);
    }
    if !subscriber_pattern().is_match(subscriber) {
        return Err(MsisdnError::DisallowedPrefix);
    }

    Ok(format!("62{subscriber}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plus_zero_and_bare_forms() {
        for raw in ["+628111234567", "08111234567", "628111234567", "8111234567"] {
            assert_eq!(normalize(raw).unwrap(), "628111234567", "raw: {raw}");
        }
    }

    #[test]
    fn strips_separators() {
        assert_eq!(normalize("+62 812-3456-789").unwrap(), "628123456789");
    }

    #[test]
    fn canonical_form_is_62_prefixed_with_bounded_length() {
        let shortest = normalize("62811123456").unwrap();
        let longest = normalize("6281112345678").unwrap();
        assert!(shortest.starts_with("62"));
        assert!(longest.starts_with("62"));
        assert_eq!(shortest.len(), 11);
        assert_eq!(longest.len(), 13);
    }

    #[test]
    fn rejects_disallowed_prefixes() {
        assert_eq!(
            normalize("0814123456").unwrap_err(),
            MsisdnError::DisallowedPrefix
        );
        assert_eq!(
            normalize("0857123456").unwrap_err(),
            MsisdnError::DisallowedPrefix
        );
    }

    #[test]
    fn rejects_bad_lengths() {
        assert_eq!(normalize("081112345").unwrap_err(), MsisdnError::BadLength);
        assert_eq!(
            normalize("081112345678901").unwrap_err(),
            MsisdnError::BadLength
        );
        assert_eq!(normalize("call me").unwrap_err(), MsisdnError::Empty);
    }

    #[test]
    fn allow_list_prefixes_all_pass() {
        for prefix in ["811", "812", "813", "821", "822", "823", "851", "852", "853"] {
            let raw = format!("0{prefix}1234567");
            let canonical = normalize(&raw).unwrap();
            assert_eq!(canonical, format!("62{prefix}1234567"));
        }
    }
}
