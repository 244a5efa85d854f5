use std::iter;

use rlibphonenumber::{region_code::RegionCode, PhoneNumber, PhoneNumberFormat, PHONE_NUMBER_UTIL};

/// Strip every character that is not an ASCII decimal digit.
///
/// This is the form handed to the SMS handler and the key used to collapse
/// differently formatted copies of the same number.
pub fn normalize_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// E.164 form of a stored number for listings, tried against `default_region`
/// first and then as an international number. An unparseable value is shown
/// trimmed, as stored.
pub fn display_value(raw: &str, default_region: Option<&str>) -> String {
    let number = strip_tel_scheme(raw);
    if number.is_empty() {
        return String::new();
    }

    let unknown = RegionCode::get_unknown();
    default_region
        .map(str::trim)
        .filter(|region| !region.is_empty() && !region.eq_ignore_ascii_case(unknown))
        .into_iter()
        .chain(iter::once(unknown))
        .find_map(|region| PHONE_NUMBER_UTIL.parse(number, region).ok())
        .map(|parsed| e164_with_extension(&parsed))
        .unwrap_or_else(|| number.to_string())
}

fn e164_with_extension(number: &PhoneNumber) -> String {
    let e164 = PHONE_NUMBER_UTIL.format(number, PhoneNumberFormat::E164);
    let extension = number.extension();
    if number.has_extension() && !extension.is_empty() {
        format!("{};ext={}", e164, extension)
    } else {
        e164.into_owned()
    }
}

/// Drop a leading `tel:` scheme. Always returns a trimmed value.
pub fn strip_tel_scheme(value: &str) -> &str {
    let value = value.trim();
    match value.get(..4) {
        Some(scheme) if scheme.eq_ignore_ascii_case("tel:") => value[4..].trim(),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_digits_strips_formatting() {
        assert_eq!(normalize_digits("(555) 123-4567"), "5551234567");
        assert_eq!(normalize_digits("555-123-4567"), "5551234567");
        assert_eq!(normalize_digits("+91 90000 11111"), "919000011111");
        assert_eq!(normalize_digits("tel:+1-202-555-0100"), "12025550100");
    }

    #[test]
    fn test_normalize_digits_can_become_empty() {
        assert_eq!(normalize_digits("abc"), "");
        assert_eq!(normalize_digits(""), "");
        assert_eq!(normalize_digits("٣٤٥"), "");
    }

    #[test]
    fn test_display_value_unparseable_falls_back() {
        assert_eq!(display_value("  not a phone ", None), "not a phone");
        assert_eq!(display_value("tel:", None), "");
    }

    #[test]
    fn test_display_value_formats_e164() {
        assert_eq!(display_value("tel:+1 202-555-0100", None), "+12025550100");
        assert_eq!(display_value("+91 90000 11111", Some("us")), "+919000011111");
    }

    #[test]
    fn test_strip_tel_scheme() {
        assert_eq!(strip_tel_scheme(" TEL: +1 202 "), "+1 202");
        assert_eq!(strip_tel_scheme("9000011111"), "9000011111");
        assert_eq!(strip_tel_scheme("tel"), "tel");
    }
}
