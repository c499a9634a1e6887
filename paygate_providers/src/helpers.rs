/// Reduces a phone number to international digits, e.g. `024 123 4567` becomes `233241234567` for dial code `233`.
///
/// Returns `None` if anything other than digits and the usual separators is present.
pub fn normalize_msisdn(phone: &str, dial_code: &str) -> Option<String> {
    let trimmed = phone.trim();
    let mut digits = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            '+' if i == 0 => {},
            ' ' | '-' | '(' | ')' | '.' => {},
            _ => return None,
        }
    }
    let digits = match digits.strip_prefix("00") {
        Some(rest) => rest.to_string(),
        None => match digits.strip_prefix('0') {
            Some(rest) => format!("{dial_code}{rest}"),
            None => digits,
        },
    };
    if digits.is_empty() {
        return None;
    }
    Some(digits)
}

/// The international dialling code for an ISO country code, for the markets the providers serve.
pub fn dial_code(country: &str) -> Option<&'static str> {
    match country.to_ascii_uppercase().as_str() {
        "GH" | "GHA" => Some("233"),
        "NG" | "NGA" => Some("234"),
        "KE" | "KEN" => Some("254"),
        "UG" | "UGA" => Some("256"),
        "ZM" | "ZMB" => Some("260"),
        _ => None,
    }
}
