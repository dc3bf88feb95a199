/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Normalise a Ghanaian mobile number to local `0XXXXXXXXX` form.
///
/// Accepts `+233XXXXXXXXX`, `233XXXXXXXXX` and `0XXXXXXXXX` inputs, with incidental whitespace or dashes. Returns
/// `None` if the result is not a 10-digit local number. Fulfillment providers and the blacklist both key on the
/// normalised form.
pub fn normalize_msisdn(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let local = if let Some(rest) = digits.strip_prefix("233") {
        format!("0{rest}")
    } else {
        digits
    };
    (local.len() == 10 && local.starts_with('0')).then_some(local)
}
