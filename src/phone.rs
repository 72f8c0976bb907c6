//! Phone number normalization to the provider's E.164 dialing format.
//!
//! The rules are an ordered heuristic for ambiguous local numbers and are
//! preserved exactly, including their known false positives (a 10-digit
//! number starting with 6-9 is always read as an Indian mobile, even when
//! the user meant a NANP number).

/// Normalize an arbitrary user-entered phone string to `+`-prefixed
/// international format.
///
/// Rules, applied in order on the digit sequence:
/// 1. already `+`-prefixed → keep as-is (formatting stripped)
/// 2. `00` international prefix → replace with `+`
/// 3. exactly 10 digits starting 6/7/8/9 → Indian mobile, prefix `+91`
/// 4. exactly 12 digits starting `91` → Indian number with country code
/// 5. exactly 10 digits → NANP, prefix `+1`
/// 6. exactly 11 digits starting `1` → NANP with country code
/// 7. anything else → prefix `+` as a last resort
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if has_plus {
        return format!("+{digits}");
    }
    if let Some(rest) = digits.strip_prefix("00") {
        return format!("+{rest}");
    }
    if digits.len() == 10 && digits.starts_with(['6', '7', '8', '9']) {
        return format!("+91{digits}");
    }
    if digits.len() == 12 && digits.starts_with("91") {
        return format!("+{digits}");
    }
    if digits.len() == 10 {
        return format!("+1{digits}");
    }
    if digits.len() == 11 && digits.starts_with('1') {
        return format!("+{digits}");
    }
    // Covers both >10 digit numbers with no recognized pattern and short
    // fragments nothing else matched.
    format!("+{digits}")
}
