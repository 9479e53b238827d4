use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

const CODE_PREFIX_LEN: usize = 4;

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{4,16}$").expect("static regex"))
}

/// Uppercase first letters of the name, padded with `X`.
pub fn code_prefix(name: &str) -> String {
    let mut prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(CODE_PREFIX_LEN)
        .collect::<String>()
        .to_uppercase();

    while prefix.len() < CODE_PREFIX_LEN {
        prefix.push('X');
    }

    prefix
}

/// Builds a code from the first letters of the user's name and four random
/// digits, e.g. `PRIY0042`.
pub fn generate_referral_code(name: &str) -> String {
    let digits: u32 = rand::rng().random_range(0..10_000);
    format!("{}{:04}", code_prefix(name), digits)
}

pub fn normalize_referral_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn is_well_formed_code(code: &str) -> bool {
    code_pattern().is_match(code)
}

pub fn generate_referral_link(base_url: &str, code: &str) -> String {
    format!("{}/register?ref={}", base_url.trim_end_matches('/'), code)
}
