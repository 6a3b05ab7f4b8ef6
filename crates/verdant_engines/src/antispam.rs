#![forbid(unsafe_code)]

//! Content-level spam scoring shared by the form validators. Every
//! check here is pure; the caller decides which checks apply to which
//! form kind.

use std::collections::BTreeMap;

/// Promotional phrases counted against a message. Two or more distinct
/// matches reject the submission.
pub const SPAM_PHRASES: &[&str] = &[
    "click here",
    "visit our site",
    "visit our website",
    "check out our",
    "100% guaranteed",
    "guaranteed results",
    "make money",
    "earn money",
    "work from home",
    "passive income",
    "get rich",
    "double your",
    "risk free",
    "no obligation",
    "limited time offer",
    "act now",
    "buy now",
    "order now",
    "special promotion",
    "exclusive deal",
    "free trial",
    "viagra",
    "cialis",
    "casino",
    "lottery",
    "crypto investment",
    "forex signals",
    "seo services",
    "web design services",
    "increase your traffic",
    "backlinks",
    "cheap followers",
];

pub const SPAM_PHRASE_THRESHOLD: usize = 2;
pub const MAX_URLS: usize = 2;

/// Throwaway domains refused outright on the email field.
pub const BLOCKED_EMAIL_DOMAINS: &[&str] = &["fake.com", "spam.com", "invalid.com"];

/// Distinct promotional phrases found in `message`, case-insensitive.
pub fn spam_phrase_matches(message: &str) -> usize {
    let lowered = message.to_lowercase();
    SPAM_PHRASES
        .iter()
        .filter(|phrase| lowered.contains(*phrase))
        .count()
}

/// Count of URL-looking tokens. Both scheme-prefixed and bare
/// `www.`-prefixed tokens count.
pub fn url_count(message: &str) -> usize {
    message
        .split_whitespace()
        .filter(|token| {
            let t = token.to_lowercase();
            t.starts_with("http://") || t.starts_with("https://") || t.starts_with("www.")
        })
        .count()
}

/// Repetition check: any word longer than three characters making up
/// more than 30% of a message longer than five words.
pub fn has_excessive_repetition(message: &str) -> bool {
    let words: Vec<String> = message
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() <= 5 {
        return false;
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for w in &words {
        if w.len() > 3 {
            *counts.entry(w.as_str()).or_insert(0) += 1;
        }
    }
    let total = words.len() as f64;
    counts
        .values()
        .any(|&n| (n as f64) / total > 0.30)
}

/// Combined content verdict used by the contact validator.
pub fn is_spam_content(message: &str) -> bool {
    spam_phrase_matches(message) >= SPAM_PHRASE_THRESHOLD
        || url_count(message) > MAX_URLS
        || has_excessive_repetition(message)
}

/// True when the address's domain is on the throwaway blocklist. The
/// caller normalizes the address first.
pub fn is_blocked_email_domain(email: &str) -> bool {
    match email.rsplit_once('@') {
        Some((_, domain)) => BLOCKED_EMAIL_DOMAINS
            .iter()
            .any(|blocked| domain.eq_ignore_ascii_case(blocked)),
        None => false,
    }
}

/// P.O. Box detection on a street address, case-insensitive. Matches
/// "P.O. Box", "PO Box", "POBox", "Box 123", and "PMB 123" forms.
pub fn looks_like_po_box(street_address: &str) -> bool {
    let upper = street_address.to_uppercase();
    let compact: String = upper.chars().filter(|c| !c.is_whitespace() && *c != '.').collect();
    if compact.contains("POBOX") {
        return true;
    }
    // "BOX 123" / "PMB 123": keyword directly followed by digits.
    let tokens: Vec<&str> = upper
        .split(|c: char| c.is_whitespace() || c == '.' || c == ',' || c == '#')
        .filter(|t| !t.is_empty())
        .collect();
    tokens.windows(2).any(|pair| {
        (pair[0] == "BOX" || pair[0] == "PMB") && pair[1].chars().all(|c| c.is_ascii_digit())
    })
}
