//! Topic exchange routing key matching.
//!
//! Routing keys are dot-separated words. Binding keys may contain wildcards:
//! - `*` matches exactly one word
//! - `#` matches zero or more words
//!
//! Examples:
//! - `drone-1.phone.drone` matches `drone-1.phone.drone`
//! - `drone-1.phone.drone` matches `*.phone.drone`
//! - `drone-1.phone.drone` matches `drone-1.#`
//! - `drone-1.web.drone` does not match `*.phone.drone`

/// Check whether a routing key matches a binding key.
pub fn matches(binding_key: &str, routing_key: &str) -> bool {
    if binding_key == routing_key {
        return true;
    }

    let pattern: Vec<&str> = binding_key.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &words)
}

fn match_words(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => {
            // `#` may swallow any number of words, including none
            (0..=words.len()).any(|skip| match_words(rest, &words[skip..]))
        }
        Some((&"*", rest)) => !words.is_empty() && match_words(rest, &words[1..]),
        Some((word, rest)) => words.first() == Some(word) && match_words(rest, &words[1..]),
    }
}
