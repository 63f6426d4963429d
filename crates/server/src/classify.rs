use std::sync::LazyLock;

use regex::Regex;

/// Ordered classification rules. The first matching rule wins, so the more
/// specific attack signatures must stay ahead of the generic ones.
static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"sql injection|union select|select .*from", "sql_injection"),
        (
            r"failed password|brute force|authentication failure|invalid user",
            "brute_force",
        ),
        (r"wget|curl|download|fetch", "file_download"),
        (r"scanner|nmap|port scan|scan detected", "port_scan"),
        (r"command executed|command|shell", "command_executed"),
        (r"login attempt|login malic|login", "login_attempt"),
    ]
    .into_iter()
    .map(|(pattern, label)| {
        let re = Regex::new(&format!("(?i){pattern}")).expect("classifier pattern is valid");
        (re, label)
    })
    .collect()
});

/// Returns the label of the first matching rule, or `None` when no rule
/// matches (including empty input).
pub fn classify(text: &str) -> Option<&'static str> {
    if text.is_empty() {
        return None;
    }
    RULES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, label)| *label)
}

/// Classifies text for the direct ingestion path, labeling unmatched input
/// as `other`.
pub fn classify_or_other(text: &str) -> &'static str {
    classify(text).unwrap_or("other")
}
