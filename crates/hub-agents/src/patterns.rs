//! Interactive prompt-line patterns shared by the CLI backends.
//!
//! A line matching any of these marks the child as blocked on input and
//! is surfaced as a `prompt` stream event instead of plain output.

pub fn default_prompt_patterns() -> Vec<String> {
    vec![
        r"(?i)\bproceed\b".to_string(),
        r"(?i)\ballow\b.*\?".to_string(),
        r"(?i)\bapprove\b".to_string(),
        r"(?i)\bcontinue\?".to_string(),
        r"\[y/N\]".to_string(),
        r"\[Y/n\]".to_string(),
        r"(?i)press enter".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn patterns_compile_and_match_typical_prompts() {
        let patterns: Vec<Regex> = default_prompt_patterns()
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect();
        for line in [
            "Proceed? [y/N]",
            "Allow this tool to run?",
            "Do you approve the change",
        ] {
            assert!(
                patterns.iter().any(|re| re.is_match(line)),
                "expected a match for {line:?}"
            );
        }
        assert!(!patterns.iter().any(|re| re.is_match("plain output line")));
    }
}
