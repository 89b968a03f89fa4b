//! `${var}` substitution against build variables.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{\s*([^{}\s]+)\s*\}\}|\$\{\s*([^{}\s]+)\s*\}").unwrap_or_else(|e| unreachable!("invalid pattern: {e}"))
});

/// Replaces every `${key}` (or `${{ key }}`) in `text` with its value from
/// `variables`. Unknown keys are left untouched.
#[must_use]
pub fn parse_env(text: &str, variables: &HashMap<String, String>) -> String {
    if !text.contains("${") {
        return text.to_string();
    }

    VAR_PATTERN
        .replace_all(text, |caps: &Captures<'_>| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .and_then(|key| variables.get(key.as_str()))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Substitutes each token and flattens comma separated entries into a
/// list of trimmed, non-empty user ids.
#[must_use]
pub fn split_user_list(tokens: &[String], variables: &HashMap<String, String>) -> Vec<String> {
    tokens
        .iter()
        .flat_map(|token| {
            parse_env(token, variables)
                .split(',')
                .map(str::trim)
                .filter(|user| !user.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("approvers".to_string(), "bob, carol".to_string()),
            ("env".to_string(), "prod".to_string()),
        ])
    }

    #[test]
    fn test_known_and_unknown_keys() {
        assert_eq!(parse_env("deploy to ${env}", &vars()), "deploy to prod");
        assert_eq!(parse_env("${missing}-${env}", &vars()), "${missing}-prod");
        assert_eq!(parse_env("plain", &vars()), "plain");
    }

    #[test]
    fn test_double_brace_form() {
        assert_eq!(parse_env("${{ env }}", &vars()), "prod");
    }

    #[test]
    fn test_braces_must_pair() {
        assert_eq!(parse_env("${env}}", &vars()), "prod}");
        assert_eq!(parse_env("${{env}", &vars()), "${{env}");
        assert_eq!(parse_env("${{env}}-${env}", &vars()), "prod-prod");
    }

    #[test]
    fn test_split_user_list() {
        let tokens = vec!["alice".to_string(), "${approvers}".to_string(), " , ".to_string()];
        assert_eq!(split_user_list(&tokens, &vars()), vec!["alice", "bob", "carol"]);
    }
}
