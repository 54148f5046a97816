//! Variable and output-reference expansion
//!
//! Two substitution forms are applied to step parameters before
//! execution:
//!
//! - `${VAR}` resolves against the step environment
//! - `${needs.<job>.outputs.<key>}` resolves against the outputs of
//!   the job's direct dependencies
//!
//! Unresolved references are left unchanged so a missing value is
//! visible in the executed command instead of silently vanishing.

use regex::Regex;
use std::collections::HashMap;

static VAR_PATTERN: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

static NEEDS_PATTERN: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
    Regex::new(r"\$\{needs\.([A-Za-z0-9_-]+)\.outputs\.([A-Za-z0-9_-]+)\}").unwrap()
});

/// Expands `${VAR}` references against the given environment.
///
/// Unknown variables remain unchanged in the output.
#[must_use]
pub fn expand_vars(input: &str, env: &HashMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            match env.get(name) {
                Some(value) => value.clone(),
                None => caps
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .to_string()
}

/// Expands `${needs.<job>.outputs.<key>}` references against upstream
/// output maps.
///
/// Unknown jobs or keys remain unchanged in the output.
#[must_use]
pub fn expand_outputs(input: &str, upstream: &HashMap<String, HashMap<String, String>>) -> String {
    NEEDS_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let job = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let key = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            match upstream.get(job).and_then(|outputs| outputs.get(key)) {
                Some(value) => value.clone(),
                None => caps
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .to_string()
}

/// Applies both expansion forms, upstream outputs first
#[must_use]
pub fn expand(
    input: &str,
    env: &HashMap<String, String>,
    upstream: &HashMap<String, HashMap<String, String>>,
) -> String {
    expand_vars(&expand_outputs(input, upstream), env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_expand_vars_simple() {
        let env = env(&[("BRANCH", "main")]);
        assert_eq!(expand_vars("checkout ${BRANCH}", &env), "checkout main");
    }

    #[test]
    fn test_expand_vars_unknown_left_alone() {
        let env = env(&[("FOO", "bar")]);
        assert_eq!(expand_vars("echo ${UNKNOWN}", &env), "echo ${UNKNOWN}");
    }

    #[test]
    fn test_expand_vars_mixed() {
        let env = env(&[("A", "1"), ("B", "2")]);
        assert_eq!(expand_vars("${A} ${MISSING} ${B}", &env), "1 ${MISSING} 2");
    }

    #[test]
    fn test_expand_outputs() {
        let mut upstream = HashMap::new();
        upstream.insert(
            "build".to_string(),
            env(&[("digest", "sha256:abc123")]),
        );
        assert_eq!(
            expand_outputs("deploy ${needs.build.outputs.digest}", &upstream),
            "deploy sha256:abc123"
        );
    }

    #[test]
    fn test_expand_outputs_unknown_left_alone() {
        let upstream = HashMap::new();
        assert_eq!(
            expand_outputs("echo ${needs.build.outputs.digest}", &upstream),
            "echo ${needs.build.outputs.digest}"
        );
    }

    #[test]
    fn test_expand_applies_both_forms() {
        let env = env(&[("TAG", "v1")]);
        let mut upstream = HashMap::new();
        upstream.insert("build".to_string(), {
            let mut m = HashMap::new();
            m.insert("id".to_string(), "42".to_string());
            m
        });
        assert_eq!(
            expand("push ${TAG} ${needs.build.outputs.id}", &env, &upstream),
            "push v1 42"
        );
    }

    #[test]
    fn test_needs_reference_not_mangled_by_var_expansion() {
        // The plain variable pattern must not consume a dotted
        // reference that failed to resolve.
        let env = env(&[("needs", "oops")]);
        let upstream = HashMap::new();
        assert_eq!(
            expand("${needs.build.outputs.digest}", &env, &upstream),
            "${needs.build.outputs.digest}"
        );
    }
}
