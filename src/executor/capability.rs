//! Built-in capability steps
//!
//! Capabilities wrap the external tools a CI job needs: `git` for
//! source checkout and `docker` for image build, registry login and
//! push. The tools are consumed as commands; nothing here speaks
//! their wire protocols.

use crate::executor::shell::ExecSpec;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// Output key carrying the image id produced by an image build
pub const OUTPUT_IMAGE_ID: &str = "image-id";

/// Output key carrying the content digest produced by an image push
pub const OUTPUT_DIGEST: &str = "digest";

static DIGEST_PATTERN: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r"digest:\s*(sha256:[0-9a-f]{64})").unwrap());

/// Commands performing a checkout: clone first when a URL is given,
/// then move to the requested revision.
#[must_use]
pub fn checkout_specs(
    revision: &str,
    url: Option<&str>,
    workspace: &Path,
    env: &HashMap<String, String>,
) -> Vec<ExecSpec> {
    let mut specs = Vec::new();
    if let Some(url) = url {
        specs.push(
            ExecSpec::new(
                "git",
                vec!["clone".to_string(), url.to_string(), ".".to_string()],
                workspace,
            )
            .with_env(env.clone()),
        );
    }
    specs.push(
        ExecSpec::new(
            "git",
            vec![
                "checkout".to_string(),
                "--force".to_string(),
                revision.to_string(),
            ],
            workspace,
        )
        .with_env(env.clone()),
    );
    specs
}

/// Command building an image from a context directory.
///
/// The quiet flag makes the tool print only the image id, which is
/// captured as the step's `image-id` output.
#[must_use]
pub fn image_build_spec(
    context: &str,
    tag: &str,
    workspace: &Path,
    env: &HashMap<String, String>,
) -> ExecSpec {
    ExecSpec::new(
        "docker",
        vec![
            "build".to_string(),
            "-q".to_string(),
            "-t".to_string(),
            tag.to_string(),
            context.to_string(),
        ],
        workspace,
    )
    .with_env(env.clone())
}

/// Command logging in to a registry.
///
/// The password travels over stdin, never through the argument list.
#[must_use]
pub fn registry_login_spec(
    registry: &str,
    username: &str,
    password: &str,
    workspace: &Path,
    env: &HashMap<String, String>,
) -> ExecSpec {
    ExecSpec::new(
        "docker",
        vec![
            "login".to_string(),
            registry.to_string(),
            "--username".to_string(),
            username.to_string(),
            "--password-stdin".to_string(),
        ],
        workspace,
    )
    .with_env(env.clone())
    .with_stdin(password.to_string())
}

/// Command pushing an image to its registry
#[must_use]
pub fn image_push_spec(tag: &str, workspace: &Path, env: &HashMap<String, String>) -> ExecSpec {
    ExecSpec::new("docker", vec!["push".to_string(), tag.to_string()], workspace)
        .with_env(env.clone())
}

/// Extracts the content digest from push output
#[must_use]
pub fn parse_push_digest(output: &str) -> Option<String> {
    DIGEST_PATTERN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extracts the image id from quiet build output
#[must_use]
pub fn parse_build_image_id(output: &str) -> Option<String> {
    let id = output.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.lines().last().unwrap_or(id).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ws() -> PathBuf {
        PathBuf::from("/work")
    }

    #[test]
    fn test_checkout_without_url_only_switches_revision() {
        let specs = checkout_specs("v1.2.3", None, &ws(), &HashMap::new());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].program, "git");
        assert_eq!(specs[0].args, vec!["checkout", "--force", "v1.2.3"]);
    }

    #[test]
    fn test_checkout_with_url_clones_first() {
        let specs = checkout_specs(
            "main",
            Some("https://example.com/repo.git"),
            &ws(),
            &HashMap::new(),
        );
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].args[0], "clone");
        assert_eq!(specs[1].args[0], "checkout");
    }

    #[test]
    fn test_image_build_uses_quiet_mode() {
        let spec = image_build_spec(".", "app:latest", &ws(), &HashMap::new());
        assert_eq!(spec.program, "docker");
        assert!(spec.args.contains(&"-q".to_string()));
        assert!(spec.args.contains(&"app:latest".to_string()));
    }

    #[test]
    fn test_login_password_goes_through_stdin() {
        let spec = registry_login_spec("ghcr.io", "bot", "hunter2", &ws(), &HashMap::new());
        assert_eq!(spec.stdin.as_deref(), Some("hunter2"));
        assert!(!spec.args.iter().any(|a| a.contains("hunter2")));
        assert!(spec.args.contains(&"--password-stdin".to_string()));
    }

    #[test]
    fn test_parse_push_digest() {
        let output = "\
The push refers to repository [ghcr.io/acme/app]
5f70bf18a086: Pushed
latest: digest: sha256:1111111111111111111111111111111111111111111111111111111111111111 size: 1234
";
        assert_eq!(
            parse_push_digest(output).as_deref(),
            Some("sha256:1111111111111111111111111111111111111111111111111111111111111111")
        );
    }

    #[test]
    fn test_parse_push_digest_absent() {
        assert_eq!(parse_push_digest("nothing to see"), None);
    }

    #[test]
    fn test_parse_build_image_id() {
        assert_eq!(
            parse_build_image_id("sha256:abcd\n").as_deref(),
            Some("sha256:abcd")
        );
        assert_eq!(parse_build_image_id("  \n"), None);
    }
}
