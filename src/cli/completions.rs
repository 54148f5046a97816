//! The `completions` subcommand: shell completion generation

use clap_complete::{generate, Shell};

/// Renders completions for the given shell
pub fn generate_completions(shell: Shell, command: &mut clap::Command) -> String {
    let mut buffer = Vec::new();
    let name = command.get_name().to_string();
    generate(shell, command, name, &mut buffer);
    String::from_utf8_lossy(&buffer).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completions_mention_binary() {
        let mut command = clap::Command::new("conveyor")
            .subcommand(clap::Command::new("run"))
            .subcommand(clap::Command::new("check"));
        let output = generate_completions(Shell::Bash, &mut command);
        assert!(output.contains("conveyor"));
    }
}
