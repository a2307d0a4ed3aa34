//! Argument vectors and call strings for wrapper invocations.

use std::path::Path;

use crate::domain::models::RunRequest;

/// Run length limit passed to every wrapper.
pub const RUN_LENGTH_LIMIT: i64 = 2_147_483_647;

/// Split a command string into tokens, honoring single and double quotes.
pub fn split_command_line(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Full argument vector for one run.
///
/// `[exe.., instance, instance_info, cutoff, run_length_limit, seed, -name, 'value', ..]`
pub fn build_argv(executable: &str, request: &RunRequest) -> Vec<String> {
    let mut argv = split_command_line(executable);
    argv.push(request.instance().name.clone());
    argv.push(request.instance().instance_specific_info.clone());
    argv.push(request.cutoff().to_string());
    argv.push(RUN_LENGTH_LIMIT.to_string());
    argv.push(request.seed().to_string());
    for (name, value) in request.config().active_parameters() {
        argv.push(format!("-{name}"));
        argv.push(format!("'{value}'"));
    }
    argv
}

/// Shell form of a call, suitable for reproducing a run by hand.
pub fn call_string(exec_dir: &Path, argv: &[String]) -> String {
    let args: Vec<String> = argv
        .iter()
        .map(|arg| {
            if arg.chars().any(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.clone()
            }
        })
        .collect();
    format!("cd \"{}\" ; {}", exec_dir.display(), args.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ParamConfiguration, ProblemInstance};

    #[test]
    fn test_split_honors_quotes() {
        assert_eq!(
            split_command_line(r#"python "my wrapper.py" --flag 'a b'"#),
            vec!["python", "my wrapper.py", "--flag", "a b"]
        );
        assert_eq!(split_command_line("  ./run.sh  "), vec!["./run.sh"]);
        assert_eq!(split_command_line(r#"bash -c "kill -s TERM -%pid""#), vec![
            "bash",
            "-c",
            "kill -s TERM -%pid"
        ]);
        assert_eq!(split_command_line("x ''"), vec!["x", ""]);
    }

    #[test]
    fn test_argv_layout() {
        let config = ParamConfiguration::new()
            .with("alpha", "0.5")
            .with("mode", "fast")
            .with_inactive("mode");
        let request = RunRequest::new(
            ProblemInstance::new("inst.cnf").with_specific_info("SAT"),
            42,
            10.0,
            config,
        )
        .unwrap();

        let argv = build_argv("./wrapper.sh --x", &request);
        assert_eq!(argv, vec![
            "./wrapper.sh",
            "--x",
            "inst.cnf",
            "SAT",
            "10",
            "2147483647",
            "42",
            "-alpha",
            "'0.5'",
        ]);
    }

    #[test]
    fn test_call_string_quotes_whitespace() {
        let argv = vec!["run".to_string(), "a b".to_string(), "c".to_string()];
        assert_eq!(
            call_string(Path::new("/tmp/x"), &argv),
            r#"cd "/tmp/x" ; run "a b" c"#
        );
    }
}
