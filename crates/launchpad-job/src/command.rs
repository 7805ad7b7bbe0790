//! Shell-safe command formatting for VM and container execution
//!
//! Commands are delivered to a VM as the double-quoted `--command="..."`
//! argument of an SSH tool, so they pass through two shells: the local one
//! that parses the double quotes and the remote login shell that runs them.
//! [`escape_for_remote`] single-quotes the command for the remote shell and
//! then escapes everything the local double-quote parser would interpret.

use std::collections::BTreeMap;

use tracing::debug;

/// SSH tool used when none is configured
pub const DEFAULT_SSH_TOOL: &str = "gcloud compute";

/// Working directory commands run from on VMs and in containers
pub const REMOTE_WORKDIR: &str = "/root";

/// Quote a string for a POSIX shell.
///
/// Strings made only of characters the shell never interprets are returned
/// unchanged; anything else is wrapped in single quotes.
///
/// ```
/// use launchpad_job::command::shell_quote;
///
/// assert_eq!(shell_quote("plain-word"), "plain-word");
/// assert_eq!(shell_quote("echo hi"), "'echo hi'");
/// assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
/// assert_eq!(shell_quote(""), "''");
/// ```
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_shell_safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c)
}

/// Escape a command for embedding inside a double-quoted remote `--command`.
///
/// The result, read by a POSIX shell inside double quotes, yields the
/// single-quoted form of `cmd`, which the remote shell reads back as `cmd`.
pub fn escape_for_remote(cmd: &str) -> String {
    let quoted = shell_quote(cmd);
    let mut escaped = String::with_capacity(quoted.len());
    for c in quoted.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// VM addressed by an SSH tool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTarget {
    /// SSH tool prefix, e.g. `gcloud compute`
    pub ssh_tool: String,
    /// VM name
    pub name: String,
    pub project: String,
    pub zone: String,
}

/// Wrap a command to run from the remote working directory in a login shell.
///
/// With `detached_session`, the shell is started inside a detached `screen`
/// session of that name so it survives SSH disconnects.
pub fn remote_shell_command(cmd: &str, detached_session: Option<&str>) -> String {
    let escaped = escape_for_remote(&format!("pushd {} && {}", REMOTE_WORKDIR, cmd));
    // `-i` gives a login shell, not an interactive one.
    let login = format!("sudo -i bash -c {}", escaped);
    match detached_session {
        Some(session) => format!("sudo screen -dmS {} {}", escape_for_remote(session), login),
        None => login,
    }
}

/// Build the full local command line that runs `cmd` on `target` over SSH.
///
/// `ssh_tool` is spliced in as-is since it may carry several words.
pub fn ssh_command(target: &RemoteTarget, cmd: &str, detached_session: Option<&str>) -> String {
    let line = format!(
        "{} -q ssh {} --project={} --zone={} --command=\"{}\"",
        target.ssh_tool,
        shell_quote(&target.name),
        shell_quote(&target.project),
        shell_quote(&target.zone),
        remote_shell_command(cmd, detached_session)
    );
    debug!(vm = %target.name, command = %line, "formatted remote command");
    line
}

/// Options for wrapping a command in `docker run`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DockerRunOptions {
    pub image: String,
    /// Run detached under this container name
    pub detached_session: Option<String>,
    /// Names of host environment variables to expose to the container
    pub env: Vec<String>,
    /// Host path to container path mounts
    pub volumes: BTreeMap<String, String>,
    pub extra_flags: Vec<String>,
}

/// Wrap a command with `docker run`.
///
/// The command and every option except `extra_flags` are escaped the same way
/// as [`remote_shell_command`], so the result can itself be sent as a remote
/// `--command`.
pub fn docker_command(cmd: &str, options: &DockerRunOptions) -> String {
    let mut parts = vec![
        "docker run --rm --privileged -u root --network=host".to_string(),
    ];
    if let Some(session) = &options.detached_session {
        parts.push(format!("-d --name={}", escape_for_remote(session)));
    }
    parts.extend(options.env.iter().map(|e| format!("-e {}", escape_for_remote(e))));
    parts.extend(
        options
            .volumes
            .iter()
            .map(|(src, dst)| {
                format!("-v {}", escape_for_remote(&format!("{}:{}", src, dst)))
            }),
    );
    // Extra flags are passed through verbatim.
    parts.extend(options.extra_flags.iter().cloned());
    parts.push(escape_for_remote(&options.image));
    parts.push(format!(
        "/bin/bash -c {}",
        escape_for_remote(&format!("pushd {} && {}", REMOTE_WORKDIR, cmd))
    ));

    let line = parts.join(" ");
    debug!(image = %options.image, command = %line, "formatted docker command");
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::process::Command;

    fn sh_printf(script_arg: &str) -> String {
        let output = Command::new("sh")
            .arg("-c")
            .arg(format!("printf '%s' {}", script_arg))
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    }

    fn target() -> RemoteTarget {
        RemoteTarget {
            ssh_tool: DEFAULT_SSH_TOOL.to_string(),
            name: "vm-1".to_string(),
            project: "my-project".to_string(),
            zone: "us-central1-a".to_string(),
        }
    }

    #[rstest]
    #[case("echo hi")]
    #[case(r#"echo "hello world""#)]
    #[case("echo $HOME ${USER}")]
    #[case("python -c 'print(1)'")]
    #[case("a\tb  c")]
    #[case(r#"echo "$(date)" `whoami` \n"#)]
    #[case("")]
    fn escaped_command_survives_both_shells(#[case] cmd: &str) {
        let escaped = escape_for_remote(cmd);

        // The local shell sees the escaped form inside double quotes.
        let after_local = sh_printf(&format!("\"{}\"", escaped));
        assert_eq!(after_local, shell_quote(cmd));

        // The remote shell sees the single-quoted form.
        let after_remote = sh_printf(&after_local);
        assert_eq!(after_remote, cmd);
    }

    #[test]
    fn quote_leaves_safe_words_alone() {
        assert_eq!(shell_quote("gs://bucket/path_1"), "gs://bucket/path_1");
        assert_eq!(shell_quote("a b"), "'a b'");
    }

    #[test]
    fn escape_covers_double_quotes_and_dollars() {
        assert_eq!(escape_for_remote(r#"echo "$X""#), r#"'echo \"\$X\"'"#);
    }

    #[test]
    fn ssh_command_without_session() {
        assert_eq!(
            ssh_command(&target(), "echo hi", None),
            "gcloud compute -q ssh vm-1 --project=my-project --zone=us-central1-a \
             --command=\"sudo -i bash -c 'pushd /root && echo hi'\""
        );
    }

    #[test]
    fn ssh_command_in_detached_session() {
        let line = ssh_command(&target(), "echo hi", Some("sess"));
        assert!(line.contains("screen -dmS sess"));
        assert!(line.contains("sudo -i bash -c 'pushd /root && echo hi'"));
        assert_eq!(
            line,
            "gcloud compute -q ssh vm-1 --project=my-project --zone=us-central1-a \
             --command=\"sudo screen -dmS sess sudo -i bash -c 'pushd /root && echo hi'\""
        );
    }

    #[test]
    fn ssh_command_escapes_double_quotes_in_payload() {
        let line = ssh_command(&target(), r#"echo "a b""#, None);
        assert!(line.ends_with(r#"--command="sudo -i bash -c 'pushd /root && echo \"a b\"'""#));
    }

    fn shell_words(line: &str) -> Vec<String> {
        let output = Command::new("sh").arg("-c").arg(line).output().unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn ssh_command_quotes_target_and_session() {
        let target = RemoteTarget {
            ssh_tool: "printf '%s\\n'".to_string(),
            name: "vm 1; touch /tmp/launchpad-x".to_string(),
            project: "$(id)".to_string(),
            zone: "`uname`".to_string(),
        };
        let line = ssh_command(&target, "echo hi", Some("s $(id)"));

        let local = shell_words(&line);
        assert_eq!(
            local,
            vec![
                "-q",
                "ssh",
                "vm 1; touch /tmp/launchpad-x",
                "--project=$(id)",
                "--zone=`uname`",
                "--command=sudo screen -dmS 's $(id)' sudo -i bash -c 'pushd /root && echo hi'",
            ]
        );

        let remote = local[5].trim_start_matches("--command=");
        assert_eq!(
            shell_words(&format!("printf '%s\\n' {}", remote)),
            vec![
                "sudo",
                "screen",
                "-dmS",
                "s $(id)",
                "sudo",
                "-i",
                "bash",
                "-c",
                "pushd /root && echo hi",
            ]
        );
    }

    #[test]
    fn docker_command_quotes_session_and_mounts() {
        let options = DockerRunOptions {
            image: "trainer".to_string(),
            detached_session: Some("s $(id)".to_string()),
            volumes: BTreeMap::from([("/tmp/my data".to_string(), "/data".to_string())]),
            ..Default::default()
        };
        let line = docker_command("echo hi", &options);
        assert!(line.contains(r"-d --name='s \$(id)'"));
        assert!(line.contains("-v '/tmp/my data:/data'"));
    }

    #[test]
    fn docker_command_minimal() {
        let options = DockerRunOptions {
            image: "us-docker.pkg.dev/p/r/trainer:latest".to_string(),
            ..Default::default()
        };
        assert_eq!(
            docker_command("echo hi", &options),
            "docker run --rm --privileged -u root --network=host \
             us-docker.pkg.dev/p/r/trainer:latest /bin/bash -c 'pushd /root && echo hi'"
        );
    }

    #[test]
    fn docker_command_with_all_options() {
        let options = DockerRunOptions {
            image: "trainer".to_string(),
            detached_session: Some("sess".to_string()),
            env: vec!["HF_TOKEN".to_string(), "WANDB_API_KEY".to_string()],
            volumes: BTreeMap::from([
                ("/tmp/data".to_string(), "/data".to_string()),
                ("/etc/ssl".to_string(), "/etc/ssl".to_string()),
            ]),
            extra_flags: vec!["--shm-size=1g".to_string()],
        };
        assert_eq!(
            docker_command("python train.py", &options),
            "docker run --rm --privileged -u root --network=host -d --name=sess \
             -e HF_TOKEN -e WANDB_API_KEY -v /etc/ssl:/etc/ssl -v /tmp/data:/data \
             --shm-size=1g trainer /bin/bash -c 'pushd /root && python train.py'"
        );
    }

    #[test]
    fn formatting_is_deterministic() {
        let options = DockerRunOptions {
            image: "img".to_string(),
            env: vec!["A".to_string()],
            ..Default::default()
        };
        assert_eq!(
            docker_command("run $X", &options),
            docker_command("run $X", &options)
        );
        assert_eq!(
            ssh_command(&target(), "run $X", Some("s")),
            ssh_command(&target(), "run $X", Some("s"))
        );
    }
}
