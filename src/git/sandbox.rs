//! Command-execution sandbox
//!
//! A [Sandbox] runs argv lists against a working copy of the source tree and
//! reports stdout, stderr and the exit status. [SandboxRepository] drives the
//! git CLI through it, so the engine can work wherever the sandbox can run
//! `git` (a local checkout, a container, a remote runner).

use std::path::{Path, PathBuf};
use std::process::Command;

use parking_lot::Mutex;

use crate::config::AuthorConfig;
use crate::error::{Result, VersionerError};
use crate::git::CommitInfo;

const FIELD_SEPARATOR: char = '\u{1f}';
const RECORD_SEPARATOR: char = '\u{1e}';

/// Result of one sandboxed command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Something that can execute commands inside a copy of the source tree.
///
/// `run` only fails when the command could not be started; a non-zero exit
/// status is reported through [CommandOutput::status].
pub trait Sandbox: Send + Sync {
    /// Directory commands run in
    fn workdir(&self) -> &Path;

    fn run(&self, argv: &[String]) -> Result<CommandOutput>;

    /// Run commands in order, stopping at the first non-zero exit.
    ///
    /// Stdout of the successful commands is concatenated.
    fn run_all(&self, commands: &[Vec<String>]) -> Result<CommandOutput> {
        let mut combined = CommandOutput::default();
        for argv in commands {
            let output = self.run(argv)?;
            combined.stdout.push_str(&output.stdout);
            combined.stderr = output.stderr;
            combined.status = output.status;
            if !combined.success() {
                break;
            }
        }
        Ok(combined)
    }
}

/// Runs commands as local child processes.
///
/// Only the environment given here is added to the inherited one. Push tokens
/// are never passed in: [ProcessSandbox::with_token_env] installs a credential
/// helper that reads the named variable at the moment git needs it.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    workdir: PathBuf,
    env: Vec<(String, String)>,
}

impl ProcessSandbox {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        ProcessSandbox {
            workdir: workdir.into(),
            env: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Authenticate HTTPS remotes with the token held in `variable`
    pub fn with_token_env(self, variable: &str) -> Self {
        let valid = !variable.is_empty()
            && variable
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            tracing::warn!(variable, "ignoring token variable with an unusable name");
            return self;
        }

        let helper = format!(
            "!f() {{ echo username=x-access-token; echo \"password=${}\"; }}; f",
            variable
        );
        self.with_env("GIT_CONFIG_COUNT", "1")
            .with_env("GIT_CONFIG_KEY_0", "credential.helper")
            .with_env("GIT_CONFIG_VALUE_0", helper)
    }
}

impl Sandbox for ProcessSandbox {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| VersionerError::repository("Cannot run an empty command"))?;

        tracing::debug!(command = %argv.join(" "), "sandbox exec");

        let output = Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|e| VersionerError::repository(format!("Cannot run {}: {}", program, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }
}

/// [super::Repository] implemented with git CLI calls through a sandbox
///
/// Release commits are serialized within the process; git admits one writer
/// of the index and of HEAD at a time.
pub struct SandboxRepository<S: Sandbox> {
    sandbox: S,
    commit_lock: Mutex<()>,
}

impl<S: Sandbox> SandboxRepository<S> {
    pub fn new(sandbox: S) -> Self {
        SandboxRepository {
            sandbox,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    fn git<I, T>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let argv: Vec<String> = std::iter::once("git".to_string())
            .chain(args.into_iter().map(Into::into))
            .collect();
        self.sandbox.run(&argv)
    }

    /// Run git and fail with a repository error on non-zero exit
    fn git_ok<I, T>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let output = self.git(args)?;
        if !output.success() {
            return Err(VersionerError::repository(format!(
                "git exited with status {}: {}",
                output.status,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn identity_args(author: &AuthorConfig) -> Vec<String> {
        vec![
            "-c".to_string(),
            format!("user.name={}", author.name),
            "-c".to_string(),
            format!("user.email={}", author.email),
        ]
    }
}

impl SandboxRepository<ProcessSandbox> {
    /// Locate the working tree containing `path` and run git from its root
    pub fn discover(path: &Path, token_env: Option<&str>) -> Result<Self> {
        let locator = ProcessSandbox::new(path);
        let argv: Vec<String> = ["git", "rev-parse", "--show-toplevel"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let output = locator.run(&argv)?;
        let root = output.stdout.trim();
        if !output.success() || root.is_empty() {
            return Err(VersionerError::repository(format!(
                "Not a git repository ({}): {}",
                path.display(),
                output.stderr.trim()
            )));
        }

        let sandbox = ProcessSandbox::new(root);
        let sandbox = match token_env {
            Some(variable) => sandbox.with_token_env(variable),
            None => sandbox,
        };
        Ok(SandboxRepository::new(sandbox))
    }
}

/// Split `git log --format=%H%x1f%B%x1e` output into commits
fn parse_log(stdout: &str) -> Vec<CommitInfo> {
    stdout
        .split(RECORD_SEPARATOR)
        .map(|record| record.trim_start_matches(['\n', '\r']))
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let (hash, message) = record.split_once(FIELD_SEPARATOR)?;
            Some(CommitInfo {
                hash: hash.trim().to_string(),
                message: message.trim_end().to_string(),
                paths: Vec::new(),
            })
        })
        .collect()
}

fn is_rejection(stderr: &str) -> bool {
    ["[rejected]", "non-fast-forward", "already exists", "stale info"]
        .iter()
        .any(|marker| stderr.contains(marker))
}

impl<S: Sandbox> super::Repository for SandboxRepository<S> {
    fn workdir(&self) -> PathBuf {
        self.sandbox.workdir().to_path_buf()
    }

    fn head_commit(&self) -> Result<String> {
        Ok(self.git_ok(["rev-parse", "--verify", "HEAD"])?.trim().to_string())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let output = self.git(["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        let branch = output.stdout.trim();
        if output.success() && !branch.is_empty() {
            Ok(Some(branch.to_string()))
        } else {
            Ok(None)
        }
    }

    fn list_tags(&self, pattern: &str) -> Result<Vec<String>> {
        let stdout = self.git_ok(["tag", "-l", pattern, "--merged", "HEAD"])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn tag_target(&self, tag_name: &str) -> Result<Option<String>> {
        let output = self.git([
            "rev-parse".to_string(),
            "--verify".to_string(),
            "--quiet".to_string(),
            format!("refs/tags/{}^{{commit}}", tag_name),
        ])?;
        let target = output.stdout.trim();
        if output.success() && !target.is_empty() {
            Ok(Some(target.to_string()))
        } else {
            Ok(None)
        }
    }

    fn commits_since(
        &self,
        since_tag: Option<&str>,
        path: Option<&Path>,
    ) -> Result<Vec<CommitInfo>> {
        let range = match since_tag {
            Some(tag) => format!("refs/tags/{}..HEAD", tag),
            None => "HEAD".to_string(),
        };

        let mut args = vec![
            "log".to_string(),
            "--topo-order".to_string(),
            "--reverse".to_string(),
            "--format=%H%x1f%B%x1e".to_string(),
            range,
        ];
        if let Some(path) = path {
            args.push("--".to_string());
            args.push(path.to_string_lossy().replace('\\', "/"));
        }

        let commits = parse_log(&self.git_ok(args)?);
        tracing::debug!(since = ?since_tag, count = commits.len(), "collected commits");
        Ok(commits)
    }

    fn create_annotated_tag(
        &self,
        name: &str,
        message: &str,
        target: &str,
        author: &AuthorConfig,
        force: bool,
    ) -> Result<()> {
        if !force && self.tag_target(name)?.is_some() {
            return Err(VersionerError::TagAlreadyExists {
                tag: name.to_string(),
            });
        }

        let mut args = Self::identity_args(author);
        args.push("tag".to_string());
        args.push("-a".to_string());
        if force {
            args.push("-f".to_string());
        }
        args.extend([
            name.to_string(),
            "-m".to_string(),
            message.to_string(),
            target.to_string(),
        ]);

        let output = self.git(args)?;
        if output.success() {
            return Ok(());
        }
        if output.stderr.contains("already exists") {
            return Err(VersionerError::TagAlreadyExists {
                tag: name.to_string(),
            });
        }
        Err(VersionerError::repository(format!(
            "Cannot create tag '{}': {}",
            name,
            output.stderr.trim()
        )))
    }

    fn commit_paths(
        &self,
        paths: &[PathBuf],
        message: &str,
        author: &AuthorConfig,
    ) -> Result<String> {
        let paths: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();
        let _guard = self.commit_lock.lock();

        let mut add = vec!["add".to_string(), "--".to_string()];
        add.extend(paths.iter().cloned());
        self.git_ok(add)?;

        // --only keeps anything else in the index out of the release commit
        let mut commit = Self::identity_args(author);
        commit.extend([
            "commit".to_string(),
            "--only".to_string(),
            "-m".to_string(),
            message.to_string(),
            "--".to_string(),
        ]);
        commit.extend(paths);
        self.git_ok(commit)?;

        self.head_commit()
    }

    fn push(&self, remote: &str, refspecs: &[String], force: bool) -> Result<()> {
        let mut args = vec!["push".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(remote.to_string());
        args.extend(refspecs.iter().map(|r| format!("{}:{}", r, r)));

        let output = self.git(args)?;
        if output.success() {
            return Ok(());
        }

        let stderr = output.stderr.trim().to_string();
        if is_rejection(&stderr) {
            Err(VersionerError::PushRejected(stderr))
        } else {
            Err(VersionerError::remote(format!(
                "git push exited with status {}: {}",
                output.status, stderr
            )))
        }
    }

    fn fetch_tags(&self, remote: &str) -> Result<()> {
        let output = self.git(["fetch", "--force", remote, "+refs/tags/*:refs/tags/*"])?;
        if output.success() {
            Ok(())
        } else {
            Err(VersionerError::remote(format!(
                "git fetch exited with status {}: {}",
                output.status,
                output.stderr.trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Repository;
    use std::collections::VecDeque;

    /// Replays canned outputs and records every argv it was given
    struct ScriptedSandbox {
        workdir: PathBuf,
        responses: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedSandbox {
        fn new(responses: Vec<CommandOutput>) -> Self {
            ScriptedSandbox {
                workdir: PathBuf::from("/src"),
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().clone()
        }
    }

    impl Sandbox for ScriptedSandbox {
        fn workdir(&self) -> &Path {
            &self.workdir
        }

        fn run(&self, argv: &[String]) -> Result<CommandOutput> {
            self.calls.lock().push(argv.to_vec());
            Ok(self.responses.lock().pop_front().unwrap_or_default())
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            status: 0,
        }
    }

    fn failed(stderr: &str, status: i32) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            status,
        }
    }

    #[test]
    fn test_list_tags_uses_merged_filter() {
        let repo = SandboxRepository::new(ScriptedSandbox::new(vec![ok(
            "api/v1.0.0\napi/v1.1.0\n\n",
        )]));

        let tags = repo.list_tags("api/v*").unwrap();
        assert_eq!(tags, vec!["api/v1.0.0", "api/v1.1.0"]);
        assert_eq!(
            repo.sandbox().calls()[0],
            vec!["git", "tag", "-l", "api/v*", "--merged", "HEAD"]
        );
    }

    #[test]
    fn test_list_tags_outside_repository_is_repository_error() {
        let repo = SandboxRepository::new(ScriptedSandbox::new(vec![failed(
            "fatal: not a git repository",
            128,
        )]));

        let err = repo.list_tags("v*").unwrap_err();
        assert!(matches!(err, VersionerError::Repository(_)));
        assert!(err.to_string().contains("not a git repository"));
    }

    #[test]
    fn test_commits_since_parses_log_records() {
        let log = "aaa\u{1f}feat(api): add\n\nbody line\n\u{1e}\nbbb\u{1f}fix: b\n\u{1e}\n";
        let repo = SandboxRepository::new(ScriptedSandbox::new(vec![ok(log)]));

        let commits = repo
            .commits_since(Some("api/v1.0.0"), Some(Path::new("api")))
            .unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "aaa");
        assert_eq!(commits[0].message, "feat(api): add\n\nbody line");
        assert_eq!(commits[1].message, "fix: b");

        let call = &repo.sandbox().calls()[0];
        assert!(call.contains(&"refs/tags/api/v1.0.0..HEAD".to_string()));
        assert_eq!(call[call.len() - 2..], ["--".to_string(), "api".to_string()]);
    }

    #[test]
    fn test_tag_target_missing() {
        let repo = SandboxRepository::new(ScriptedSandbox::new(vec![failed("", 1)]));
        assert_eq!(repo.tag_target("v1.0.0").unwrap(), None);
    }

    #[test]
    fn test_create_tag_checks_existence_first() {
        let repo = SandboxRepository::new(ScriptedSandbox::new(vec![ok("abc123\n")]));
        let err = repo
            .create_annotated_tag(
                "v1.0.0",
                "Release v1.0.0",
                "abc123",
                &AuthorConfig::default(),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, VersionerError::TagAlreadyExists { .. }));
        assert_eq!(repo.sandbox().calls().len(), 1);
    }

    #[test]
    fn test_create_tag_passes_identity_explicitly() {
        let repo = SandboxRepository::new(ScriptedSandbox::new(vec![failed("", 1), ok("")]));
        let author = AuthorConfig {
            name: "Release Bot".to_string(),
            email: "bot@example.com".to_string(),
        };
        repo.create_annotated_tag("v1.0.0", "Release v1.0.0", "abc123", &author, false)
            .unwrap();

        let call = &repo.sandbox().calls()[1];
        assert_eq!(
            call[..5],
            [
                "git".to_string(),
                "-c".to_string(),
                "user.name=Release Bot".to_string(),
                "-c".to_string(),
                "user.email=bot@example.com".to_string()
            ]
        );
        assert!(call.ends_with(&[
            "v1.0.0".to_string(),
            "-m".to_string(),
            "Release v1.0.0".to_string(),
            "abc123".to_string()
        ]));
    }

    #[test]
    fn test_commit_paths_commits_only_release_files() {
        let repo = SandboxRepository::new(ScriptedSandbox::new(vec![
            ok(""),
            ok(""),
            ok("c0ffee\n"),
        ]));
        let paths = vec![PathBuf::from("api/Cargo.toml"), PathBuf::from("api/CHANGELOG.md")];

        let head = repo
            .commit_paths(&paths, "chore(release): api/v1.0.0", &AuthorConfig::default())
            .unwrap();
        assert_eq!(head, "c0ffee");

        let calls = repo.sandbox().calls();
        assert_eq!(calls[0], ["git", "add", "--", "api/Cargo.toml", "api/CHANGELOG.md"]);
        let commit = &calls[1];
        assert!(commit.contains(&"--only".to_string()));
        assert!(commit.ends_with(&[
            "--".to_string(),
            "api/Cargo.toml".to_string(),
            "api/CHANGELOG.md".to_string()
        ]));
    }

    #[test]
    fn test_push_rejection_is_distinguished() {
        let repo = SandboxRepository::new(ScriptedSandbox::new(vec![
            failed(" ! [rejected]        v1.0.0 -> v1.0.0 (already exists)", 1),
            failed("fatal: unable to access 'https://example.com/': timeout", 128),
        ]));
        let refs = vec!["refs/tags/v1.0.0".to_string()];

        let rejected = repo.push("origin", &refs, false).unwrap_err();
        assert!(matches!(rejected, VersionerError::PushRejected(_)));

        let transient = repo.push("origin", &refs, false).unwrap_err();
        assert!(transient.is_transient());

        assert_eq!(
            repo.sandbox().calls()[0],
            vec!["git", "push", "origin", "refs/tags/v1.0.0:refs/tags/v1.0.0"]
        );
    }

    #[test]
    fn test_run_all_stops_at_first_failure() {
        let sandbox = ScriptedSandbox::new(vec![ok("one\n"), failed("boom", 2), ok("three\n")]);
        let commands = vec![
            vec!["echo".to_string(), "one".to_string()],
            vec!["false".to_string()],
            vec!["echo".to_string(), "three".to_string()],
        ];

        let output = sandbox.run_all(&commands).unwrap();
        assert_eq!(output.status, 2);
        assert_eq!(output.stdout, "one\n");
        assert_eq!(sandbox.calls().len(), 2);
    }

    #[test]
    fn test_process_sandbox_token_helper_never_holds_token() {
        let sandbox = ProcessSandbox::new("/src").with_token_env("CI_PUSH_TOKEN");
        let rendered = format!("{:?}", sandbox);
        assert!(rendered.contains("$CI_PUSH_TOKEN"));
        assert!(rendered.contains("credential.helper"));
    }

    #[test]
    fn test_process_sandbox_rejects_odd_variable_names() {
        let sandbox = ProcessSandbox::new("/src").with_token_env("$(rm -rf)");
        assert!(!format!("{:?}", sandbox).contains("credential.helper"));
    }

    #[test]
    fn test_process_sandbox_empty_command() {
        let sandbox = ProcessSandbox::new(".");
        assert!(sandbox.run(&[]).is_err());
    }
}
