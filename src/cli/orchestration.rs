//! Main workflow orchestration logic
//!
//! Keeps the subcommands' business logic out of main.rs: argument structs
//! here do not depend on clap parsing, so the workflows can be driven
//! programmatically and from tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::domain::ModuleNamespace;
use crate::error::VersionerError;
use crate::git::{Git2Repository, Repository, SandboxRepository};
use crate::release::{BumpOptions, CurrentVersion, Release, ReleaseEngine, ReleasePlan};

/// How the engine talks to git
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Backend {
    /// In-process libgit2
    #[default]
    Git2,
    /// The `git` executable, run in the source tree
    GitCli,
}

/// Repository and modules a command works on
#[derive(Debug, Clone, PartialEq)]
pub struct SourceArgs {
    pub source: PathBuf,
    /// Module paths; empty means the repository root
    pub modules: Vec<String>,
    pub backend: Backend,
}

impl SourceArgs {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        SourceArgs {
            source: source.into(),
            modules: Vec::new(),
            backend: Backend::default(),
        }
    }

    /// Validated namespaces, duplicates removed, in argument order
    pub fn namespaces(&self) -> Result<Vec<ModuleNamespace>> {
        if self.modules.is_empty() {
            return Ok(vec![ModuleNamespace::root()]);
        }

        let mut namespaces: Vec<ModuleNamespace> = Vec::new();
        for raw in &self.modules {
            let namespace = ModuleNamespace::new(raw)?;
            if !namespaces.contains(&namespace) {
                namespaces.push(namespace);
            }
        }
        Ok(namespaces)
    }
}

/// Arguments for the bump workflow
///
/// Mirrors the `bump-version` flags. Flags only ever tighten the configured
/// policy: `no_push` disables a configured push, `strict` enables strictness.
#[derive(Debug, Clone, PartialEq)]
pub struct BumpWorkflowArgs {
    pub source: SourceArgs,
    pub no_push: bool,
    /// Overrides `release.remote`
    pub remote: Option<String>,
    pub strict: bool,
    /// Move an existing tag and force-push it
    pub force_tag: bool,
}

impl BumpWorkflowArgs {
    fn apply(&self, config: &mut Config) -> BumpOptions {
        if let Some(remote) = &self.remote {
            config.release.remote = remote.clone();
        }
        BumpOptions {
            push: config.release.push && !self.no_push,
            strict: config.release.strict || self.strict,
            overwrite: self.force_tag,
        }
    }
}

/// Outcome of a bump workflow across all requested modules
#[derive(Debug)]
pub struct WorkflowResult {
    pub releases: Vec<Release>,
    pub failures: Vec<(ModuleNamespace, VersionerError)>,
    /// Remote the releases were (or would be) pushed to
    pub remote: String,
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read-only companions of `bump-version`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    CurrentVersion,
    NextVersion,
    Changelog,
}

/// Answer to a query for one module
#[derive(Debug)]
pub struct QueryOutput {
    pub namespace: ModuleNamespace,
    /// What goes to stdout: a version or a changelog entry
    pub text: String,
    pub current: Option<CurrentVersion>,
    pub plan: Option<ReleasePlan>,
}

fn open_git2(source: &Path, config: &Config) -> Result<Git2Repository> {
    let repo = Git2Repository::open(source)
        .with_context(|| format!("Cannot open repository at {}", source.display()))?;
    Ok(repo.with_token_env(config.release.token_env.clone()))
}

fn open_git_cli(
    source: &Path,
    config: &Config,
) -> Result<SandboxRepository<crate::git::ProcessSandbox>> {
    SandboxRepository::discover(source, Some(&config.release.token_env))
        .with_context(|| format!("Cannot open repository at {}", source.display()))
}

/// Main bump workflow
///
/// Opens the repository with the selected backend, then releases every
/// requested module. Modules are released in parallel when more than one is
/// given. A failing module does not stop the others.
///
/// # Arguments
///
/// * `args` - Source, modules and publication flags
/// * `config` - Loaded configuration; flag overrides are applied on top
///
/// # Returns
///
/// Per-module results, or an error if the repository cannot be opened or the
/// configuration is invalid
pub fn run_bump_workflow(args: &BumpWorkflowArgs, mut config: Config) -> Result<WorkflowResult> {
    let options = args.apply(&mut config);
    let namespaces = args.source.namespaces()?;

    match args.source.backend {
        Backend::Git2 => {
            let repo = open_git2(&args.source.source, &config)?;
            bump_with(repo, config, &namespaces, options)
        }
        Backend::GitCli => {
            let repo = open_git_cli(&args.source.source, &config)?;
            bump_with(repo, config, &namespaces, options)
        }
    }
}

fn bump_with<R: Repository>(
    repo: R,
    config: Config,
    namespaces: &[ModuleNamespace],
    options: BumpOptions,
) -> Result<WorkflowResult> {
    let remote = config.release.remote.clone();
    let engine = ReleaseEngine::new(repo, config)?;

    let outcomes = match namespaces {
        [single] => vec![(single.clone(), engine.bump_version(single, options))],
        many => engine.bump_many(many, options),
    };

    let mut releases = Vec::new();
    let mut failures = Vec::new();
    for (namespace, outcome) in outcomes {
        match outcome {
            Ok(release) => releases.push(release),
            Err(e) => {
                tracing::error!(%namespace, error = %e, "release failed");
                failures.push((namespace, e));
            }
        }
    }

    Ok(WorkflowResult {
        releases,
        failures,
        remote,
    })
}

/// Run a read-only query for every requested module
pub fn run_query(source: &SourceArgs, query: Query, config: Config) -> Result<Vec<QueryOutput>> {
    let namespaces = source.namespaces()?;

    match source.backend {
        Backend::Git2 => {
            let repo = open_git2(&source.source, &config)?;
            query_with(repo, config, &namespaces, query)
        }
        Backend::GitCli => {
            let repo = open_git_cli(&source.source, &config)?;
            query_with(repo, config, &namespaces, query)
        }
    }
}

fn query_with<R: Repository>(
    repo: R,
    config: Config,
    namespaces: &[ModuleNamespace],
    query: Query,
) -> Result<Vec<QueryOutput>> {
    let engine = ReleaseEngine::new(repo, config)?;

    namespaces
        .iter()
        .map(|namespace| {
            let context = || format!("Cannot inspect module '{}'", namespace);
            let output = match query {
                Query::CurrentVersion => {
                    let current = engine.current_version(namespace).with_context(context)?;
                    QueryOutput {
                        namespace: namespace.clone(),
                        text: current.version.to_string(),
                        current: Some(current),
                        plan: None,
                    }
                }
                Query::NextVersion => {
                    let plan = engine.plan(namespace).with_context(context)?;
                    QueryOutput {
                        namespace: namespace.clone(),
                        text: plan.next_version.to_string(),
                        current: None,
                        plan: Some(plan),
                    }
                }
                Query::Changelog => QueryOutput {
                    namespace: namespace.clone(),
                    text: engine.changelog(namespace).with_context(context)?,
                    current: None,
                    plan: None,
                },
            };
            Ok(output)
        })
        .collect()
}
