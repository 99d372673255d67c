use std::path::PathBuf;

use rayon::prelude::*;

use crate::analyzer::{ClassifiedCommit, CommitClassifier};
use crate::boundary::BoundaryWarning;
use crate::changelog;
use crate::config::Config;
use crate::domain::{ModuleNamespace, VersionBump};
use crate::error::{Result, VersionerError};
use crate::git::Repository;
use crate::manifest;
use crate::release::locks::NamespaceLocks;
use crate::release::resolver::{resolve_current_version, CurrentVersion};
use crate::release::{BumpOptions, Release, ReleasePlan, ReleaseStatus};

fn warn(
    namespace: &ModuleNamespace,
    warnings: &mut Vec<BoundaryWarning>,
    warning: BoundaryWarning,
) {
    tracing::warn!(%namespace, "{}", warning);
    warnings.push(warning);
}

/// Computes and publishes releases for the namespaces of one repository.
///
/// All reads happen before the first write, so a run that stops part way
/// through can be repeated: a missing tag is recomputed to the same version,
/// and a tagged but unpushed HEAD is pushed.
pub struct ReleaseEngine<R: Repository> {
    repo: R,
    config: Config,
    classifier: CommitClassifier,
    locks: NamespaceLocks,
}

impl<R: Repository> ReleaseEngine<R> {
    /// Create an engine; fails if the configuration does not validate
    pub fn new(repo: R, config: Config) -> Result<Self> {
        config.validate()?;
        let classifier = CommitClassifier::new(config.conventional_commits.clone());
        Ok(ReleaseEngine {
            repo,
            config,
            classifier,
            locks: NamespaceLocks::new(),
        })
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current_version(&self, namespace: &ModuleNamespace) -> Result<CurrentVersion> {
        resolve_current_version(&self.repo, namespace, &self.config.release.bootstrap_version)
    }

    /// Work out the next release of `namespace` without changing anything.
    ///
    /// A namespace is already released when its latest tag points at HEAD, or
    /// when no commit since that tag touched the namespace.
    pub fn plan(&self, namespace: &ModuleNamespace) -> Result<ReleasePlan> {
        let release = &self.config.release;
        let current = self.current_version(namespace)?;
        let head = self.repo.head_commit()?;
        let mut warnings = current.warnings.clone();

        if let Some(tag) = &current.tag {
            if current.commit.as_deref() == Some(head.as_str()) {
                tracing::debug!(%namespace, tag = %tag, "HEAD is already tagged");
                return Ok(self.replay_plan(namespace, current, head, warnings));
            }
        }

        let scope = if release.scope_commits_to_module {
            namespace.subdir()
        } else {
            None
        };
        let commits: Vec<ClassifiedCommit> = self
            .repo
            .commits_since(current.tag.as_deref(), scope)?
            .into_iter()
            .map(|info| self.classifier.classify_commit(info))
            .collect();

        if let (Some(tag), true) = (&current.tag, commits.is_empty()) {
            let warning = BoundaryWarning::NoNewCommits {
                latest_tag: tag.clone(),
                current_commit_hash: head.clone(),
            };
            warn(namespace, &mut warnings, warning);
            return Ok(self.replay_plan(namespace, current, head, warnings));
        }

        let (bump, next_version) = if current.is_bootstrap() {
            (VersionBump::None, current.version.clone())
        } else {
            let bump = self.classifier.determine_bump(&commits, release.default_bump);
            (bump, current.version.bump(bump)?)
        };

        let tag = namespace.tag_name(&next_version);
        let existing_tag = self.repo.tag_target(&tag)?;

        tracing::debug!(
            %namespace,
            current = %current.version,
            next = %next_version,
            %bump,
            commits = commits.len(),
            "planned release"
        );

        Ok(ReleasePlan {
            namespace: namespace.clone(),
            current,
            head,
            already_released: false,
            bump,
            next_version,
            tag,
            commits,
            existing_tag,
            warnings,
        })
    }

    fn replay_plan(
        &self,
        namespace: &ModuleNamespace,
        current: CurrentVersion,
        head: String,
        warnings: Vec<BoundaryWarning>,
    ) -> ReleasePlan {
        let next_version = current.version.clone();
        let tag = namespace.tag_name(&next_version);
        let existing_tag = current.commit.clone();
        ReleasePlan {
            namespace: namespace.clone(),
            current,
            head,
            already_released: true,
            bump: VersionBump::None,
            next_version,
            tag,
            commits: Vec::new(),
            existing_tag,
            warnings,
        }
    }

    /// Changelog entry the next release of `namespace` would get
    pub fn changelog(&self, namespace: &ModuleNamespace) -> Result<String> {
        let plan = self.plan(namespace)?;
        Ok(changelog::render(&plan.tag, &plan.commits))
    }

    /// Release `namespace`: update manifests, tag HEAD and optionally push.
    ///
    /// Calls for the same namespace are serialized. A push the remote rejects
    /// fetches the remote's tags and starts over from planning, at most
    /// `release.max_push_attempts` times.
    ///
    /// # Errors
    /// * `Repository`/`Git` - history cannot be read or written
    /// * `TagAlreadyExists` - the computed tag exists and `strict` is set
    /// * `Publish` - the push kept failing
    pub fn bump_version(
        &self,
        namespace: &ModuleNamespace,
        options: BumpOptions,
    ) -> Result<Release> {
        let _guard = self.locks.lock(namespace);
        let span = tracing::info_span!("bump_version", %namespace);
        let _entered = span.enter();

        let max_cycles = self.config.release.max_push_attempts;
        let mut carried = Vec::new();
        let mut cycle = 0;

        loop {
            cycle += 1;
            let plan = self.plan(namespace)?;
            let tag = plan.tag.clone();

            match self.execute(plan, options, &carried) {
                Err(VersionerError::PushRejected(reason)) if options.overwrite => {
                    return Err(VersionerError::Publish {
                        attempts: cycle,
                        message: reason,
                    });
                }
                Err(VersionerError::PushRejected(reason)) if cycle < max_cycles => {
                    warn(
                        namespace,
                        &mut carried,
                        BoundaryWarning::PushRejected { tag, reason },
                    );
                    self.repo.fetch_tags(&self.config.release.remote)?;
                }
                Err(VersionerError::PushRejected(reason)) => {
                    return Err(VersionerError::Publish {
                        attempts: cycle,
                        message: reason,
                    });
                }
                other => return other,
            }
        }
    }

    /// Release several namespaces, in parallel across namespaces
    pub fn bump_many(
        &self,
        namespaces: &[ModuleNamespace],
        options: BumpOptions,
    ) -> Vec<(ModuleNamespace, Result<Release>)> {
        namespaces
            .par_iter()
            .map(|namespace| (namespace.clone(), self.bump_version(namespace, options)))
            .collect()
    }

    fn execute(
        &self,
        plan: ReleasePlan,
        options: BumpOptions,
        carried: &[BoundaryWarning],
    ) -> Result<Release> {
        let namespace = plan.namespace.clone();
        let mut warnings = carried.to_vec();
        warnings.extend(plan.warnings.iter().cloned());

        if plan.already_released {
            let pushed = if options.push {
                self.publish(&[tag_ref(&plan.tag)], false)?;
                true
            } else {
                false
            };
            return Ok(Release {
                namespace,
                version: plan.next_version,
                tag: plan.tag,
                status: ReleaseStatus::AlreadyReleased,
                bump: VersionBump::None,
                commit_count: 0,
                updated_files: Vec::new(),
                pushed,
                warnings,
            });
        }

        if plan.existing_tag.is_some() && !options.overwrite {
            if options.strict {
                return Err(VersionerError::TagAlreadyExists { tag: plan.tag });
            }
            warn(
                &namespace,
                &mut warnings,
                BoundaryWarning::TagAlreadyExists {
                    tag: plan.tag.clone(),
                },
            );
            return Ok(Release {
                namespace,
                version: plan.next_version,
                tag: plan.tag,
                status: ReleaseStatus::TagExisted,
                bump: plan.bump,
                commit_count: plan.commits.len(),
                updated_files: Vec::new(),
                pushed: false,
                warnings,
            });
        }

        let release = &self.config.release;
        let updated_files = self.write_release_files(&plan, &mut warnings);

        let mut target = plan.head.clone();
        let mut release_commit = false;
        if !updated_files.is_empty() && self.config.manifests.commit {
            let message = format!("chore(release): {}", plan.tag);
            target = self
                .repo
                .commit_paths(&updated_files, &message, &release.author)?;
            release_commit = true;
            tracing::info!(commit = %target, files = updated_files.len(), "created release commit");
        }

        let message =
            release.render_tag_message(&plan.tag, &plan.next_version, namespace.as_str());
        self.repo.create_annotated_tag(
            &plan.tag,
            &message,
            &target,
            &release.author,
            options.overwrite,
        )?;
        tracing::info!(tag = %plan.tag, commit = %target, "created tag");

        let pushed = if options.push {
            if release_commit {
                self.push_branch(&namespace, &plan.tag, &mut warnings)?;
            }
            self.publish(&[tag_ref(&plan.tag)], options.overwrite)?;
            true
        } else {
            false
        };

        Ok(Release {
            namespace,
            version: plan.next_version,
            tag: plan.tag,
            status: ReleaseStatus::Created,
            bump: plan.bump,
            commit_count: plan.commits.len(),
            updated_files,
            pushed,
            warnings,
        })
    }

    /// Rewrite manifests and the changelog; failures become warnings
    fn write_release_files(
        &self,
        plan: &ReleasePlan,
        warnings: &mut Vec<BoundaryWarning>,
    ) -> Vec<PathBuf> {
        let workdir = self.repo.workdir();
        let subdir = plan.namespace.subdir();
        let mut updated = Vec::new();

        if self.config.manifests.enabled {
            let report = manifest::update_manifests(
                &workdir,
                subdir,
                &self.config.manifests.formats,
                &plan.next_version,
            );
            updated.extend(report.updated);
            for failure in report.failures {
                let warning = match failure {
                    VersionerError::Manifest { path, message } => {
                        BoundaryWarning::ManifestUpdateFailed {
                            path: path.display().to_string(),
                            reason: message,
                        }
                    }
                    other => BoundaryWarning::ManifestUpdateFailed {
                        path: plan.namespace.to_string(),
                        reason: other.to_string(),
                    },
                };
                warn(&plan.namespace, warnings, warning);
            }
        }

        if self.config.changelog.enabled {
            let relative = match subdir {
                Some(dir) => dir.join(&self.config.changelog.file),
                None => PathBuf::from(&self.config.changelog.file),
            };
            let entry = changelog::render(&plan.tag, &plan.commits);
            match changelog::prepend_entry(&workdir.join(&relative), &plan.tag, &entry) {
                Ok(true) => updated.push(relative),
                Ok(false) => {}
                Err(e) => warn(
                    &plan.namespace,
                    warnings,
                    BoundaryWarning::ManifestUpdateFailed {
                        path: relative.display().to_string(),
                        reason: e.to_string(),
                    },
                ),
            }
        }

        updated
    }

    fn push_branch(
        &self,
        namespace: &ModuleNamespace,
        tag: &str,
        warnings: &mut Vec<BoundaryWarning>,
    ) -> Result<()> {
        let Some(branch) = self.repo.current_branch()? else {
            warn(
                namespace,
                warnings,
                BoundaryWarning::DetachedHead {
                    tag: tag.to_string(),
                },
            );
            return Ok(());
        };

        // A refused branch update cannot be fixed by re-planning the tag
        match self.publish(&[format!("refs/heads/{}", branch)], false) {
            Err(VersionerError::PushRejected(reason)) => Err(VersionerError::Publish {
                attempts: 1,
                message: format!("branch '{}' rejected: {}", branch, reason),
            }),
            other => other,
        }
    }

    /// Push with retries on transient failures
    fn publish(&self, refspecs: &[String], force: bool) -> Result<()> {
        let remote = &self.config.release.remote;
        let max_attempts = self.config.release.max_push_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(%remote, ?refspecs, attempt, "pushing");

            match self.repo.push(remote, refspecs, force) {
                Ok(()) => {
                    tracing::info!(%remote, ?refspecs, attempts = attempt, "pushed");
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(attempt, error = %e, "push failed, retrying");
                }
                Err(e) if e.is_transient() => {
                    return Err(VersionerError::Publish {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn tag_ref(tag: &str) -> String {
    format!("refs/tags/{}", tag)
}
