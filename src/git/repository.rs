use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use git2::{DiffOptions, ErrorClass, ErrorCode, Oid, Repository as Git2Repo, Signature, Sort};
use parking_lot::Mutex;

use crate::config::AuthorConfig;
use crate::error::{Result, VersionerError};
use crate::git::CommitInfo;

/// libgit2 keeps asking for credentials while they are rejected
const MAX_CREDENTIAL_ATTEMPTS: usize = 4;

/// Wrapper around git2::Repository with our trait interface
///
/// The handle is behind a mutex: `git2::Repository` is `Send` but not `Sync`.
pub struct Git2Repository {
    repo: Mutex<Git2Repo>,
    workdir: PathBuf,
    token_env: Option<String>,
}

impl Git2Repository {
    /// Open or discover a git repository
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let repo = Git2Repo::discover(path).map_err(|e| {
            VersionerError::repository(format!(
                "Not a git repository ({}): {}",
                path.display(),
                e.message()
            ))
        })?;

        Self::from_git2(repo)
    }

    /// Create from existing git2::Repository
    pub fn from_git2(repo: Git2Repo) -> Result<Self> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| VersionerError::repository("Bare repositories are not supported"))?
            .to_path_buf();

        Ok(Git2Repository {
            repo: Mutex::new(repo),
            workdir,
            token_env: None,
        })
    }

    /// Read a push token from this environment variable when authenticating
    pub fn with_token_env(mut self, name: impl Into<String>) -> Self {
        self.token_env = Some(name.into());
        self
    }

    fn token(&self) -> Option<String> {
        let name = self.token_env.as_deref()?;
        std::env::var(name).ok().filter(|token| !token.is_empty())
    }
}

fn head_oid(repo: &Git2Repo) -> Result<Oid> {
    let head = repo.head().map_err(|e| {
        VersionerError::repository(format!("HEAD does not point at a commit: {}", e.message()))
    })?;
    let commit = head.peel_to_commit()?;
    Ok(commit.id())
}

/// Commit a tag resolves to; annotated and lightweight tags both work
fn peel_tag(repo: &Git2Repo, tag_name: &str) -> Result<Option<Oid>> {
    match repo.find_reference(&format!("refs/tags/{}", tag_name)) {
        Ok(reference) => Ok(reference.peel_to_commit().ok().map(|commit| commit.id())),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn touches_path(repo: &Git2Repo, commit: &git2::Commit<'_>, path: &Path) -> Result<bool> {
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let mut options = DiffOptions::new();
    options.pathspec(path.to_string_lossy().replace('\\', "/"));
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut options))?;

    Ok(diff.deltas().next().is_some())
}

fn signature(author: &AuthorConfig) -> Result<Signature<'static>> {
    Ok(Signature::now(&author.name, &author.email)?)
}

/// Credentials: a token from the environment for HTTPS, otherwise SSH keys
/// from ~/.ssh/ or the SSH agent, then libgit2 defaults.
fn remote_callbacks<'a>(
    token: Option<String>,
    attempts: &'a Cell<usize>,
) -> git2::RemoteCallbacks<'a> {
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed_types| {
        attempts.set(attempts.get() + 1);
        if attempts.get() > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }

        if allowed_types.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(token) = token.as_deref() {
                return git2::Cred::userpass_plaintext("x-access-token", token);
            }
        }

        if allowed_types.contains(git2::CredentialType::SSH_KEY) {
            let username = username_from_url.unwrap_or("git");
            if let Some(home) = dirs::home_dir() {
                for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                    let path = home.join(".ssh").join(key);
                    if path.exists() {
                        if let Ok(cred) = git2::Cred::ssh_key(username, None, &path, None) {
                            return Ok(cred);
                        }
                    }
                }
            }

            if let Ok(cred) = git2::Cred::ssh_key_from_agent(username) {
                return Ok(cred);
            }
        }

        git2::Cred::default()
    });
    callbacks
}

fn classify_push_error(refspecs: &[String], e: git2::Error) -> VersionerError {
    if matches!(e.code(), ErrorCode::NotFastForward | ErrorCode::Exists) {
        return VersionerError::PushRejected(e.message().to_string());
    }

    if e.class() == ErrorClass::Net {
        VersionerError::remote(format!("Network error during push: {}", e.message()))
    } else if e.class() == ErrorClass::Reference {
        VersionerError::remote(format!("Reference error during push: {}", e.message()))
    } else {
        VersionerError::remote(format!(
            "Failed to push {}: {}",
            refspecs.join(", "),
            e.message()
        ))
    }
}

impl super::Repository for Git2Repository {
    fn workdir(&self) -> PathBuf {
        self.workdir.clone()
    }

    fn head_commit(&self) -> Result<String> {
        let repo = self.repo.lock();
        Ok(head_oid(&repo)?.to_string())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let repo = self.repo.lock();
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(str::to_string))
        } else {
            Ok(None)
        }
    }

    fn list_tags(&self, pattern: &str) -> Result<Vec<String>> {
        let repo = self.repo.lock();
        let head = head_oid(&repo)?;
        let names = repo.tag_names(Some(pattern)).map_err(|e| {
            VersionerError::repository(format!("Cannot list tags: {}", e.message()))
        })?;

        let mut tags = Vec::new();
        for name in names.iter().flatten() {
            let Some(target) = peel_tag(&repo, name)? else {
                continue;
            };
            if target == head || repo.graph_descendant_of(head, target)? {
                tags.push(name.to_string());
            }
        }

        tracing::debug!(pattern, count = tags.len(), "listed reachable tags");
        Ok(tags)
    }

    fn tag_target(&self, tag_name: &str) -> Result<Option<String>> {
        let repo = self.repo.lock();
        Ok(peel_tag(&repo, tag_name)?.map(|oid| oid.to_string()))
    }

    fn commits_since(
        &self,
        since_tag: Option<&str>,
        path: Option<&Path>,
    ) -> Result<Vec<CommitInfo>> {
        let repo = self.repo.lock();
        let head = head_oid(&repo)?;

        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push(head)?;

        if let Some(tag) = since_tag {
            if let Some(oid) = peel_tag(&repo, tag)? {
                revwalk.hide(oid)?;
            }
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = repo.find_commit(oid?)?;

            if let Some(path) = path {
                if !touches_path(&repo, &commit, path)? {
                    continue;
                }
            }

            commits.push(CommitInfo {
                hash: commit.id().to_string(),
                message: commit.message().unwrap_or_default().to_string(),
                paths: Vec::new(),
            });
        }

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
        let repo = self.repo.lock();

        if !force && peel_tag(&repo, name)?.is_some() {
            return Err(VersionerError::TagAlreadyExists {
                tag: name.to_string(),
            });
        }

        let oid = Oid::from_str(target)?;
        let object = repo.find_object(oid, None)?;
        let tagger = signature(author)?;

        repo.tag(name, &object, &tagger, message, force)
            .map_err(|e| match e.code() {
                ErrorCode::Exists => VersionerError::TagAlreadyExists {
                    tag: name.to_string(),
                },
                _ => e.into(),
            })?;

        Ok(())
    }

    fn commit_paths(
        &self,
        paths: &[PathBuf],
        message: &str,
        author: &AuthorConfig,
    ) -> Result<String> {
        let repo = self.repo.lock();

        let mut index = repo.index()?;
        // Another handle may have written the index since it was cached
        index.read(true)?;
        for path in paths {
            index.add_path(path)?;
        }
        index.write()?;

        // HEAD's tree plus the release paths, leaving other staged changes out
        let parent = repo.head()?.peel_to_commit()?;
        let mut release_index = git2::Index::new()?;
        release_index.read_tree(&parent.tree()?)?;
        for path in paths {
            let entry = index.get_path(path, 0).ok_or_else(|| {
                VersionerError::repository(format!("{} is not in the index", path.display()))
            })?;
            release_index.add(&entry)?;
        }
        let tree = repo.find_tree(release_index.write_tree_to(&repo)?)?;
        let sig = signature(author)?;

        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
        Ok(oid.to_string())
    }

    fn push(&self, remote_name: &str, refspecs: &[String], force: bool) -> Result<()> {
        let repo = self.repo.lock();
        let mut remote = repo.find_remote(remote_name).map_err(|e| {
            VersionerError::remote(format!(
                "Cannot find remote '{}': {}",
                remote_name,
                e.message()
            ))
        })?;

        let specs: Vec<String> = refspecs
            .iter()
            .map(|r| {
                if force {
                    format!("+{}:{}", r, r)
                } else {
                    format!("{}:{}", r, r)
                }
            })
            .collect();

        let attempts = Cell::new(0);
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = remote_callbacks(self.token(), &attempts);
            callbacks.push_update_reference(|refname, status| {
                if let Some(status) = status {
                    *rejection.borrow_mut() = Some(format!("{}: {}", refname, status));
                }
                Ok(())
            });

            let mut options = git2::PushOptions::new();
            options.remote_callbacks(callbacks);

            remote
                .push(&specs, Some(&mut options))
                .map_err(|e| classify_push_error(refspecs, e))?;
        }

        if let Some(reason) = rejection.into_inner() {
            return Err(VersionerError::PushRejected(reason));
        }

        Ok(())
    }

    fn fetch_tags(&self, remote_name: &str) -> Result<()> {
        let repo = self.repo.lock();
        let mut remote = repo.find_remote(remote_name).map_err(|e| {
            VersionerError::remote(format!(
                "Cannot find remote '{}': {}",
                remote_name,
                e.message()
            ))
        })?;

        let attempts = Cell::new(0);
        let mut options = git2::FetchOptions::new();
        options.remote_callbacks(remote_callbacks(self.token(), &attempts));

        remote
            .fetch(&["+refs/tags/*:refs/tags/*"], Some(&mut options), None)
            .map_err(|e| {
                VersionerError::remote(format!(
                    "Failed to fetch tags from '{}': {}",
                    remote_name,
                    e.message()
                ))
            })?;

        Ok(())
    }
}
