use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::AuthorConfig;
use crate::error::{Result, VersionerError};
use crate::git::{CommitInfo, Repository};

/// A tag as the mock stores it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTag {
    pub target: String,
    pub message: Option<String>,
}

/// How the next push should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFailure {
    Transient,
    Rejected,
}

#[derive(Debug, Default)]
struct MockState {
    /// Linear history, oldest first
    commits: Vec<CommitInfo>,
    tags: BTreeMap<String, MockTag>,
    remote_tags: BTreeMap<String, String>,
    branch: Option<String>,
    push_failures: VecDeque<PushFailure>,
    push_calls: usize,
    pushed: Vec<String>,
    tags_created: usize,
}

/// Mock repository for testing without actual git operations
///
/// History is a single line of commits; every tag whose target is in that
/// line counts as reachable.
pub struct MockRepository {
    workdir: PathBuf,
    state: Mutex<MockState>,
}

impl MockRepository {
    /// Create a new empty mock repository rooted at `workdir`
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        MockRepository {
            workdir: workdir.into(),
            state: Mutex::new(MockState {
                branch: Some("main".to_string()),
                ..MockState::default()
            }),
        }
    }

    /// Append a commit touching `paths`; returns its hash
    pub fn add_commit(&self, message: &str, paths: &[&str]) -> String {
        let mut state = self.state.lock();
        let hash = format!("{:040x}", state.commits.len() + 1);
        state.commits.push(CommitInfo {
            hash: hash.clone(),
            message: message.to_string(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        });
        hash
    }

    /// Add a lightweight tag pointing at a commit
    pub fn add_tag(&self, name: &str, target: &str) {
        self.state.lock().tags.insert(
            name.to_string(),
            MockTag {
                target: target.to_string(),
                message: None,
            },
        );
    }

    /// Tag the current HEAD
    pub fn tag_head(&self, name: &str) {
        if let Ok(head) = self.head_commit() {
            self.add_tag(name, &head);
        }
    }

    /// Make a tag exist on the remote only
    pub fn add_remote_tag(&self, name: &str, target: &str) {
        self.state
            .lock()
            .remote_tags
            .insert(name.to_string(), target.to_string());
    }

    pub fn detach_head(&self) {
        self.state.lock().branch = None;
    }

    /// Queue failures for upcoming `push` calls
    pub fn fail_pushes(&self, failures: &[PushFailure]) {
        self.state.lock().push_failures.extend(failures.iter().copied());
    }

    pub fn tag(&self, name: &str) -> Option<MockTag> {
        self.state.lock().tags.get(name).cloned()
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.state.lock().tags.keys().cloned().collect()
    }

    pub fn remote_tag(&self, name: &str) -> Option<String> {
        self.state.lock().remote_tags.get(name).cloned()
    }

    /// Number of successful `create_annotated_tag` calls
    pub fn tags_created(&self) -> usize {
        self.state.lock().tags_created
    }

    /// Number of `push` calls, failed ones included
    pub fn push_calls(&self) -> usize {
        self.state.lock().push_calls
    }

    /// Refspecs accepted by the remote, in push order
    pub fn pushed_refspecs(&self) -> Vec<String> {
        self.state.lock().pushed.clone()
    }

    pub fn commits(&self) -> Vec<CommitInfo> {
        self.state.lock().commits.clone()
    }
}

fn touches(commit: &CommitInfo, dir: &str) -> bool {
    commit
        .paths
        .iter()
        .any(|p| p == dir || p.starts_with(&format!("{}/", dir)))
}

impl Repository for MockRepository {
    fn workdir(&self) -> PathBuf {
        self.workdir.clone()
    }

    fn head_commit(&self) -> Result<String> {
        self.state
            .lock()
            .commits
            .last()
            .map(|c| c.hash.clone())
            .ok_or_else(|| VersionerError::repository("HEAD does not point at a commit"))
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.state.lock().branch.clone())
    }

    fn list_tags(&self, pattern: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        if state.commits.is_empty() {
            return Err(VersionerError::repository("HEAD does not point at a commit"));
        }

        let prefix = pattern.trim_end_matches('*');
        Ok(state
            .tags
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .filter(|(_, tag)| state.commits.iter().any(|c| c.hash == tag.target))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn tag_target(&self, tag_name: &str) -> Result<Option<String>> {
        Ok(self.state.lock().tags.get(tag_name).map(|t| t.target.clone()))
    }

    fn commits_since(
        &self,
        since_tag: Option<&str>,
        path: Option<&Path>,
    ) -> Result<Vec<CommitInfo>> {
        let state = self.state.lock();

        let start = since_tag
            .and_then(|tag| state.tags.get(tag))
            .and_then(|tag| state.commits.iter().position(|c| c.hash == tag.target))
            .map(|index| index + 1)
            .unwrap_or(0);

        let dir = path.map(|p| p.to_string_lossy().replace('\\', "/"));
        Ok(state.commits[start..]
            .iter()
            .filter(|c| dir.as_deref().map_or(true, |d| touches(c, d)))
            .cloned()
            .collect())
    }

    fn create_annotated_tag(
        &self,
        name: &str,
        message: &str,
        target: &str,
        _author: &AuthorConfig,
        force: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !force && state.tags.contains_key(name) {
            return Err(VersionerError::TagAlreadyExists {
                tag: name.to_string(),
            });
        }

        state.tags.insert(
            name.to_string(),
            MockTag {
                target: target.to_string(),
                message: Some(message.to_string()),
            },
        );
        state.tags_created += 1;
        Ok(())
    }

    fn commit_paths(
        &self,
        paths: &[PathBuf],
        message: &str,
        _author: &AuthorConfig,
    ) -> Result<String> {
        let rendered: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();
        let borrowed: Vec<&str> = rendered.iter().map(String::as_str).collect();
        Ok(self.add_commit(message, &borrowed))
    }

    fn push(&self, _remote: &str, refspecs: &[String], force: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.push_calls += 1;

        match state.push_failures.pop_front() {
            Some(PushFailure::Transient) => {
                return Err(VersionerError::remote("connection reset by peer"))
            }
            Some(PushFailure::Rejected) => {
                return Err(VersionerError::PushRejected("rejected by remote".to_string()))
            }
            None => {}
        }

        for refspec in refspecs {
            let Some(name) = refspec.strip_prefix("refs/tags/") else {
                state.pushed.push(refspec.clone());
                continue;
            };

            let Some(local) = state.tags.get(name).map(|t| t.target.clone()) else {
                return Err(VersionerError::remote(format!(
                    "src refspec {} does not match any",
                    refspec
                )));
            };

            match state.remote_tags.get(name) {
                Some(remote) if *remote != local && !force => {
                    return Err(VersionerError::PushRejected(format!(
                        "{} already exists on the remote",
                        name
                    )));
                }
                _ => {
                    state.remote_tags.insert(name.to_string(), local);
                    state.pushed.push(refspec.clone());
                }
            }
        }

        Ok(())
    }

    fn fetch_tags(&self, _remote: &str) -> Result<()> {
        let mut state = self.state.lock();
        let remote = state.remote_tags.clone();
        for (name, target) in remote {
            state.tags.insert(
                name,
                MockTag {
                    target,
                    message: None,
                },
            );
        }
        Ok(())
    }
}
