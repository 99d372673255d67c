// tests/git2_release_test.rs
use std::fs;
use std::path::Path;
use std::process::Command;

use git2::{Oid, Repository as Git2Repo, Signature};
use tempfile::TempDir;
use versioner::config::Config;
use versioner::domain::{ModuleNamespace, Version, VersionBump};
use versioner::git::{Git2Repository, Repository, SandboxRepository};
use versioner::release::{BumpOptions, ReleaseEngine, ReleaseStatus};

fn commit_files(repo: &Git2Repo, files: &[(&str, &str)], message: &str) -> Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    index.read(true).unwrap();
    for (path, content) in files {
        let full = workdir.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();

    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let parents: Vec<git2::Commit<'_>> = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_commit().ok())
        .into_iter()
        .collect();
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
}

fn local() -> BumpOptions {
    BumpOptions {
        push: false,
        strict: false,
        overwrite: false,
    }
}

fn engine(dir: &Path, config: Config) -> ReleaseEngine<Git2Repository> {
    ReleaseEngine::new(Git2Repository::open(dir).unwrap(), config).unwrap()
}

#[test]
fn test_bootstrap_then_minor_release_with_manifest_commit() {
    let dir = TempDir::new().unwrap();
    let raw = Git2Repo::init(dir.path()).unwrap();
    commit_files(
        &raw,
        &[("Cargo.toml", "[package]\nname = \"demo\"\nversion = \"0.0.0\"\n")],
        "chore: init",
    );

    let first = engine(dir.path(), Config::default())
        .bump_version(&ModuleNamespace::root(), local())
        .unwrap();
    assert_eq!(first.status, ReleaseStatus::Created);
    assert_eq!(first.version, Version::new(0, 1, 0));
    assert_eq!(first.tag, "v0.1.0");
    assert_eq!(first.bump, VersionBump::None);
    assert_eq!(first.updated_files, vec![Path::new("Cargo.toml").to_path_buf()]);

    let manifest = fs::read_to_string(dir.path().join("Cargo.toml")).unwrap();
    assert!(manifest.contains("version = \"0.1.0\""));

    // the tag sits on the release commit
    let head = raw.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.message().unwrap().trim(), "chore(release): v0.1.0");
    let tag = raw
        .find_reference("refs/tags/v0.1.0")
        .unwrap()
        .peel_to_tag()
        .unwrap();
    assert_eq!(tag.target_id(), head.id());
    assert_eq!(tag.message().unwrap().trim(), "Release v0.1.0");
    assert_eq!(tag.tagger().unwrap().name(), Some("versioner"));

    commit_files(&raw, &[("src/lib.rs", "pub fn a() {}\n")], "feat: add a");
    let second = engine(dir.path(), Config::default())
        .bump_version(&ModuleNamespace::root(), local())
        .unwrap();
    assert_eq!(second.status, ReleaseStatus::Created);
    assert_eq!(second.version, Version::new(0, 2, 0));
    assert_eq!(second.bump, VersionBump::Minor);
    assert_eq!(second.commit_count, 1);

    // files committed by the test survive the release commit
    let head = raw.head().unwrap().peel_to_commit().unwrap();
    assert!(head.tree().unwrap().get_path(Path::new("src/lib.rs")).is_ok());
}

#[test]
fn test_rerun_on_released_head_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let raw = Git2Repo::init(dir.path()).unwrap();
    commit_files(&raw, &[("README.md", "demo\n")], "chore: init");

    let mut config = Config::default();
    config.manifests.enabled = false;

    let first = engine(dir.path(), config.clone())
        .bump_version(&ModuleNamespace::root(), local())
        .unwrap();
    let second = engine(dir.path(), config)
        .bump_version(&ModuleNamespace::root(), local())
        .unwrap();

    assert_eq!(first.status, ReleaseStatus::Created);
    assert_eq!(second.status, ReleaseStatus::AlreadyReleased);
    assert_eq!(second.version, first.version);
    assert_eq!(second.tag, first.tag);
    assert_eq!(raw.tag_names(None).unwrap().len(), 1);
}

#[test]
fn test_module_release_ignores_other_modules() {
    let dir = TempDir::new().unwrap();
    let raw = Git2Repo::init(dir.path()).unwrap();
    commit_files(
        &raw,
        &[
            ("api/Cargo.toml", "[package]\nname = \"api\"\nversion = \"0.1.0\"\n"),
            ("web/package.json", "{\n  \"name\": \"web\",\n  \"version\": \"0.0.0\"\n}\n"),
        ],
        "chore: init",
    );

    let api = ModuleNamespace::new("api").unwrap();
    let web = ModuleNamespace::new("web").unwrap();

    let released = engine(dir.path(), Config::default())
        .bump_version(&api, local())
        .unwrap();
    assert_eq!(released.tag, "api/v0.1.0");
    // manifest already at the released version
    assert!(released.updated_files.is_empty());

    commit_files(&raw, &[("web/index.js", "1\n")], "feat(web): page");

    let again = engine(dir.path(), Config::default())
        .bump_version(&api, local())
        .unwrap();
    assert_eq!(again.status, ReleaseStatus::AlreadyReleased);
    assert_eq!(again.tag, "api/v0.1.0");

    let web_release = engine(dir.path(), Config::default())
        .bump_version(&web, local())
        .unwrap();
    assert_eq!(web_release.status, ReleaseStatus::Created);
    assert_eq!(web_release.tag, "web/v0.1.0");
    assert_eq!(
        web_release.updated_files,
        vec![Path::new("web/package.json").to_path_buf()]
    );

    let package = fs::read_to_string(dir.path().join("web/package.json")).unwrap();
    assert!(package.contains("\"version\": \"0.1.0\""));
    assert!(fs::read_to_string(dir.path().join("api/Cargo.toml"))
        .unwrap()
        .contains("version = \"0.1.0\""));
}

#[test]
fn test_push_to_bare_remote() {
    let dir = TempDir::new().unwrap();
    let remote_dir = TempDir::new().unwrap();
    let raw = Git2Repo::init(dir.path()).unwrap();
    let bare = Git2Repo::init_bare(remote_dir.path()).unwrap();
    raw.remote("origin", remote_dir.path().to_str().unwrap())
        .unwrap();
    commit_files(
        &raw,
        &[("Cargo.toml", "[package]\nname = \"demo\"\nversion = \"0.0.0\"\n")],
        "feat: first",
    );

    let options = BumpOptions {
        push: true,
        ..local()
    };
    let release = engine(dir.path(), Config::default())
        .bump_version(&ModuleNamespace::root(), options)
        .unwrap();

    assert_eq!(release.status, ReleaseStatus::Created);
    assert!(release.pushed);

    let local_head = raw.head().unwrap().peel_to_commit().unwrap().id();
    let remote_tag = bare
        .find_reference("refs/tags/v0.1.0")
        .unwrap()
        .peel_to_commit()
        .unwrap();
    assert_eq!(remote_tag.id(), local_head);

    // the release commit went out with the branch
    let branch = raw.head().unwrap().name().unwrap().to_string();
    let remote_branch = bare.find_reference(&branch).unwrap();
    assert_eq!(remote_branch.target(), Some(local_head));
}

#[test]
fn test_push_to_missing_remote_fails() {
    let dir = TempDir::new().unwrap();
    let raw = Git2Repo::init(dir.path()).unwrap();
    commit_files(&raw, &[("README.md", "demo\n")], "feat: first");

    let mut config = Config::default();
    config.manifests.enabled = false;
    config.release.max_push_attempts = 1;

    let options = BumpOptions {
        push: true,
        ..local()
    };
    let err = engine(dir.path(), config)
        .bump_version(&ModuleNamespace::root(), options)
        .unwrap_err();
    assert!(err.to_string().contains("origin"));
    // the local tag is kept for a later retry
    assert!(raw.find_reference("refs/tags/v0.1.0").is_ok());
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
fn test_git_cli_backend_matches_git2() {
    if !git_available() {
        return;
    }

    let dir = TempDir::new().unwrap();
    let raw = Git2Repo::init(dir.path()).unwrap();
    commit_files(
        &raw,
        &[("Cargo.toml", "[package]\nname = \"demo\"\nversion = \"0.0.0\"\n")],
        "chore: init",
    );

    let repo = SandboxRepository::discover(dir.path(), None).unwrap();
    let engine = ReleaseEngine::new(repo, Config::default()).unwrap();
    let first = engine
        .bump_version(&ModuleNamespace::root(), local())
        .unwrap();
    assert_eq!(first.tag, "v0.1.0");
    assert_eq!(first.updated_files.len(), 1);

    commit_files(&raw, &[("src/lib.rs", "pub fn b() {}\n")], "fix: patch it");
    let second = engine
        .bump_version(&ModuleNamespace::root(), local())
        .unwrap();
    assert_eq!(second.version, Version::new(0, 1, 1));
    assert_eq!(second.bump, VersionBump::Patch);

    // both backends agree on what is released
    let git2_view = Git2Repository::open(dir.path()).unwrap();
    let mut tags = git2_view.list_tags("v*").unwrap();
    tags.sort();
    assert_eq!(tags, vec!["v0.1.0".to_string(), "v0.1.1".to_string()]);
    assert_eq!(
        engine.repository().tag_target("v0.1.1").unwrap(),
        git2_view.tag_target("v0.1.1").unwrap()
    );
}

#[test]
fn test_git_cli_parallel_modules_get_separate_release_commits() {
    if !git_available() {
        return;
    }

    let dir = TempDir::new().unwrap();
    let raw = Git2Repo::init(dir.path()).unwrap();
    let modules: Vec<String> = (0..8).map(|i| format!("m{}", i)).collect();
    let files: Vec<(String, &str)> = modules
        .iter()
        .map(|m| (format!("{}/VERSION", m), "0.0.0\n"))
        .collect();
    let file_refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), *c)).collect();
    commit_files(&raw, &file_refs, "chore: init");

    let namespaces: Vec<ModuleNamespace> = modules
        .iter()
        .map(|m| ModuleNamespace::new(m).unwrap())
        .collect();
    let repo = SandboxRepository::discover(dir.path(), None).unwrap();
    let engine = ReleaseEngine::new(repo, Config::default()).unwrap();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(8)
        .build()
        .unwrap();

    let results = pool.install(|| engine.bump_many(&namespaces, local()));
    for (namespace, result) in &results {
        let release = result.as_ref().unwrap();
        assert_eq!(release.status, ReleaseStatus::Created, "{}", namespace);
        assert_eq!(
            release.updated_files,
            vec![Path::new(namespace.as_str()).join("VERSION")]
        );
    }

    // every release commit carries exactly its own module's manifest
    let mut walk = raw.revwalk().unwrap();
    walk.push_head().unwrap();
    let mut release_commits = 0;
    for oid in walk {
        let commit = raw.find_commit(oid.unwrap()).unwrap();
        let message = commit.message().unwrap().trim().to_string();
        let Some(tag) = message.strip_prefix("chore(release): ") else {
            continue;
        };
        release_commits += 1;
        let module = tag.split('/').next().unwrap();
        let parent_tree = commit.parent(0).unwrap().tree().unwrap();
        let diff = raw
            .diff_tree_to_tree(Some(&parent_tree), Some(&commit.tree().unwrap()), None)
            .unwrap();
        let changed: Vec<_> = diff
            .deltas()
            .map(|d| d.new_file().path().unwrap().to_path_buf())
            .collect();
        assert_eq!(changed, vec![Path::new(module).join("VERSION")], "{}", message);
    }
    assert_eq!(release_commits, modules.len());

    let rerun = pool.install(|| engine.bump_many(&namespaces, local()));
    for (namespace, result) in rerun {
        assert_eq!(
            result.unwrap().status,
            ReleaseStatus::AlreadyReleased,
            "{}",
            namespace
        );
    }
}
