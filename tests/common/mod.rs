/// Common test utilities: local git fixtures and filesystem-backed stub
/// providers, so the engine can be exercised end-to-end without any network.
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;

use repomirror::config::TransportMode;
use repomirror::provider::{
    CreateRepoError, DestinationProvider, DestinationRepository, ProviderError,
    RepositoryDescriptor, SourceProvider, Visibility,
};

/// Run a git command in `dir`, panicking with stderr on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Fixture")
        .env("GIT_AUTHOR_EMAIL", "fixture@test.invalid")
        .env("GIT_COMMITTER_NAME", "Fixture")
        .env("GIT_COMMITTER_EMAIL", "fixture@test.invalid")
        .output()
        .expect("failed to execute git");

    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );

    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Initialize a source repository with one commit on `main`.
pub fn init_source_repo(dir: &Path) {
    std::fs::create_dir_all(dir).expect("create source dir");
    git(dir, &["init"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(dir.join("README.md"), "fixture\n").expect("write file");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "initial commit"]);
}

/// Add a commit touching `file` on the currently checked-out branch.
pub fn commit_file(dir: &Path, file: &str, content: &str) {
    std::fs::write(dir.join(file), content).expect("write file");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", &format!("update {file}")]);
}

/// All refs (branches and tags) of a repository, by full ref name.
pub fn ref_names(dir: &Path) -> BTreeSet<String> {
    git(dir, &["for-each-ref", "--format=%(refname)"])
        .lines()
        .map(str::to_string)
        .collect()
}

/// Branch heads only, by short name.
pub fn branch_heads(dir: &Path) -> BTreeSet<String> {
    git(dir, &["for-each-ref", "--format=%(refname:short)", "refs/heads"])
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn rev_parse(dir: &Path, reference: &str) -> String {
    git(dir, &["rev-parse", reference])
}

/// Source provider over local fixture repositories. Repository ids map to
/// on-disk paths; descriptors carry the path as both clone URLs.
pub struct FixtureSource {
    repos: Vec<RepositoryDescriptor>,
    paths: HashMap<u64, PathBuf>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self {
            repos: Vec::new(),
            paths: HashMap::new(),
        }
    }

    /// Register a repository backed by `path`. The path does not have to
    /// exist; a missing one simulates an unreachable source.
    pub fn add(&mut self, name: &str, path: &Path) {
        let id = self.repos.len() as u64 + 1;
        let url = path.to_string_lossy().into_owned();

        self.repos.push(RepositoryDescriptor {
            id,
            name: name.to_string(),
            visibility: Visibility::Private,
            description: Some(format!("{name} fixture")),
            default_branch: Some("main".to_string()),
            ssh_url: url.clone(),
            http_url: url,
        });
        self.paths.insert(id, path.to_path_buf());
    }

    fn path(&self, repo: &RepositoryDescriptor) -> Result<&Path, ProviderError> {
        self.paths
            .get(&repo.id)
            .map(PathBuf::as_path)
            .ok_or_else(|| ProviderError::Transport("unknown fixture repository".to_string()))
    }
}

#[async_trait]
impl SourceProvider for FixtureSource {
    async fn list_owned_repositories(&self) -> Result<Vec<RepositoryDescriptor>, ProviderError> {
        Ok(self.repos.clone())
    }

    async fn latest_commit(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
    ) -> Result<Option<String>, ProviderError> {
        let path = self.path(repo)?;
        if !path.exists() {
            return Err(ProviderError::Transport("source unreachable".to_string()));
        }

        let output = Command::new("git")
            .args(["rev-parse", branch])
            .current_dir(path)
            .output()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    async fn branch_names(
        &self,
        repo: &RepositoryDescriptor,
    ) -> Result<BTreeSet<String>, ProviderError> {
        let path = self.path(repo)?;
        if !path.exists() {
            return Err(ProviderError::Transport("source unreachable".to_string()));
        }
        Ok(branch_heads(path))
    }
}

/// Destination provider over a directory of local bare repositories.
pub struct FixtureDestination {
    root: PathBuf,
}

impl FixtureDestination {
    pub fn new(root: &Path) -> Self {
        std::fs::create_dir_all(root).expect("create destination root");
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn bare_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.git"))
    }
}

#[async_trait]
impl DestinationProvider for FixtureDestination {
    fn owner_login(&self) -> &str {
        "local"
    }

    async fn find_repository(
        &self,
        name: &str,
    ) -> Result<Option<DestinationRepository>, ProviderError> {
        if self.bare_path(name).exists() {
            Ok(Some(DestinationRepository {
                name: name.to_string(),
                owner: "local".to_string(),
            }))
        } else {
            Ok(None)
        }
    }

    async fn create_repository(
        &self,
        name: &str,
        _private: bool,
        _description: &str,
    ) -> Result<DestinationRepository, CreateRepoError> {
        let path = self.bare_path(name);
        if path.exists() {
            return Err(CreateRepoError::NameAlreadyExists(name.to_string()));
        }

        std::fs::create_dir_all(&path)
            .map_err(|e| CreateRepoError::Other(ProviderError::Transport(e.to_string())))?;
        git(&path, &["init", "--bare"]);

        Ok(DestinationRepository {
            name: name.to_string(),
            owner: "local".to_string(),
        })
    }

    async fn latest_commit(
        &self,
        repo: &DestinationRepository,
        branch: &str,
    ) -> Result<Option<String>, ProviderError> {
        let path = self.bare_path(&repo.name);

        let output = Command::new("git")
            .args(["rev-parse", branch])
            .current_dir(&path)
            .output()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            // New or empty repositories report no commit
            Ok(None)
        }
    }

    async fn branch_names(
        &self,
        repo: &DestinationRepository,
    ) -> Result<BTreeSet<String>, ProviderError> {
        Ok(branch_heads(&self.bare_path(&repo.name)))
    }

    fn push_url(&self, name: &str, _transport: TransportMode) -> String {
        self.bare_path(name).to_string_lossy().into_owned()
    }
}
