//! In-memory fakes for collaborator traits (testing only)
//!
//! Every fake appends to a shared [`CallLog`] so tests can assert which
//! collaborators ran and in what order. Outputs and failures are set through
//! the `set_*` methods before or between runs.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::artifact::{Binary, BuildOptions, CommitQuery, Image, Platform, PublishPolicy, Secret, Service};
use crate::collaborators::{GoToolchain, ImagePackager, RegistryPublisher, ServiceRuntime, VcsReader};
use crate::config::ForgeConfig;
use crate::context::ForgeContext;
use crate::error::{ForgeError, Result};
use crate::source::SourceDir;

fn failed(program: &str, message: &str) -> ForgeError {
    ForgeError::CommandFailed {
        program: program.to_string(),
        exit_code: 1,
        stderr: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// CallLog
// ---------------------------------------------------------------------------

/// Ordered record of collaborator calls, e.g. `["go vet", "go build"]`.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: &str) {
        self.0.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.0.lock().unwrap().iter().any(|c| c == call)
    }

    /// Index of the first occurrence of `call`.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|c| c == call)
    }
}

// ---------------------------------------------------------------------------
// FakeGoToolchain
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeGoToolchain {
    log: CallLog,
    vet_output: Mutex<String>,
    staticcheck_output: Mutex<String>,
    test_failure: Mutex<Option<String>>,
    build_failure: Mutex<Option<String>>,
    builds: Mutex<Vec<BuildOptions>>,
    test_args: Mutex<Vec<Vec<String>>>,
}

impl FakeGoToolchain {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_vet_output(&self, output: &str) {
        *self.vet_output.lock().unwrap() = output.to_string();
    }

    pub fn set_staticcheck_output(&self, output: &str) {
        *self.staticcheck_output.lock().unwrap() = output.to_string();
    }

    pub fn set_test_failure(&self, message: Option<&str>) {
        *self.test_failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn set_build_failure(&self, message: Option<&str>) {
        *self.build_failure.lock().unwrap() = message.map(str::to_string);
    }

    /// Options of every `build` call.
    pub fn builds(&self) -> Vec<BuildOptions> {
        self.builds.lock().unwrap().clone()
    }

    pub fn test_args(&self) -> Vec<Vec<String>> {
        self.test_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl GoToolchain for FakeGoToolchain {
    async fn vet(&self, _src: &SourceDir) -> Result<String> {
        self.log.record("go vet");
        Ok(self.vet_output.lock().unwrap().clone())
    }

    async fn staticcheck(&self, _src: &SourceDir) -> Result<String> {
        self.log.record("staticcheck");
        Ok(self.staticcheck_output.lock().unwrap().clone())
    }

    async fn test(&self, _src: &SourceDir, args: &[String]) -> Result<String> {
        self.log.record("go test");
        self.test_args.lock().unwrap().push(args.to_vec());
        match self.test_failure.lock().unwrap().as_deref() {
            Some(message) => Err(failed("go test", message)),
            None => Ok("ok  \tscore-server/pkg/score\t0.012s".to_string()),
        }
    }

    async fn build(&self, src: &SourceDir, options: &BuildOptions) -> Result<Binary> {
        self.log.record("go build");
        if let Some(message) = self.build_failure.lock().unwrap().as_deref() {
            return Err(failed("go build", message));
        }
        self.builds.lock().unwrap().push(options.clone());
        Ok(Binary {
            path: src.root().join("bin").join("score-server"),
            options: options.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeImagePackager
// ---------------------------------------------------------------------------

/// Arguments of one `package` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCall {
    pub binary: PathBuf,
    pub entrypoint: Vec<String>,
    pub platform: Platform,
}

#[derive(Debug, Default)]
pub struct FakeImagePackager {
    log: CallLog,
    failure: Mutex<Option<String>>,
    calls: Mutex<Vec<PackageCall>>,
}

impl FakeImagePackager {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<PackageCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImagePackager for FakeImagePackager {
    async fn package(&self, binary: &Binary, entrypoint: &[String], platform: &Platform) -> Result<Image> {
        self.log.record("docker package");
        if let Some(message) = self.failure.lock().unwrap().as_deref() {
            return Err(failed("docker build", message));
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(PackageCall {
            binary: binary.path.clone(),
            entrypoint: entrypoint.to_vec(),
            platform: platform.clone(),
        });
        let id = format!("sha256:fake{:04}", calls.len());
        Ok(Image::new(id, binary, entrypoint.to_vec(), platform.clone()))
    }
}

// ---------------------------------------------------------------------------
// FakeVcsReader
// ---------------------------------------------------------------------------

/// Metadata reader with fixed answers. `None` makes the lookup fail.
#[derive(Debug)]
pub struct FakeVcsReader {
    log: CallLog,
    commit: Mutex<Option<String>>,
    repo_name: Mutex<Option<String>>,
    branch: Mutex<Option<String>>,
    queries: Mutex<Vec<CommitQuery>>,
}

impl FakeVcsReader {
    /// Defaults: commit `1a2b3c4`, repo `score-server`, branch `feature/scores`.
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            commit: Mutex::new(Some("1a2b3c4".to_string())),
            repo_name: Mutex::new(Some("score-server".to_string())),
            branch: Mutex::new(Some("feature/scores".to_string())),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn set_commit(&self, commit: Option<&str>) {
        *self.commit.lock().unwrap() = commit.map(str::to_string);
    }

    pub fn set_repo_name(&self, name: Option<&str>) {
        *self.repo_name.lock().unwrap() = name.map(str::to_string);
    }

    pub fn set_branch(&self, branch: Option<&str>) {
        *self.branch.lock().unwrap() = branch.map(str::to_string);
    }

    pub fn commit_queries(&self) -> Vec<CommitQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl VcsReader for FakeVcsReader {
    async fn commit(&self, _src: &SourceDir, query: CommitQuery) -> Result<String> {
        self.log.record("git commit");
        self.queries.lock().unwrap().push(query);
        self.commit
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| failed("git", "not a git repository"))
    }

    async fn repo_name(&self, _src: &SourceDir) -> Result<String> {
        self.log.record("git repo-name");
        self.repo_name
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| failed("git", "no remote configured"))
    }

    async fn branch(&self, _src: &SourceDir) -> Result<String> {
        self.log.record("git branch");
        self.branch
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| failed("git", "HEAD is detached"))
    }
}

// ---------------------------------------------------------------------------
// FakeRegistry
// ---------------------------------------------------------------------------

/// One `publish` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub image: Image,
    pub policy: PublishPolicy,
    pub token: Secret,
}

#[derive(Debug, Default)]
pub struct FakeRegistry {
    log: CallLog,
    failure: Mutex<Option<String>>,
    published: Mutex<Vec<Publication>>,
}

impl FakeRegistry {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn published(&self) -> Vec<Publication> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryPublisher for FakeRegistry {
    async fn publish(&self, image: &Image, token: &Secret, policy: &PublishPolicy) -> Result<()> {
        self.log.record("registry publish");
        if let Some(message) = self.failure.lock().unwrap().as_deref() {
            return Err(failed("docker push", message));
        }
        self.published.lock().unwrap().push(Publication {
            image: image.clone(),
            policy: policy.clone(),
            token: token.clone(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeServiceRuntime
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeServiceRuntime {
    log: CallLog,
    running: Mutex<Vec<Service>>,
}

impl FakeServiceRuntime {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn running(&self) -> Vec<Service> {
        self.running.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceRuntime for FakeServiceRuntime {
    async fn as_service(&self, image: &Image) -> Result<Service> {
        self.log.record("service start");
        let service = Service {
            id: uuid::Uuid::new_v4().to_string(),
            image: image.clone(),
            ports: image.exposed_ports.iter().copied().collect(),
            started_at: Utc::now(),
        };
        self.running.lock().unwrap().push(service.clone());
        Ok(service)
    }

    async fn stop(&self, service: &Service) -> Result<()> {
        self.log.record("service stop");
        self.running.lock().unwrap().retain(|s| s.id != service.id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeEnv
// ---------------------------------------------------------------------------

/// All fakes wired to one call log.
#[derive(Debug, Clone)]
pub struct FakeEnv {
    pub log: CallLog,
    pub golang: Arc<FakeGoToolchain>,
    pub packager: Arc<FakeImagePackager>,
    pub git: Arc<FakeVcsReader>,
    pub registry: Arc<FakeRegistry>,
    pub services: Arc<FakeServiceRuntime>,
}

impl Default for FakeEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEnv {
    pub fn new() -> Self {
        let log = CallLog::new();
        Self {
            golang: Arc::new(FakeGoToolchain::new(log.clone())),
            packager: Arc::new(FakeImagePackager::new(log.clone())),
            git: Arc::new(FakeVcsReader::new(log.clone())),
            registry: Arc::new(FakeRegistry::new(log.clone())),
            services: Arc::new(FakeServiceRuntime::new(log.clone())),
            log,
        }
    }

    /// A context whose collaborators are these fakes.
    pub fn context(&self, workspace_root: &Path, config: ForgeConfig) -> ForgeContext {
        ForgeContext::builder(workspace_root, config)
            .golang(self.golang.clone())
            .packager(self.packager.clone())
            .git(self.git.clone())
            .registry(self.registry.clone())
            .services(self.services.clone())
            .build()
    }
}
