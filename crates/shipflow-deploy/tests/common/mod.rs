use async_trait::async_trait;
use shipflow_build::{BuildError, BuildResult, ImageBuild, ImageRegistry, LocalImage};
use shipflow_cloud::{
    ClusterScheduler, RoleResolver, RuleUpdate, RunTaskRequest, ServiceUpdate,
    TaskDefinitionHandle,
};
use shipflow_core::{CodeSource, ContainerSpec, DeployManifest, SourceError, parse_manifest};
use shipflow_deploy::{Collaborators, DeployOptions, Orchestrator};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const BASE_PATH: &str = "/work/acme/app";

/// Calls observed by the fakes, in order
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Authenticate,
    Update,
    Build(String),
    Push { repository: String, tag: String },
    Register { path: PathBuf, deploy_id: String },
    ServiceExists { cluster: String, service: String },
    UpdateService { cluster: String, service: String, update: ServiceUpdate },
    RunTask { cluster: String, request: RunTaskRequest },
    UpdateRule { cluster: String, update: RuleUpdate },
}

#[derive(Debug, Clone, Default)]
pub struct Events(Arc<Mutex<Vec<Event>>>);

impl Events {
    fn record(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn all(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                Event::Build(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                Event::Push { repository, tag } => Some((repository, tag)),
                _ => None,
            })
            .collect()
    }

    pub fn registrations(&self) -> Vec<PathBuf> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                Event::Register { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn service_updates(&self) -> Vec<(String, ServiceUpdate)> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                Event::UpdateService {
                    service, update, ..
                } => Some((service, update)),
                _ => None,
            })
            .collect()
    }

    pub fn run_tasks(&self) -> Vec<RunTaskRequest> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                Event::RunTask { request, .. } => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn rule_updates(&self) -> Vec<RuleUpdate> {
        self.all()
            .into_iter()
            .filter_map(|e| match e {
                Event::UpdateRule { update, .. } => Some(update),
                _ => None,
            })
            .collect()
    }

    /// Whether anything changed on the scheduler side (registrations included)
    pub fn has_mutations(&self) -> bool {
        self.all().iter().any(|e| {
            matches!(
                e,
                Event::Register { .. }
                    | Event::UpdateService { .. }
                    | Event::RunTask { .. }
                    | Event::UpdateRule { .. }
            )
        })
    }
}

pub struct FakeSource {
    events: Events,
    manifest: String,
    base_path: PathBuf,
    /// 設定するとチェックアウト対象が見つからない
    missing_ref: Option<String>,
}

#[async_trait]
impl CodeSource for FakeSource {
    async fn update(&self) -> Result<String, SourceError> {
        self.events.record(Event::Update);
        match &self.missing_ref {
            Some(git_ref) => Err(SourceError::CommitNotFound(git_ref.clone())),
            None => Ok("3f2c1a9".to_string()),
        }
    }

    async fn load_manifest(&self) -> Result<DeployManifest, SourceError> {
        Ok(parse_manifest(&self.manifest)?)
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    // タスク定義の中身はパスそのもの
    async fn read_task_definition(&self, path: &Path) -> Result<String, SourceError> {
        Ok(path.display().to_string())
    }
}

pub struct FakeBuilder {
    events: Events,
    fail_on: Option<String>,
}

#[async_trait]
impl ImageBuild for FakeBuilder {
    async fn build(&self, container: &ContainerSpec, _base_path: &Path) -> BuildResult<LocalImage> {
        if self.fail_on.as_deref() == Some(container.name.as_str()) {
            return Err(BuildError::BuildFailed {
                container: container.name.clone(),
                message: "returned a non-zero code: 1".to_string(),
            });
        }
        self.events.record(Event::Build(container.name.clone()));
        Ok(LocalImage {
            container: container.name.clone(),
            repository: container.repository().to_string(),
            reference: format!("{}:latest", container.repository()),
        })
    }
}

pub struct FakeRegistry {
    events: Events,
}

#[async_trait]
impl ImageRegistry for FakeRegistry {
    async fn authenticate(&self) -> BuildResult<()> {
        self.events.record(Event::Authenticate);
        Ok(())
    }

    async fn push(&self, image: &LocalImage, tag: &str) -> BuildResult<String> {
        self.events.record(Event::Push {
            repository: image.repository.clone(),
            tag: tag.to_string(),
        });
        Ok(format!("registry.test/{}:{}", image.repository, tag))
    }
}

pub struct FakeScheduler {
    events: Events,
    existing_services: Vec<(String, String)>,
    revision: Mutex<u32>,
}

#[async_trait]
impl ClusterScheduler for FakeScheduler {
    async fn service_exists(&self, cluster: &str, service: &str) -> shipflow_cloud::Result<bool> {
        self.events.record(Event::ServiceExists {
            cluster: cluster.to_string(),
            service: service.to_string(),
        });
        Ok(self
            .existing_services
            .iter()
            .any(|(c, s)| c == cluster && s == service))
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: &ServiceUpdate,
    ) -> shipflow_cloud::Result<()> {
        self.events.record(Event::UpdateService {
            cluster: cluster.to_string(),
            service: service.to_string(),
            update: update.clone(),
        });
        Ok(())
    }

    async fn run_task(
        &self,
        cluster: &str,
        request: &RunTaskRequest,
    ) -> shipflow_cloud::Result<Vec<String>> {
        self.events.record(Event::RunTask {
            cluster: cluster.to_string(),
            request: request.clone(),
        });
        Ok(vec!["arn:aws:ecs:task/0001".to_string()])
    }

    async fn register_task_definition(
        &self,
        content: &str,
        deploy_id: &str,
    ) -> shipflow_cloud::Result<TaskDefinitionHandle> {
        let mut revision = self.revision.lock().unwrap();
        *revision += 1;
        self.events.record(Event::Register {
            path: PathBuf::from(content),
            deploy_id: deploy_id.to_string(),
        });
        Ok(TaskDefinitionHandle::new(format!(
            "arn:aws:ecs:task-definition/{}:{}",
            content, *revision
        )))
    }

    async fn update_rule(&self, cluster: &str, update: &RuleUpdate) -> shipflow_cloud::Result<()> {
        self.events.record(Event::UpdateRule {
            cluster: cluster.to_string(),
            update: update.clone(),
        });
        Ok(())
    }
}

pub struct FakeRoles;

#[async_trait]
impl RoleResolver for FakeRoles {
    async fn role_arn(&self, name: &str) -> shipflow_cloud::Result<String> {
        Ok(role_arn(name))
    }
}

pub fn role_arn(name: &str) -> String {
    if name.starts_with("arn:") {
        return name.to_string();
    }
    format!("arn:aws:iam::123456789012:role/{}", name)
}

/// Resolved path of a task definition given relative to the config directory
pub fn config_path(relative: &str) -> PathBuf {
    Path::new(BASE_PATH).join("config").join(relative)
}

pub struct TestDeploy {
    manifest: String,
    existing_services: Vec<(String, String)>,
    fail_on: Option<String>,
    missing_ref: Option<String>,
}

impl TestDeploy {
    pub fn new(manifest: &str) -> Self {
        Self {
            manifest: manifest.to_string(),
            existing_services: Vec::new(),
            fail_on: None,
            missing_ref: None,
        }
    }

    /// Services registered in the fake scheduler
    pub fn with_service(mut self, cluster: &str, service: &str) -> Self {
        self.existing_services
            .push((cluster.to_string(), service.to_string()));
        self
    }

    pub fn failing_build(mut self, container: &str) -> Self {
        self.fail_on = Some(container.to_string());
        self
    }

    pub fn missing_ref(mut self, git_ref: &str) -> Self {
        self.missing_ref = Some(git_ref.to_string());
        self
    }

    pub fn orchestrator(self) -> (Orchestrator, Events) {
        let events = Events::default();
        let deps = Collaborators {
            source: Box::new(FakeSource {
                events: events.clone(),
                manifest: self.manifest,
                base_path: PathBuf::from(BASE_PATH),
                missing_ref: self.missing_ref,
            }),
            builder: Box::new(FakeBuilder {
                events: events.clone(),
                fail_on: self.fail_on,
            }),
            registry: Box::new(FakeRegistry {
                events: events.clone(),
            }),
            scheduler: Box::new(FakeScheduler {
                events: events.clone(),
                existing_services: self.existing_services,
                revision: Mutex::new(0),
            }),
            roles: Box::new(FakeRoles),
        };
        (Orchestrator::new(deps, DeployOptions::default()), events)
    }

    /// `ready` 済みのオーケストレーター
    pub async fn ready(self) -> (Orchestrator, Events) {
        let (mut orchestrator, events) = self.orchestrator();
        orchestrator.ready().await.unwrap();
        (orchestrator, events)
    }
}
