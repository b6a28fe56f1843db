//! Recording collaborators for pipeline tests

use crate::blueprint::model::TerraformComponent;
use crate::blueprint::{
    ArtifactBuilder, Blueprint, BlueprintHandler, Kustomization, OciReference, RenderedData,
    TemplateData, TemplateRenderer,
};
use crate::cluster::ClusterClient;
use crate::config::{ConfigHandler, YamlConfigHandler};
use crate::context::Signal;
use crate::env::{EnvPrinter, SecretsProvider};
use crate::fs::{FileSystem, MockFileSystem};
use crate::generators::Generator;
use crate::kubernetes::{KubernetesManager, Notify};
use crate::network::NetworkManager;
use crate::registry::{self, Registry};
use crate::shell::{MockShell, Shell};
use crate::stack::Stack;
use crate::tools::ToolsManager;
use crate::virt::{ContainerRuntime, VirtualMachine};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const LOCAL_CONFIG: &str = r#"
vm:
  driver: colima
docker:
  enabled: true
cluster:
  enabled: true
  driver: talos
dns:
  enabled: true
  domain: test
terraform:
  enabled: true
"#;

#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashSet<String>>>,
}

impl Recorder {
    pub fn call(&self, name: &str) -> Result<()> {
        self.log.lock().unwrap().push(name.to_string());
        if self.failures.lock().unwrap().contains(name) {
            return Err(anyhow!("{} failed", name));
        }
        Ok(())
    }
}

pub struct FakeTools(pub Recorder);

#[async_trait]
impl ToolsManager for FakeTools {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    async fn check(&self) -> Result<()> {
        self.0.call("tools.check")
    }
    async fn install(&self) -> Result<()> {
        self.0.call("tools.install")
    }
    fn write_manifest(&self) -> Result<()> {
        self.0.call("tools.write_manifest")
    }
}

pub struct FakeVm(pub Recorder);

#[async_trait]
impl VirtualMachine for FakeVm {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    async fn up(&self) -> Result<()> {
        self.0.call("vm.up")
    }
    async fn down(&self) -> Result<()> {
        self.0.call("vm.down")
    }
    async fn address(&self) -> Result<String> {
        Ok("192.168.5.2".to_string())
    }
}

pub struct FakeRuntime(pub Recorder);

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    async fn up(&self) -> Result<()> {
        self.0.call("runtime.up")
    }
    async fn down(&self) -> Result<()> {
        self.0.call("runtime.down")
    }
}

pub struct FakeNetwork(pub Recorder);

#[async_trait]
impl NetworkManager for FakeNetwork {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    async fn configure_guest(&self) -> Result<()> {
        self.0.call("network.guest")
    }
    async fn configure_host_route(&self) -> Result<()> {
        self.0.call("network.route")
    }
    async fn configure_dns(&self) -> Result<()> {
        self.0.call("network.dns")
    }
}

pub struct FakeStack(pub Recorder);

#[async_trait]
impl Stack for FakeStack {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    async fn up(&self) -> Result<()> {
        self.0.call("stack.up")
    }
    async fn down(&self, blueprint: &Blueprint) -> Result<()> {
        self.0
            .call(&format!("stack.down({})", blueprint.terraform.len()))
    }
}

/// Blueprint handler with one terraform component and two kustomizations
/// once its config is loaded.
pub struct FakeBlueprint {
    recorder: Recorder,
    loaded: Mutex<bool>,
    local_templates: Mutex<TemplateData>,
    pub loaded_data: Mutex<Option<(Map<String, Value>, Option<OciReference>)>>,
}

impl FakeBlueprint {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            loaded: Mutex::new(false),
            local_templates: Mutex::new(TemplateData::new()),
            loaded_data: Mutex::new(None),
        }
    }

    pub fn set_local_templates(&self, data: TemplateData) {
        *self.local_templates.lock().unwrap() = data;
    }
}

#[async_trait]
impl BlueprintHandler for FakeBlueprint {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    fn load_config(&self) -> Result<()> {
        self.recorder.call("blueprint.load_config")?;
        *self.loaded.lock().unwrap() = true;
        Ok(())
    }
    fn load_blueprint(&self) -> Result<()> {
        self.load_config()
    }
    fn generate(&self) -> Blueprint {
        let mut blueprint = Blueprint::named("local");
        if *self.loaded.lock().unwrap() {
            blueprint.terraform.push(TerraformComponent {
                path: "cluster/talos".to_string(),
                ..Default::default()
            });
            blueprint.kustomizations = self.get_kustomizations();
        }
        blueprint
    }
    async fn down(&self) -> Result<()> {
        self.recorder.call("blueprint.down")
    }
    async fn install(&self) -> Result<()> {
        self.recorder.call("blueprint.install")
    }
    async fn wait_for_kustomizations(
        &self,
        _signal: &Signal,
        message: &str,
        names: &[String],
    ) -> Result<()> {
        self.recorder
            .call(&format!("blueprint.wait({}: {})", message, names.join(",")))
    }
    fn get_local_template_data(&self) -> Result<TemplateData> {
        Ok(self.local_templates.lock().unwrap().clone())
    }
    fn get_default_template_data(&self, context: &str) -> Result<TemplateData> {
        Ok(TemplateData::from([(
            "blueprint.jsonnet".to_string(),
            format!("{{ name: '{}' }}", context).into_bytes(),
        )]))
    }
    fn get_kustomizations(&self) -> Vec<Kustomization> {
        ["dns", "ingress"]
            .iter()
            .map(|name| Kustomization {
                name: name.to_string(),
                ..Default::default()
            })
            .collect()
    }
    fn load_data(&self, data: &Map<String, Value>, oci: Option<&OciReference>) -> Result<()> {
        self.recorder.call("blueprint.load_data")?;
        *self.loaded_data.lock().unwrap() = Some((data.clone(), oci.cloned()));
        Ok(())
    }
    fn write(&self, overwrite: bool) -> Result<()> {
        self.recorder.call(&format!("blueprint.write({})", overwrite))
    }
}

pub struct FakeCluster(pub Recorder);

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn wait_for_nodes_healthy(
        &self,
        _signal: &Signal,
        nodes: &[String],
        expected_version: Option<&str>,
    ) -> Result<()> {
        self.0.call(&format!(
            "cluster.wait({}, {})",
            nodes.join(","),
            expected_version.unwrap_or("-")
        ))
    }
    fn close(&self) {
        let _ = self.0.call("cluster.close");
    }
}

pub struct FakeKubernetes(pub Recorder);

#[async_trait]
impl KubernetesManager for FakeKubernetes {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    async fn wait_for_kubernetes_healthy(
        &self,
        _signal: &Signal,
        endpoint: &str,
        _output: Notify<'_>,
        node_names: &[String],
    ) -> Result<()> {
        self.0.call(&format!(
            "kubernetes.wait({}, {})",
            endpoint,
            node_names.join(",")
        ))
    }
    async fn get_node_ready_status(
        &self,
        _signal: &Signal,
        node_names: &[String],
    ) -> Result<HashMap<String, bool>> {
        self.0.call("kubernetes.ready_status")?;
        Ok(node_names.iter().map(|n| (n.clone(), true)).collect())
    }
    async fn apply_manifest(&self, _path: &Path) -> Result<()> {
        self.0.call("kubernetes.apply")
    }
    async fn delete_kustomization(&self, name: &str, _namespace: &str) -> Result<()> {
        self.0.call(&format!("kubernetes.delete({})", name))
    }
    async fn get_kustomization_status(&self, names: &[String]) -> Result<HashMap<String, bool>> {
        Ok(names.iter().map(|n| (n.clone(), true)).collect())
    }
}

pub struct FakeArtifacts {
    recorder: Recorder,
    pub data: TemplateData,
}

#[async_trait]
impl ArtifactBuilder for FakeArtifacts {
    async fn get_template_data(&self, reference: &str) -> Result<TemplateData> {
        self.recorder.call(&format!("artifacts.get({})", reference))?;
        Ok(self.data.clone())
    }
}

/// Renders every template to `{"source": <key>}`, plus a `blueprint` entry.
pub struct FakeRenderer(pub Recorder);

#[async_trait]
impl TemplateRenderer for FakeRenderer {
    async fn process(&self, data: &TemplateData, rendered: &mut RenderedData) -> Result<()> {
        self.0.call("renderer.process")?;
        for key in data.keys() {
            rendered.insert(key.clone(), serde_json::json!({ "source": key }));
        }
        rendered.insert(
            "blueprint".to_string(),
            serde_json::json!({ "kind": "Blueprint", "metadata": { "name": "local" } }),
        );
        Ok(())
    }
}

pub struct FakeGenerator(pub Recorder);

impl Generator for FakeGenerator {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    fn generate(&self, data: &RenderedData, overwrite: bool) -> Result<()> {
        self.0
            .call(&format!("generator.generate({}, {})", data.len(), overwrite))
    }
}

pub struct StaticEnv(pub Vec<(String, String)>);

impl EnvPrinter for StaticEnv {
    fn initialize(&self) -> Result<()> {
        Ok(())
    }
    fn get_env_vars(&self) -> Result<crate::env::EnvVars> {
        Ok(self.0.iter().cloned().collect())
    }
}

fn same<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// A project at `/project` with every collaborator faked and seeded.
pub struct Harness {
    pub recorder: Recorder,
    pub shell: Arc<MockShell>,
    pub fs: Arc<MockFileSystem>,
    pub config: Arc<YamlConfigHandler>,
    pub blueprint: Arc<FakeBlueprint>,
    tools: Arc<FakeTools>,
    vm: Arc<FakeVm>,
    runtime: Arc<FakeRuntime>,
    network: Arc<FakeNetwork>,
    stack: Arc<FakeStack>,
    cluster: Arc<FakeCluster>,
    kubernetes: Arc<FakeKubernetes>,
    env: Vec<(String, String)>,
}

impl Harness {
    pub fn new(context_config: &str) -> Self {
        let recorder = Recorder::default();
        let shell = Arc::new(MockShell::new("/project"));
        let fs = Arc::new(MockFileSystem::new());

        let mut contexts = serde_yaml::Mapping::new();
        contexts.insert(
            "local".into(),
            serde_yaml::from_str(context_config).unwrap(),
        );
        let mut project = serde_yaml::Mapping::new();
        project.insert("contexts".into(), serde_yaml::Value::Mapping(contexts));
        fs.add_file(
            "/project/windsor.yaml",
            &serde_yaml::to_string(&project).unwrap(),
        );

        let r = recorder.clone();
        Self {
            shell: shell.clone(),
            config: Arc::new(YamlConfigHandler::new(shell, fs.clone())),
            fs,
            blueprint: Arc::new(FakeBlueprint::new(r.clone())),
            tools: Arc::new(FakeTools(r.clone())),
            vm: Arc::new(FakeVm(r.clone())),
            runtime: Arc::new(FakeRuntime(r.clone())),
            network: Arc::new(FakeNetwork(r.clone())),
            stack: Arc::new(FakeStack(r.clone())),
            cluster: Arc::new(FakeCluster(r.clone())),
            kubernetes: Arc::new(FakeKubernetes(r)),
            recorder,
            env: Vec::new(),
        }
    }

    /// A project without `windsor.yaml`.
    pub fn uninitialized() -> Self {
        let harness = Self::new("{}");
        harness
            .fs
            .remove_all(Path::new("/project/windsor.yaml"))
            .unwrap();
        harness
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn fail(&self, call: &str) {
        self.recorder
            .failures
            .lock()
            .unwrap()
            .insert(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorder.log.lock().unwrap().clone()
    }

    /// Registry pre-seeded with every collaborator.
    pub fn registry(&self) -> Registry {
        let r = self.recorder.clone();
        let mut registry = Registry::new();
        registry.register::<dyn Shell>(registry::SHELL, self.shell.clone());
        registry.register::<dyn FileSystem>(registry::FILE_SYSTEM, self.fs.clone());
        registry.register::<dyn ConfigHandler>(registry::CONFIG_HANDLER, self.config.clone());
        registry.register::<dyn ToolsManager>(registry::TOOLS_MANAGER, self.tools.clone());
        registry.register::<dyn VirtualMachine>(registry::VIRTUAL_MACHINE, self.vm.clone());
        registry.register::<dyn ContainerRuntime>(registry::CONTAINER_RUNTIME, self.runtime.clone());
        registry.register::<dyn NetworkManager>(registry::NETWORK_MANAGER, self.network.clone());
        registry.register::<dyn Stack>(registry::STACK, self.stack.clone());
        registry.register::<dyn BlueprintHandler>(registry::BLUEPRINT_HANDLER, self.blueprint.clone());
        registry.register::<dyn ClusterClient>(registry::CLUSTER_CLIENT, self.cluster.clone());
        registry.register::<dyn KubernetesManager>(registry::KUBERNETES_MANAGER, self.kubernetes.clone());
        registry.register::<dyn TemplateRenderer>(registry::TEMPLATE_RENDERER, Arc::new(FakeRenderer(r.clone())));

        let generators: Vec<Arc<dyn Generator>> = vec![Arc::new(FakeGenerator(r))];
        registry.register(registry::GENERATORS, Arc::new(generators));
        let printers: Vec<Arc<dyn EnvPrinter>> = vec![Arc::new(StaticEnv(self.env.clone()))];
        registry.register(registry::ENV_PRINTERS, Arc::new(printers));
        let secrets: Vec<Arc<dyn SecretsProvider>> = Vec::new();
        registry.register(registry::SECRETS_PROVIDERS, Arc::new(secrets));
        registry
    }

    pub fn artifacts(&self, data: TemplateData) -> Arc<FakeArtifacts> {
        Arc::new(FakeArtifacts {
            recorder: self.recorder.clone(),
            data,
        })
    }

    /// Every seeded entry in `registry` is still the instance the harness made.
    pub fn assert_seeded_entries_survive(&self, registry: &Registry) {
        let check = |name: &str, same_entry: bool| assert!(same_entry, "{} was reconstructed", name);
        check("shell", same(&registry.resolve::<dyn Shell>(registry::SHELL).unwrap(), &self.shell));
        check("config", same(&registry.resolve::<dyn ConfigHandler>(registry::CONFIG_HANDLER).unwrap(), &self.config));
        check("tools", same(&registry.resolve::<dyn ToolsManager>(registry::TOOLS_MANAGER).unwrap(), &self.tools));
        check("vm", same(&registry.resolve::<dyn VirtualMachine>(registry::VIRTUAL_MACHINE).unwrap(), &self.vm));
        check("runtime", same(&registry.resolve::<dyn ContainerRuntime>(registry::CONTAINER_RUNTIME).unwrap(), &self.runtime));
        check("network", same(&registry.resolve::<dyn NetworkManager>(registry::NETWORK_MANAGER).unwrap(), &self.network));
        check("stack", same(&registry.resolve::<dyn Stack>(registry::STACK).unwrap(), &self.stack));
        check("blueprint", same(&registry.resolve::<dyn BlueprintHandler>(registry::BLUEPRINT_HANDLER).unwrap(), &self.blueprint));
        check("cluster", same(&registry.resolve::<dyn ClusterClient>(registry::CLUSTER_CLIENT).unwrap(), &self.cluster));
        check("kubernetes", same(&registry.resolve::<dyn KubernetesManager>(registry::KUBERNETES_MANAGER).unwrap(), &self.kubernetes));
    }
}
