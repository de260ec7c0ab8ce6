//! # Compose File Generation
//!
//! Renders `docker-compose.yml` for one instance from the module's `[docker]`
//! section and the instance data. Output depends only on those inputs, so
//! regenerating always produces the same file.
//!
//! String fields may contain template variables:
//! `{instance_id}`, `{instance_id_short}`, `{instance_name}`, `{module_name}`,
//! `{port}`, `{rcon_port}`, `{rest_port}`, `{rest_password}` and any string
//! entry of the instance's module settings.

use crate::docker::cli::container_name;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::BTreeMap;

/// The module's `[docker]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerSection {
    pub image: String,
    pub restart: Option<String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub environment: BTreeMap<String, Value>,
    pub working_dir: Option<String>,
    pub entrypoint: Option<String>,
    pub command: Option<String>,
    pub user: Option<String>,
    pub cpu_limit: Option<Value>,
    pub memory_limit: Option<Value>,
}

/// Per-instance extension settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtensionData {
    pub docker_enabled: bool,
    pub docker_cpu_limit: Option<Value>,
    pub docker_memory_limit: Option<Value>,
}

/// Instance fields used by templates
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceData {
    #[serde(alias = "id")]
    pub instance_id: String,
    #[serde(alias = "name")]
    pub instance_name: String,
    pub module_name: String,
    pub port: Option<u16>,
    pub rcon_port: Option<u16>,
    pub rest_port: Option<u16>,
    pub rest_password: Option<String>,
    pub module_settings: Map<String, Value>,
    pub extension_data: ExtensionData,
}

impl InstanceData {
    /// Substitute template variables in `template`
    pub fn resolve(&self, template: &str) -> String {
        let short: String = self.instance_id.chars().take(8).collect();
        let mut out = template
            .replace("{instance_id_short}", &short)
            .replace("{instance_id}", &self.instance_id)
            .replace("{instance_name}", &self.instance_name)
            .replace("{module_name}", &self.module_name);

        let optional = [
            ("{port}", self.port.map(|p| p.to_string())),
            ("{rcon_port}", self.rcon_port.map(|p| p.to_string())),
            ("{rest_port}", self.rest_port.map(|p| p.to_string())),
            ("{rest_password}", self.rest_password.clone()),
        ];
        for (var, value) in optional {
            if let Some(value) = value {
                out = out.replace(var, &value);
            }
        }

        for (key, value) in &self.module_settings {
            if let Value::String(value) = value {
                out = out.replace(&format!("{{{key}}}"), value);
            }
        }
        out
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn strings(items: impl IntoIterator<Item = String>) -> Yaml {
    Yaml::Sequence(items.into_iter().map(Yaml::String).collect())
}

fn key(name: &str) -> Yaml {
    Yaml::String(name.to_string())
}

/// Render the compose document
pub fn generate_compose_yaml(docker: &DockerSection, instance: &InstanceData) -> Result<String> {
    if docker.image.trim().is_empty() {
        return Err(ProtocolError::ConfigError(
            "Module has no [docker] image configured".to_string(),
        ));
    }

    let mut service = Mapping::new();
    service.insert(key("image"), Yaml::String(instance.resolve(&docker.image)));
    service.insert(
        key("container_name"),
        Yaml::String(container_name(&instance.module_name, &instance.instance_id)),
    );
    service.insert(
        key("restart"),
        Yaml::String(docker.restart.clone().unwrap_or_else(|| "unless-stopped".to_string())),
    );

    if !docker.ports.is_empty() {
        service.insert(key("ports"), strings(docker.ports.iter().map(|p| instance.resolve(p))));
    }

    if !docker.volumes.is_empty() {
        service.insert(key("volumes"), strings(docker.volumes.iter().map(|v| instance.resolve(v))));
    }

    if !docker.environment.is_empty() {
        let env: Mapping = docker
            .environment
            .iter()
            .map(|(k, v)| (key(k), Yaml::String(instance.resolve(&scalar_text(v)))))
            .collect();
        service.insert(key("environment"), Yaml::Mapping(env));
    }

    if let Some(dir) = &docker.working_dir {
        service.insert(key("working_dir"), Yaml::String(instance.resolve(dir)));
    }

    if let Some(entrypoint) = &docker.entrypoint {
        let resolved = instance.resolve(entrypoint);
        service.insert(
            key("entrypoint"),
            strings(resolved.split_whitespace().map(str::to_string)),
        );
    }

    if let Some(command) = &docker.command {
        service.insert(key("command"), strings([instance.resolve(command)]));
    }

    if let Some(user) = &docker.user {
        service.insert(key("user"), Yaml::String(instance.resolve(user)));
    }

    let cpu = instance
        .extension_data
        .docker_cpu_limit
        .as_ref()
        .or(docker.cpu_limit.as_ref())
        .filter(|v| !v.is_null());
    let memory = instance
        .extension_data
        .docker_memory_limit
        .as_ref()
        .or(docker.memory_limit.as_ref())
        .filter(|v| !v.is_null());

    if cpu.is_some() || memory.is_some() {
        let mut limits = Mapping::new();
        if let Some(cpu) = cpu {
            limits.insert(key("cpus"), Yaml::String(scalar_text(cpu)));
        }
        if let Some(memory) = memory {
            let text = match memory {
                Value::String(s) => instance.resolve(s),
                other => other.to_string(),
            };
            limits.insert(key("memory"), Yaml::String(text));
        }
        let mut resources = Mapping::new();
        resources.insert(key("limits"), Yaml::Mapping(limits));
        let mut deploy = Mapping::new();
        deploy.insert(key("resources"), Yaml::Mapping(resources));
        service.insert(key("deploy"), Yaml::Mapping(deploy));
    }

    service.insert(key("stdin_open"), Yaml::Bool(true));
    service.insert(key("tty"), Yaml::Bool(true));

    let mut services = Mapping::new();
    services.insert(key(&instance.module_name), Yaml::Mapping(service));
    let mut root = Mapping::new();
    root.insert(key("services"), Yaml::Mapping(services));

    serde_yaml::to_string(&Yaml::Mapping(root))
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to render compose file: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance() -> InstanceData {
        serde_json::from_value(json!({
            "id": "0123456789abcdef",
            "name": "My World",
            "module_name": "palworld",
            "port": 8211,
            "rest_port": 8212,
            "rest_password": "pw",
            "module_settings": {"world": "main", "max": 32},
            "extension_data": {"docker_memory_limit": "8g"}
        }))
        .unwrap()
    }

    fn section() -> DockerSection {
        serde_json::from_value(json!({
            "image": "ghcr.io/example/{module_name}:latest",
            "ports": ["{port}:{port}/udp", "{rest_port}:8212"],
            "volumes": ["./server:/data/{world}"],
            "environment": {"ADMIN_PASSWORD": "{rest_password}", "PLAYERS": 16},
            "entrypoint": "/bin/sh -c",
            "command": "./start.sh --name \"{instance_name}\"",
            "cpu_limit": 2
        }))
        .unwrap()
    }

    #[test]
    fn test_template_resolution() {
        let inst = instance();
        assert_eq!(inst.resolve("{instance_id_short}-{instance_id}"), "01234567-0123456789abcdef");
        assert_eq!(inst.resolve("{rcon_port}"), "{rcon_port}");
        assert_eq!(inst.resolve("{world}/{max}"), "main/{max}");
    }

    #[test]
    fn test_generated_document() {
        let yaml = generate_compose_yaml(&section(), &instance()).unwrap();
        let doc: Yaml = serde_yaml::from_str(&yaml).unwrap();
        let svc = &doc["services"]["palworld"];

        assert_eq!(svc["image"], Yaml::from("ghcr.io/example/palworld:latest"));
        assert_eq!(svc["container_name"], Yaml::from("saba-palworld-01234567"));
        assert_eq!(svc["restart"], Yaml::from("unless-stopped"));
        assert_eq!(svc["ports"][0], Yaml::from("8211:8211/udp"));
        assert_eq!(svc["volumes"][0], Yaml::from("./server:/data/main"));
        assert_eq!(svc["environment"]["ADMIN_PASSWORD"], Yaml::from("pw"));
        assert_eq!(svc["environment"]["PLAYERS"], Yaml::from("16"));
        assert_eq!(svc["entrypoint"][1], Yaml::from("-c"));
        assert_eq!(svc["command"][0], Yaml::from("./start.sh --name \"My World\""));
        assert_eq!(svc["deploy"]["resources"]["limits"]["cpus"], Yaml::from("2"));
        assert_eq!(svc["deploy"]["resources"]["limits"]["memory"], Yaml::from("8g"));
        assert_eq!(svc["stdin_open"], Yaml::Bool(true));
        assert_eq!(svc["tty"], Yaml::Bool(true));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate_compose_yaml(&section(), &instance()).unwrap();
        let b = generate_compose_yaml(&section(), &instance()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_image_rejected() {
        let result = generate_compose_yaml(&DockerSection::default(), &instance());
        assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
    }

    #[test]
    fn test_no_limits_no_deploy() {
        let mut docker = section();
        docker.cpu_limit = None;
        let mut inst = instance();
        inst.extension_data.docker_memory_limit = None;

        let yaml = generate_compose_yaml(&docker, &inst).unwrap();
        assert!(!yaml.contains("deploy"));
    }
}
