use serde_yaml::Value;

const LOCAL_DEFAULTS: &str = r#"
vm:
  driver: colima
  cpu: 4
  memory: 8
  disk: 60
docker:
  enabled: true
  registry_url: registry.test
cluster:
  enabled: true
  driver: talos
  controlplanes:
    count: 1
  workers:
    count: 1
network:
  cidr_block: 10.5.0.0/16
  loadbalancer_ips:
    start: 10.5.1.1
    end: 10.5.1.10
dns:
  enabled: true
  domain: test
terraform:
  enabled: true
"#;

const REMOTE_DEFAULTS: &str = r#"
docker:
  enabled: false
cluster:
  enabled: true
  driver: talos
terraform:
  enabled: true
"#;

/// Default configuration for a brand-new context. Contexts named `local` or
/// `local-*` get a full local VM stack.
pub fn default_context_config(context: &str) -> Value {
    let source = if context == "local" || context.starts_with("local-") {
        LOCAL_DEFAULTS
    } else {
        REMOTE_DEFAULTS
    };
    serde_yaml::from_str(source).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::lookup;

    #[test]
    fn test_local_contexts_get_vm_defaults() {
        for name in ["local", "local-dev"] {
            let config = default_context_config(name);
            assert_eq!(lookup(&config, "vm.driver"), Some(&Value::from("colima")));
            assert_eq!(lookup(&config, "docker.enabled"), Some(&Value::from(true)));
        }
    }

    #[test]
    fn test_remote_contexts_skip_vm() {
        let config = default_context_config("staging");
        assert!(lookup(&config, "vm.driver").is_none());
        assert_eq!(lookup(&config, "docker.enabled"), Some(&Value::from(false)));
    }
}
