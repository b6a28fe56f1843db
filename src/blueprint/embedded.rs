use super::TemplateData;

const LOCAL_BLUEPRINT: &str = r#"local context = std.extVar('context');
{
  kind: 'Blueprint',
  apiVersion: 'blueprints.windsorcli.dev/v1alpha1',
  metadata: {
    name: context.name,
    description: 'Local development cluster for ' + context.projectName,
  },
  sources: [
    { name: 'core', url: 'oci://ghcr.io/windsorcli/core', ref: { tag: 'latest' } },
  ],
  terraform: [
    { path: 'cluster/talos', source: 'core' },
    { path: 'gitops/flux', source: 'core', destroy: false },
  ],
  kustomizations: [
    { name: 'policy-base', path: 'policy/base', source: 'core' },
    { name: 'pki-base', path: 'pki/base', source: 'core', dependsOn: ['policy-base'] },
    { name: 'dns', path: 'dns', source: 'core', dependsOn: ['pki-base'] },
  ],
}
"#;

const REMOTE_BLUEPRINT: &str = r#"local context = std.extVar('context');
{
  kind: 'Blueprint',
  apiVersion: 'blueprints.windsorcli.dev/v1alpha1',
  metadata: {
    name: context.name,
    description: 'Blueprint for the ' + context.name + ' context',
  },
  sources: [
    { name: 'core', url: 'oci://ghcr.io/windsorcli/core', ref: { tag: 'latest' } },
  ],
  terraform: [
    { path: 'cluster/talos', source: 'core' },
    { path: 'gitops/flux', source: 'core', destroy: false },
  ],
  kustomizations: [
    { name: 'policy-base', path: 'policy/base', source: 'core' },
  ],
}
"#;

/// Built-in blueprint template for `context`.
pub fn default_template_data(context: &str) -> TemplateData {
    let source = if context == "local" || context.starts_with("local-") {
        LOCAL_BLUEPRINT
    } else {
        REMOTE_BLUEPRINT
    };
    let mut data = TemplateData::new();
    data.insert("blueprint.jsonnet".to_string(), source.as_bytes().to_vec());
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_and_remote_templates_differ() {
        let local = default_template_data("local");
        let remote = default_template_data("staging");
        assert!(local.contains_key("blueprint.jsonnet"));
        assert_ne!(local["blueprint.jsonnet"], remote["blueprint.jsonnet"]);
    }
}
