use clap::{Args, Parser, Subcommand};
use std::time::Duration;

/// Lifecycle orchestrator for local development clusters
#[derive(Parser, Debug)]
#[command(
    name = "windsor",
    about = "Lifecycle orchestrator for local development clusters",
    version,
    long_about = "windsor brings a project's infrastructure up and down for a named context: \
                  virtual machine, container runtime, networking, terraform stack and the \
                  Kubernetes blueprint installed on top of it."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Initialize the project for a context",
        long_about = "Sets the current context, writes its configuration, renders the blueprint \
                      templates and generates project files.\n\n\
                      Examples:\n  \
                      windsor init\n  \
                      windsor init local\n  \
                      windsor init staging --blueprint oci://ghcr.io/acme/blueprint:v1"
    )]
    Init(InitArgs),

    #[command(about = "Bring the context's environment up")]
    Up(UpArgs),

    #[command(about = "Tear the context's environment down")]
    Down(DownArgs),

    #[command(
        about = "Check tools or node health",
        long_about = "Without a subcommand, verifies required tools and their versions.\n\n\
                      Examples:\n  \
                      windsor check\n  \
                      windsor check node-health --nodes 10.5.0.10,10.5.0.11 --timeout 5m\n  \
                      windsor check node-health --nodes controlplane-1 --k8s-endpoint --ready"
    )]
    Check(CheckArgs),

    #[command(about = "Install the blueprint into the cluster")]
    Install(InstallArgs),

    #[command(about = "Run a command with the context's environment")]
    Exec(ExecArgs),

    /// Show or change the current context
    #[command(subcommand)]
    Context(ContextCommand),

    #[command(about = "Print the shell hook that loads `windsor env` on each prompt")]
    Hook(HookArgs),

    #[command(about = "Print the context's environment as shell statements")]
    Env(EnvArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct InitArgs {
    #[arg(value_name = "CONTEXT", help = "Context to initialize (defaults to the current one)")]
    pub context: Option<String>,

    #[arg(long, value_name = "REF", help = "OCI blueprint reference to render templates from")]
    pub blueprint: Option<String>,

    #[arg(long, help = "Overwrite existing blueprint and generated files")]
    pub reset: bool,

    #[arg(long, help = "Do not add the project directory to the trusted list")]
    pub no_trust: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpArgs {
    #[arg(long, help = "Install the blueprint once the environment is up")]
    pub install: bool,

    #[arg(long, requires = "install", help = "Wait for kustomizations to become ready")]
    pub wait: bool,

    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DownArgs {
    #[arg(long, help = "Remove generated files and context artifacts")]
    pub clean: bool,

    #[arg(long, help = "Leave the blueprint installed")]
    pub skip_k8s: bool,

    #[arg(long = "skip-tf", help = "Leave the terraform stack in place")]
    pub skip_terraform: bool,

    #[arg(long, help = "Leave the container runtime running")]
    pub skip_docker: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    #[command(subcommand)]
    pub operation: Option<CheckCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CheckCommand {
    #[command(about = "Check that required tools are installed")]
    Tools,

    #[command(about = "Check cluster node and Kubernetes health")]
    NodeHealth(NodeHealthArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct NodeHealthArgs {
    #[arg(long, value_delimiter = ',', value_name = "NODES")]
    pub nodes: Vec<String>,

    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,

    #[arg(long, value_name = "VERSION", help = "Expected node version")]
    pub version: Option<String>,

    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "URL",
        help = "Check the Kubernetes API, optionally at URL"
    )]
    pub k8s_endpoint: Option<String>,

    #[arg(long, help = "Also require nodes to be Ready in Kubernetes")]
    pub ready: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    #[arg(long, help = "Wait for kustomizations to become ready")]
    pub wait: bool,

    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExecArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ContextCommand {
    #[command(about = "Print the current context")]
    Get,

    #[command(about = "Switch to a context")]
    Set {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct HookArgs {
    #[arg(value_name = "SHELL", help = "zsh, bash, fish or powershell")]
    pub shell: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EnvArgs {
    #[arg(long, value_name = "SHELL", help = "Output syntax (defaults to bash)")]
    pub shell: Option<String>,
}

/// Parses `90`, `90s`, `5m`, `2h` or `500ms`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: u64 = number
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;
    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!(
            "Invalid duration unit in '{}'. Use ms, s, m or h",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_check_defaults_to_tools() {
        let args = CliArgs::parse_from(["windsor", "check"]);
        match args.command {
            Commands::Check(check) => assert!(check.operation.is_none()),
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_node_health_options() {
        let args = CliArgs::parse_from([
            "windsor",
            "check",
            "node-health",
            "--nodes",
            "10.0.0.1,10.0.0.2",
            "--timeout",
            "5m",
            "--version",
            "v1.7.0",
            "--k8s-endpoint",
            "--ready",
        ]);
        match args.command {
            Commands::Check(CheckArgs {
                operation: Some(CheckCommand::NodeHealth(health)),
            }) => {
                assert_eq!(health.nodes, vec!["10.0.0.1", "10.0.0.2"]);
                assert_eq!(health.timeout, Some(Duration::from_secs(300)));
                assert_eq!(health.version.as_deref(), Some("v1.7.0"));
                assert_eq!(health.k8s_endpoint.as_deref(), Some("true"));
                assert!(health.ready);
            }
            _ => panic!("Expected node-health"),
        }
    }

    #[test]
    fn test_k8s_endpoint_with_url() {
        let args = CliArgs::parse_from([
            "windsor",
            "check",
            "node-health",
            "--k8s-endpoint",
            "https://10.5.0.10:6443",
        ]);
        match args.command {
            Commands::Check(CheckArgs {
                operation: Some(CheckCommand::NodeHealth(health)),
            }) => {
                assert_eq!(
                    health.k8s_endpoint.as_deref(),
                    Some("https://10.5.0.10:6443")
                );
                assert!(health.nodes.is_empty());
            }
            _ => panic!("Expected node-health"),
        }
    }

    #[test]
    fn test_exec_keeps_hyphenated_args() {
        let args = CliArgs::parse_from(["windsor", "exec", "kubectl", "get", "pods", "-A"]);
        match args.command {
            Commands::Exec(exec) => assert_eq!(exec.command, vec!["kubectl", "get", "pods", "-A"]),
            _ => panic!("Expected Exec command"),
        }
    }

    #[test]
    fn test_wait_requires_install() {
        assert!(CliArgs::try_parse_from(["windsor", "up", "--wait"]).is_err());
        assert!(CliArgs::try_parse_from(["windsor", "up", "--install", "--wait"]).is_ok());
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["windsor", "-v", "down", "--clean"]);
        assert!(args.verbose);
        assert!(CliArgs::try_parse_from(["windsor", "-v", "-q", "up"]).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("m").is_err());
    }
}
