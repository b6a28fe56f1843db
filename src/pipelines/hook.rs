use super::base::BasePipeline;
use super::Pipeline;
use crate::context::{ExecContext, ExecParams};
use crate::error::WindsorError;
use crate::registry::Registry;
use anyhow::Result;
use async_trait::async_trait;

const ZSH_HOOK: &str = r#"_windsor_hook() {
  trap -- '' SIGINT;
  eval "$(windsor env --shell zsh)";
  trap - SIGINT;
}
typeset -ag precmd_functions;
if [[ -z "${precmd_functions[(r)_windsor_hook]+1}" ]]; then
  precmd_functions=( _windsor_hook ${precmd_functions[@]} )
fi
typeset -ag chpwd_functions;
if [[ -z "${chpwd_functions[(r)_windsor_hook]+1}" ]]; then
  chpwd_functions=( _windsor_hook ${chpwd_functions[@]} )
fi"#;

const BASH_HOOK: &str = r#"_windsor_hook() {
  local previous_exit_status=$?;
  trap -- '' SIGINT;
  eval "$(windsor env --shell bash)";
  trap - SIGINT;
  return $previous_exit_status;
};
if [[ ";${PROMPT_COMMAND[*]:-};" != *";_windsor_hook;"* ]]; then
  PROMPT_COMMAND="_windsor_hook${PROMPT_COMMAND:+;$PROMPT_COMMAND}"
fi"#;

const FISH_HOOK: &str = r#"function __windsor_hook --on-event fish_prompt
  windsor env --shell fish | source
end"#;

const POWERSHELL_HOOK: &str = r#"$global:__windsor_prompt = $function:prompt
function global:prompt {
  windsor env --shell powershell | Out-String | Invoke-Expression
  & $global:__windsor_prompt
}"#;

/// Shell dialects `hook` and `env` can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ShellKind {
    Zsh,
    Bash,
    Fish,
    PowerShell,
}

impl ShellKind {
    pub(super) fn parse(name: &str) -> Result<Self, WindsorError> {
        match name {
            "zsh" => Ok(ShellKind::Zsh),
            "bash" => Ok(ShellKind::Bash),
            "fish" => Ok(ShellKind::Fish),
            "powershell" | "pwsh" => Ok(ShellKind::PowerShell),
            other => Err(WindsorError::validation(format!(
                "Unsupported shell type: {}",
                other
            ))),
        }
    }

    /// Shell named by `shell_name`, defaulting to POSIX syntax.
    pub(super) fn from_params(params: &ExecParams) -> Result<Self, WindsorError> {
        match ExecParams::non_empty(&params.shell_name) {
            Some(name) => Self::parse(name),
            None => Ok(ShellKind::Bash),
        }
    }

    fn hook(self) -> &'static str {
        match self {
            ShellKind::Zsh => ZSH_HOOK,
            ShellKind::Bash => BASH_HOOK,
            ShellKind::Fish => FISH_HOOK,
            ShellKind::PowerShell => POWERSHELL_HOOK,
        }
    }

    pub(super) fn export(self, key: &str, value: &str) -> String {
        match self {
            ShellKind::Zsh | ShellKind::Bash => {
                format!("export {}=\"{}\"", key, escape_double_quoted(value))
            }
            ShellKind::Fish => format!("set -gx {} \"{}\"", key, escape_double_quoted(value)),
            ShellKind::PowerShell => format!("$env:{}='{}'", key, value.replace('\'', "''")),
        }
    }

    pub(super) fn unset(self, key: &str) -> String {
        match self {
            ShellKind::Zsh | ShellKind::Bash => format!("unset {}", key),
            ShellKind::Fish => format!("set -e {}", key),
            ShellKind::PowerShell => {
                format!("Remove-Item Env:{} -ErrorAction SilentlyContinue", key)
            }
        }
    }
}

fn escape_double_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Prints the prompt hook for a shell.
pub struct HookPipeline {
    base: BasePipeline,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self {
            base: BasePipeline::new("hook"),
        }
    }
}

impl Default for HookPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for HookPipeline {
    fn initialize(&mut self, registry: &mut Registry, ctx: &ExecContext) -> Result<()> {
        self.base.initialize(registry, ctx)
    }

    async fn execute(&self, ctx: &ExecContext) -> Result<()> {
        let name = ExecParams::non_empty(&ctx.params().shell_name)
            .ok_or_else(|| WindsorError::validation("No shell name provided"))?;
        ctx.emit(ShellKind::parse(name)?.hook());
        Ok(())
    }
}
