use crate::backup::backup_config::AppConfig;
use crate::backup::exec::{Executor, ShellCommand};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use derive_more::Display;
use tracing::info;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum HookPhase {
    #[display("before")]
    Before,
    #[display("after")]
    After,
}

/// Runs the `phase` hooks of the profile one after another, in configured order.
///
/// Without a profile this does nothing. Output is shown to the operator and otherwise
/// ignored; the first failing hook stops the sequence.
pub fn run_hooks(
    executor: &dyn Executor,
    config: &AppConfig,
    profile_name: Option<&str>,
    phase: HookPhase,
    dry_run: bool,
) -> Result<()> {
    let Some(profile_name) = profile_name else {
        return Ok(());
    };
    let profile = config.profile(profile_name)?;
    let hooks = match phase {
        HookPhase::Before => profile.before(),
        HookPhase::After => profile.after(),
    };

    info!("Running {} {} hooks of profile {:?}", hooks.len(), phase, profile_name);
    for hook in hooks {
        let environment = config.environment(hook.environment())?;
        let output = executor
            .run_checked(&environment, &ShellCommand::new(hook.command()), dry_run)
            .with_msg(format!("{} hook of profile {:?} failed", phase, profile_name))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!("{}", stdout.trim_end());
        }
    }
    Ok(())
}
