// src/hooks.rs

//! Lifecycle hooks
//!
//! Hooks are zero-argument callables registered by name. An absent hook is
//! a no-op; a hook that returns an error aborts the remaining workflow.
//!
//! Configuration files describe hooks as shell commands, which are wrapped
//! in [`ShellHook`] and executed with `/bin/sh -c` under a timeout.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::process::{Command, Stdio};
use std::time::Duration;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Default timeout for shell hooks (5 minutes)
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// Points in the deploy workflow where a hook may run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum HookName {
    BeforeDeploy,
    AfterDownload,
    BeforeExtract,
    AfterExtract,
    BeforeSymlink,
    AfterSymlink,
    Configure,
    BeforeMigrate,
    Migrate,
    AfterMigrate,
    Restart,
    AfterDeploy,
}

/// A registered hook body
pub type HookFn = Box<dyn Fn() -> anyhow::Result<()>>;

/// Named set of lifecycle hooks
#[derive(Default)]
pub struct Hooks {
    hooks: HashMap<HookName, HookFn>,
}

impl Hooks {
    /// Create an empty hook set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, replacing any previous one with the same name
    pub fn with<F>(mut self, name: HookName, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + 'static,
    {
        self.set(name, hook);
        self
    }

    /// Register a hook in place
    pub fn set<F>(&mut self, name: HookName, hook: F)
    where
        F: Fn() -> anyhow::Result<()> + 'static,
    {
        self.hooks.insert(name, Box::new(hook));
    }

    /// Check whether a hook is registered
    pub fn is_set(&self, name: HookName) -> bool {
        self.hooks.contains_key(&name)
    }

    /// Run a hook if one is registered
    pub fn run(&self, name: HookName) -> Result<()> {
        let Some(hook) = self.hooks.get(&name) else {
            debug!("No {} hook registered", name);
            return Ok(());
        };

        info!("Running {} hook", name);
        hook().map_err(|source| Error::Hook { hook: name, source })
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.hooks.keys().collect();
        names.sort();
        f.debug_struct("Hooks").field("registered", &names).finish()
    }
}

/// A hook that runs a shell command
#[derive(Debug, Clone)]
pub struct ShellHook {
    name: HookName,
    command: String,
    env: BTreeMap<String, String>,
    timeout: Duration,
}

impl ShellHook {
    /// Create a shell hook
    pub fn new(name: HookName, command: impl Into<String>) -> Self {
        Self {
            name,
            command: command.into(),
            env: BTreeMap::new(),
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Export additional environment variables to the command
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command line this hook runs
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Execute the command, failing on non-zero exit or timeout
    pub fn execute(&self) -> anyhow::Result<()> {
        debug!("Executing {} hook: {}", self.name, self.command);

        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .envs(&self.env)
            .env("ARTIFACT_HOOK", self.name.as_ref())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn /bin/sh: {}", e))?;

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                anyhow::bail!(
                    "'{}' timed out after {}s",
                    self.command,
                    self.timeout.as_secs()
                );
            }
        };

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        for line in stdout.lines() {
            debug!("[{}] {}", self.name, line);
        }

        if !status.success() {
            for line in stderr.lines() {
                warn!("[{}] {}", self.name, line);
            }
            anyhow::bail!(
                "'{}' exited with status {}",
                self.command,
                status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            );
        }

        Ok(())
    }

    /// Wrap this command as a registrable hook body
    pub fn into_hook(self) -> impl Fn() -> anyhow::Result<()> + 'static {
        move || self.execute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_hook_names_round_trip_snake_case() {
        assert_eq!(HookName::BeforeDeploy.to_string(), "before_deploy");
        assert_eq!(HookName::from_str("after_symlink").unwrap(), HookName::AfterSymlink);
        assert!(HookName::from_str("after_lunch").is_err());
        assert_eq!(HookName::iter().count(), 12);
    }

    #[test]
    fn test_absent_hook_is_noop() {
        let hooks = Hooks::new();
        assert!(!hooks.is_set(HookName::Configure));
        hooks.run(HookName::Configure).unwrap();
    }

    #[test]
    fn test_registered_hook_runs() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let recorder = Rc::clone(&calls);
        let hooks = Hooks::new().with(HookName::Restart, move || {
            recorder.borrow_mut().push("restart");
            Ok(())
        });

        hooks.run(HookName::Restart).unwrap();
        hooks.run(HookName::Configure).unwrap();
        assert_eq!(*calls.borrow(), vec!["restart"]);
    }

    #[test]
    fn test_failing_hook_names_itself() {
        let hooks = Hooks::new().with(HookName::Migrate, || anyhow::bail!("schema locked"));
        let err = hooks.run(HookName::Migrate).unwrap_err();
        assert!(matches!(err, Error::Hook { hook: HookName::Migrate, .. }));
        assert!(err.to_string().contains("migrate hook failed"));
    }

    #[test]
    fn test_shell_hook_success_and_env() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let marker = temp_dir.path().join("marker");
        let mut env = BTreeMap::new();
        env.insert("MARKER".to_string(), marker.to_string_lossy().to_string());

        let hook = ShellHook::new(HookName::Configure, "echo \"$ARTIFACT_HOOK\" > \"$MARKER\"")
            .with_env(env);
        hook.execute().unwrap();

        let written = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(written.trim(), "configure");
    }

    #[test]
    fn test_shell_hook_failure() {
        let hook = ShellHook::new(HookName::Restart, "exit 3");
        let err = hook.execute().unwrap_err();
        assert!(err.to_string().contains("exited with status 3"));
    }

    #[test]
    fn test_shell_hook_timeout() {
        let hook = ShellHook::new(HookName::Restart, "sleep 5")
            .with_timeout(Duration::from_millis(100));
        let err = hook.execute().unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
