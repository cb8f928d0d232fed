//! Application (OS extension) handlers.
//!
//! Applications are looked up by name in an [`ApplicationRegistry`]. Each
//! registered name maps to a factory producing an [`Application`]; names
//! without a registration resolve to the generic fallback handler instead
//! of failing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::OsdResult;
use crate::shell::{CommandRunner, SYSTEMCTL_CMD};

/// Lifecycle operations exposed by an application.
#[async_trait]
pub trait Application: Send + Sync {
    /// Returns the application name.
    fn name(&self) -> &str;

    /// Starts the application.
    async fn start(&self, cancel: &CancellationToken) -> OsdResult<()>;

    /// Stops the application.
    async fn stop(&self, cancel: &CancellationToken) -> OsdResult<()>;

    /// Applies a new version or configuration of the application.
    async fn update(&self, cancel: &CancellationToken) -> OsdResult<()>;
}

/// Constructs an application handler for a name.
pub type ApplicationFactory =
    Arc<dyn Fn(&str, Arc<dyn CommandRunner>) -> Box<dyn Application> + Send + Sync>;

/// Fallback handler for applications without dedicated logic.
///
/// The extension image carries its own units, so nothing has to be driven
/// from here beyond recording the transition.
pub struct GenericApplication {
    name: String,
}

impl GenericApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Application for GenericApplication {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _cancel: &CancellationToken) -> OsdResult<()> {
        info!(application = %self.name, "Starting application");
        Ok(())
    }

    async fn stop(&self, _cancel: &CancellationToken) -> OsdResult<()> {
        info!(application = %self.name, "Stopping application");
        Ok(())
    }

    async fn update(&self, _cancel: &CancellationToken) -> OsdResult<()> {
        info!(application = %self.name, "Updating application");
        Ok(())
    }
}

/// Application backed by a fixed list of systemd units.
///
/// Units are started in order and stopped in reverse order.
pub struct ServiceApplication {
    name: String,
    units: Vec<String>,
    runner: Arc<dyn CommandRunner>,
}

impl ServiceApplication {
    pub fn new(
        name: impl Into<String>,
        units: impl IntoIterator<Item = impl Into<String>>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            units: units.into_iter().map(Into::into).collect(),
            runner,
        }
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    async fn systemctl(&self, cancel: &CancellationToken, verb: &str, unit: &str) -> OsdResult<()> {
        self.runner
            .run_or_throw(cancel, SYSTEMCTL_CMD, &[verb, unit])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Application for ServiceApplication {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, cancel: &CancellationToken) -> OsdResult<()> {
        for unit in &self.units {
            self.systemctl(cancel, "start", unit).await?;
        }
        info!(application = %self.name, "Application started");
        Ok(())
    }

    async fn stop(&self, cancel: &CancellationToken) -> OsdResult<()> {
        for unit in self.units.iter().rev() {
            self.systemctl(cancel, "stop", unit).await?;
        }
        info!(application = %self.name, "Application stopped");
        Ok(())
    }

    async fn update(&self, cancel: &CancellationToken) -> OsdResult<()> {
        for unit in &self.units {
            self.systemctl(cancel, "restart", unit).await?;
        }
        info!(application = %self.name, "Application updated");
        Ok(())
    }
}

/// Name → factory registry with a generic fallback.
pub struct ApplicationRegistry {
    factories: HashMap<String, ApplicationFactory>,
    fallback: ApplicationFactory,
}

impl Default for ApplicationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationRegistry {
    /// Creates an empty registry that resolves every name to
    /// [`GenericApplication`].
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            fallback: Arc::new(
                |name: &str, _runner: Arc<dyn CommandRunner>| -> Box<dyn Application> {
                    Box::new(GenericApplication::new(name))
                },
            ),
        }
    }

    /// Creates a registry with the built-in applications registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("incus", |name, runner| -> Box<dyn Application> {
            Box::new(ServiceApplication::new(
                name,
                ["incus.socket", "incus.service"],
                runner,
            ))
        });
        registry
    }

    /// Registers (or replaces) the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&str, Arc<dyn CommandRunner>) -> Box<dyn Application> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Returns true if `name` has a dedicated factory.
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Resolves `name` to its handler, falling back to the generic one.
    pub fn load(&self, name: &str, runner: Arc<dyn CommandRunner>) -> Box<dyn Application> {
        let factory = self.factories.get(name).unwrap_or(&self.fallback);
        factory(name, runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn test_unknown_name_uses_fallback() {
        let registry = ApplicationRegistry::with_builtins();
        let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::new());
        let app = registry.load("debug", runner);
        assert_eq!(app.name(), "debug");
        assert!(!registry.is_registered("debug"));
        assert!(registry.is_registered("incus"));
    }

    #[tokio::test]
    async fn test_service_application_unit_order() {
        let scripted = Arc::new(ScriptedRunner::new());
        let registry = ApplicationRegistry::with_builtins();
        let app = registry.load("incus", scripted.clone());
        let cancel = CancellationToken::new();

        app.start(&cancel).await.unwrap();
        app.stop(&cancel).await.unwrap();

        assert_eq!(
            scripted.calls(),
            vec![
                "systemctl start incus.socket",
                "systemctl start incus.service",
                "systemctl stop incus.service",
                "systemctl stop incus.socket",
            ]
        );
    }

    #[tokio::test]
    async fn test_register_overrides() {
        let scripted = Arc::new(ScriptedRunner::new());
        let mut registry = ApplicationRegistry::new();
        registry.register("migration-manager", |name, runner| -> Box<dyn Application> {
            Box::new(ServiceApplication::new(name, ["migration-manager.service"], runner))
        });

        let app = registry.load("migration-manager", scripted.clone());
        app.update(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            scripted.calls(),
            vec!["systemctl restart migration-manager.service"]
        );
    }

    #[tokio::test]
    async fn test_generic_application_runs_nothing() {
        let scripted = Arc::new(ScriptedRunner::new());
        let app = ApplicationRegistry::new().load("anything", scripted.clone());
        let cancel = CancellationToken::new();
        app.start(&cancel).await.unwrap();
        app.update(&cancel).await.unwrap();
        app.stop(&cancel).await.unwrap();
        assert!(scripted.calls().is_empty());
    }
}
