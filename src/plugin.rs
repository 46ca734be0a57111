//! Plugins and the registry that loads them.
//!
//! A plugin is a group of commands with a shared check. Plugins are compiled
//! in and described by an [`Extension`] entry: a package-qualified name plus a
//! constructor. Loading runs the constructor; reloading swaps in a fresh
//! instance, which resets any per-instance state.

use std::sync::Arc;

use async_lock::RwLock;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::{CommandError, PluginError};
use crate::framework::{CommandSpec, Context};

#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Display name, e.g. `SuperUser`.
    fn name(&self) -> &'static str;

    fn commands(&self) -> &'static [CommandSpec];

    /// The plugin's own source file, for inspection.
    fn source(&self) -> &'static str;

    /// Gate applied to every command of the plugin.
    async fn check(&self, _ctx: &Context) -> bool {
        true
    }

    /// Run `command` (a canonical name from [`Plugin::commands`]).
    async fn invoke(
        &self,
        command: &'static str,
        ctx: Context,
        args: &str,
    ) -> Result<(), CommandError>;
}

/// A compiled-in plugin entry.
#[derive(Clone, Copy)]
pub struct Extension {
    /// Package-qualified name, e.g. `yami.plugins.superuser`.
    pub name: &'static str,
    pub load: fn() -> Result<Arc<dyn Plugin>, PluginError>,
}

impl Extension {
    /// Last path segment of the qualified name.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit('.').next().unwrap_or(self.name)
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension").field("name", &self.name).finish()
    }
}

struct Loaded {
    extension: &'static str,
    plugin: Arc<dyn Plugin>,
}

/// The set of loaded plugins, in load order.
#[derive(Default)]
pub struct PluginRegistry {
    loaded: RwLock<Vec<Loaded>>,
}

fn clashing_name(loaded: &[Loaded], skip: &str, plugin: &dyn Plugin) -> Option<&'static str> {
    plugin
        .commands()
        .iter()
        .flat_map(CommandSpec::all_names)
        .find(|name| {
            loaded
                .iter()
                .filter(|l| l.extension != skip)
                .flat_map(|l| l.plugin.commands())
                .any(|spec| spec.matches(name))
        })
}

impl PluginRegistry {
    pub async fn load_extension(&self, extension: &Extension) -> Result<(), PluginError> {
        let mut loaded = self.loaded.write().await;
        if loaded.iter().any(|l| l.extension == extension.name) {
            return Err(PluginError::AlreadyLoaded(extension.name.to_string()));
        }

        let plugin = (extension.load)()?;
        if let Some(command) = clashing_name(&loaded, extension.name, plugin.as_ref()) {
            return Err(PluginError::CommandClash {
                extension: extension.name.to_string(),
                command: command.to_string(),
            });
        }

        info!(extension = extension.name, plugin = plugin.name(), "loaded extension");
        loaded.push(Loaded {
            extension: extension.name,
            plugin,
        });
        Ok(())
    }

    /// Replace a loaded extension with a fresh instance. The old instance
    /// stays in place if construction fails.
    pub async fn reload_extension(&self, extension: &Extension) -> Result<(), PluginError> {
        let mut loaded = self.loaded.write().await;
        let Some(index) = loaded.iter().position(|l| l.extension == extension.name) else {
            return Err(PluginError::NotLoaded(extension.name.to_string()));
        };

        let plugin = (extension.load)()?;
        if let Some(command) = clashing_name(&loaded, extension.name, plugin.as_ref()) {
            return Err(PluginError::CommandClash {
                extension: extension.name.to_string(),
                command: command.to_string(),
            });
        }

        info!(extension = extension.name, "reloaded extension");
        loaded[index].plugin = plugin;
        Ok(())
    }

    pub async fn unload_extension(&self, name: &str) -> Result<(), PluginError> {
        let mut loaded = self.loaded.write().await;
        let before = loaded.len();
        loaded.retain(|l| l.extension != name);
        if loaded.len() == before {
            return Err(PluginError::NotLoaded(name.to_string()));
        }
        info!(extension = name, "unloaded extension");
        Ok(())
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().await.iter().any(|l| l.extension == name)
    }

    /// Load every extension of `manifest`, reloading those already loaded.
    ///
    /// `enabled` restricts the set by qualified or short name. Failures are
    /// logged and skipped. Returns how many extensions ended up (re)loaded.
    pub async fn load_and_reload_extensions(
        &self,
        manifest: &[Extension],
        enabled: Option<&[String]>,
    ) -> usize {
        let mut count = 0;
        for extension in manifest {
            if let Some(enabled) = enabled {
                let wanted = enabled
                    .iter()
                    .any(|n| n == extension.name || n == extension.short_name());
                if !wanted {
                    continue;
                }
            }

            let result = if self.is_loaded(extension.name).await {
                self.reload_extension(extension).await
            } else {
                self.load_extension(extension).await
            };
            match result {
                Ok(()) => count += 1,
                Err(e) => error!(extension = extension.name, error = %e, "failed to load extension"),
            }
        }

        if count == 0 {
            warn!("no extensions loaded");
        }
        count
    }

    /// Find a plugin by display name or short extension name,
    /// case-insensitively.
    pub async fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.loaded
            .read()
            .await
            .iter()
            .find(|l| {
                l.plugin.name().eq_ignore_ascii_case(name)
                    || l.extension
                        .rsplit('.')
                        .next()
                        .is_some_and(|short| short.eq_ignore_ascii_case(name))
            })
            .map(|l| Arc::clone(&l.plugin))
    }

    /// Find the command registered under `name` or one of its aliases.
    pub async fn get_command(&self, name: &str) -> Option<(Arc<dyn Plugin>, CommandSpec)> {
        let loaded = self.loaded.read().await;
        loaded.iter().find_map(|l| {
            l.plugin
                .commands()
                .iter()
                .find(|spec| spec.matches(name))
                .map(|spec| (Arc::clone(&l.plugin), *spec))
        })
    }

    /// Qualified names of loaded extensions, in load order.
    pub async fn extension_names(&self) -> Vec<&'static str> {
        self.loaded.read().await.iter().map(|l| l.extension).collect()
    }

    /// Display names of loaded plugins, in load order.
    pub async fn plugin_names(&self) -> Vec<&'static str> {
        self.loaded.read().await.iter().map(|l| l.plugin.name()).collect()
    }
}
