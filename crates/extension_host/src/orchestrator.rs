//! Startup and shutdown sequencing for services and extensions.

use crate::context::HostServices;
use crate::error::HostError;
use crate::loader::ExtensionLoader;
use crate::service::{InternalService, ServiceState};
use crate::settings::ExtensionSettings;
use crate::unit::{panic_to_error, ExtensionUnit, LoadState};
use bulwark_api::{
    current_timestamp, ExtensionsLoadedEvent, ExtensionsUnloadedEvent, EXTENSIONS_LOADED,
    EXTENSIONS_UNLOADED,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

/// Host-level switches that are not part of any persisted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Keep starting later services after one fails to load.
    pub services_continue_on_error: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            services_continue_on_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    Stopped,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Started => "started",
            Phase::Stopped => "stopped",
        }
    }
}

struct ServiceSlot {
    service: Box<dyn InternalService>,
    state: ServiceState,
    last_error: Option<String>,
}

/// What `start` managed to bring up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
}

/// Drives the host lifecycle from a single owner.
///
/// Startup loads services by ascending launch index, then discovers and
/// loads extensions, then emits `core:extensions_loaded`. Shutdown reverses
/// it and finally saves the extension manager settings.
pub struct Orchestrator {
    services: HostServices,
    config: OrchestratorConfig,
    loader: Box<dyn ExtensionLoader>,
    slots: Vec<ServiceSlot>,
    extensions: Vec<ExtensionUnit>,
    settings: ExtensionSettings,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(
        services: HostServices,
        loader: Box<dyn ExtensionLoader>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            services,
            config,
            loader,
            slots: Vec::new(),
            extensions: Vec::new(),
            settings: ExtensionSettings::default(),
            phase: Phase::Idle,
        }
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    pub fn settings(&self) -> &ExtensionSettings {
        &self.settings
    }

    /// Adds an internal service. Names must be unique; registration is only
    /// possible before `start`.
    pub fn register_service(
        &mut self,
        service: impl InternalService + 'static,
    ) -> Result<(), HostError> {
        self.expect_phase(Phase::Idle)?;
        if self.slots.iter().any(|slot| slot.service.name() == service.name()) {
            return Err(HostError::DuplicateService(service.name().to_string()));
        }
        self.slots.push(ServiceSlot {
            service: Box::new(service),
            state: ServiceState::Unstarted,
            last_error: None,
        });
        Ok(())
    }

    /// Loads every service and extension.
    ///
    /// Fails with `StartupAborted` when a service fails and
    /// `services_continue_on_error` is off; services that already started
    /// stay running until [`shutdown`](Self::shutdown).
    pub async fn start(&mut self) -> Result<StartupReport, HostError> {
        self.expect_phase(Phase::Idle)?;
        self.phase = Phase::Started;

        // Stable, so equal launch indices keep registration order.
        self.slots.sort_by_key(|slot| slot.service.launch_index());
        self.start_services().await?;

        self.settings = match ExtensionSettings::load(self.services.store.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to load extension manager settings, using defaults: {}", e);
                ExtensionSettings::default()
            }
        };

        let report = self.load_extensions().await;

        if let Err(e) = self
            .services
            .events
            .emit_core(
                EXTENSIONS_LOADED,
                &ExtensionsLoadedEvent {
                    loaded: report.loaded.clone(),
                    failed: report.failed.clone(),
                    timestamp: current_timestamp(),
                },
            )
            .await
        {
            warn!("Failed to emit {}: {}", EXTENSIONS_LOADED, e);
        }

        info!(
            "Startup complete: {} extension(s) loaded, {} failed",
            report.loaded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn start_services(&mut self) -> Result<(), HostError> {
        for slot in &mut self.slots {
            let name = slot.service.name().to_string();
            slot.state = ServiceState::Loading;
            info!(
                "Loading service {} (launch index {})",
                name,
                slot.service.launch_index()
            );

            let outcome = AssertUnwindSafe(slot.service.load(&self.services))
                .catch_unwind()
                .await;
            let reason = match outcome {
                Ok(Ok(())) => {
                    slot.state = ServiceState::Running;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_to_error(panic).to_string(),
            };

            error!("Service {} failed to load: {}", name, reason);
            slot.state = ServiceState::Failed;
            slot.last_error = Some(reason.clone());
            if !self.config.services_continue_on_error {
                return Err(HostError::StartupAborted {
                    service: name,
                    reason,
                });
            }
        }
        Ok(())
    }

    async fn load_extensions(&mut self) -> StartupReport {
        let mut report = StartupReport::default();

        match self.loader.load_libraries().await {
            Ok(_) => {}
            Err(e) => error!("Failed to load support libraries: {}", e),
        }

        let discovered = match self.loader.discover().await {
            Ok(discovered) => discovered,
            Err(e) => {
                error!("Extension discovery failed: {}", e);
                return report;
            }
        };
        info!("Discovered {} extension(s)", discovered.len());

        for found in discovered {
            let loaded = match self.loader.instantiate(&found) {
                Ok(instance) => {
                    let mut unit = ExtensionUnit::new(&found, instance);
                    if unit.state() == LoadState::LoadFailed {
                        report.failed.push(unit.name().to_string());
                        self.extensions.push(unit);
                        false
                    } else if self.extension(unit.name()).is_some() {
                        error!(
                            "Extension {} from {} is already loaded, skipping",
                            unit.name(),
                            found.source.display()
                        );
                        report.failed.push(unit.name().to_string());
                        false
                    } else {
                        let loaded = unit.load(&self.services).await;
                        if loaded {
                            report.loaded.push(unit.name().to_string());
                        } else {
                            report.failed.push(unit.name().to_string());
                        }
                        self.extensions.push(unit);
                        loaded
                    }
                }
                Err(e) => {
                    error!("Failed to instantiate extension {}: {}", found.name, e);
                    report.failed.push(found.name.clone());
                    false
                }
            };

            if !loaded && !self.settings.continue_on_error {
                warn!("Not loading further extensions after a failure (ContinueOnError is off)");
                break;
            }
        }
        report
    }

    /// Unloads extensions, then running services in reverse launch order,
    /// then saves the extension manager settings.
    pub async fn shutdown(&mut self) -> Result<(), HostError> {
        self.expect_phase(Phase::Started)?;
        self.phase = Phase::Stopped;

        let mut unloaded = Vec::new();
        for unit in self.extensions.iter_mut().rev() {
            if unit.state() == LoadState::Loaded {
                unit.unload(&self.services).await;
                unloaded.push(unit.name().to_string());
            }
        }

        if let Err(e) = self
            .services
            .events
            .emit_core(
                EXTENSIONS_UNLOADED,
                &ExtensionsUnloadedEvent {
                    unloaded,
                    timestamp: current_timestamp(),
                },
            )
            .await
        {
            warn!("Failed to emit {}: {}", EXTENSIONS_UNLOADED, e);
        }

        for slot in self.slots.iter_mut().rev() {
            if slot.state != ServiceState::Running {
                continue;
            }
            let name = slot.service.name().to_string();
            slot.state = ServiceState::Unloading;
            info!("Unloading service {}", name);

            let outcome = AssertUnwindSafe(slot.service.unload(&self.services))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(panic_to_error(panic).to_string()),
            };
            if let Some(reason) = failure {
                error!("Service {} failed to unload: {}", name, reason);
                slot.last_error = Some(reason);
            }
            slot.state = ServiceState::Stopped;
        }

        if let Err(e) = self.settings.save(self.services.store.as_ref()) {
            error!("Failed to save extension manager settings: {}", e);
        }
        info!("Shutdown complete");
        Ok(())
    }

    pub fn extension(&self, name: &str) -> Option<&ExtensionUnit> {
        self.extensions.iter().find(|unit| unit.name() == name)
    }

    pub fn extensions(&self) -> &[ExtensionUnit] {
        &self.extensions
    }

    pub fn extension_states(&self) -> Vec<(String, LoadState)> {
        self.extensions
            .iter()
            .map(|unit| (unit.name().to_string(), unit.state()))
            .collect()
    }

    /// Service states in current load order.
    pub fn service_states(&self) -> Vec<(String, ServiceState)> {
        self.slots
            .iter()
            .map(|slot| (slot.service.name().to_string(), slot.state))
            .collect()
    }

    pub fn service_error(&self, name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|slot| slot.service.name() == name)
            .and_then(|slot| slot.last_error.as_deref())
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), HostError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(HostError::InvalidState {
                expected: expected.as_str(),
                actual: self.phase.as_str(),
            })
        }
    }
}
