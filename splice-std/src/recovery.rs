//! Crash recovery.
//!
//! Handles failures that escaped dispatch containment. A fault attributed to
//! a module costs that module alone. A host fault gets one free automatic
//! restart, tracked by a marker that survives the restart; a second host
//! fault before the marker is cleared wipes every module, disables
//! interception and repairs the install. Crash loops are therefore bounded
//! to two restarts.

use crate::{dispatch::InterceptionSwitch, supervisor::IsolationSupervisor};
use parking_lot::Mutex;
use splice_core::{FaultOrigin, HostFault, Platform, RecoveryError, RecoveryMarker};
use std::{path::PathBuf, sync::Arc};

/// Crash recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Normal operation.
    Running,
    /// A fault is being classified.
    FaultDetected,
    /// A module fault is being contained.
    Quarantining,
    /// A restart has been requested.
    RestartPending,
    /// Interception is off for the rest of the process.
    Terminated,
}

/// What crash recovery did with a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The responsible module was quarantined.
    Quarantined(String),
    /// The fault named a module that is not loaded.
    Ignored,
    /// The first host fault of the session; a restart was requested.
    RestartRequested,
    /// A repeated host fault; every module was removed.
    Terminated,
}

const DISABLED_TITLE: &str = "Modding disabled";
const DISABLED_MESSAGE: &str =
    "The game crashed repeatedly. All mods have been unloaded and modding is disabled.";
const BROKEN_TITLE: &str = "Installation broken";
const BROKEN_MESSAGE: &str =
    "The game installation could not be repaired. The mod host will shut down.";

/// Top-level handler for uncaught faults.
pub struct CrashRecoveryController {
    state: Mutex<RecoveryState>,
    supervisor: Arc<IsolationSupervisor>,
    switch: InterceptionSwitch,
    platform: Arc<dyn Platform>,
    marker: Arc<dyn RecoveryMarker>,
    install_path: PathBuf,
}

impl CrashRecoveryController {
    /// Create a controller in [`RecoveryState::Running`].
    pub fn new(
        supervisor: Arc<IsolationSupervisor>,
        switch: InterceptionSwitch,
        platform: Arc<dyn Platform>,
        marker: Arc<dyn RecoveryMarker>,
        install_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state: Mutex::new(RecoveryState::Running),
            supervisor,
            switch,
            platform,
            marker,
            install_path: install_path.into(),
        }
    }

    /// Current state.
    pub fn state(&self) -> RecoveryState {
        *self.state.lock()
    }

    fn transition(&self, next: RecoveryState) {
        let mut state = self.state.lock();
        tracing::debug!(from = ?*state, to = ?next, "recovery transition");
        *state = next;
    }

    /// Handle an uncaught fault.
    ///
    /// Faults reported after termination are ignored.
    pub fn report(&self, fault: HostFault) -> Result<RecoveryAction, RecoveryError> {
        if self.state() == RecoveryState::Terminated {
            tracing::debug!(error = %fault.source, "fault after termination ignored");
            return Ok(RecoveryAction::Terminated);
        }
        self.transition(RecoveryState::FaultDetected);

        match &fault.origin {
            FaultOrigin::Module(id) => Ok(self.contain_module(id, &fault)),
            FaultOrigin::Host => self.recover_host(&fault),
        }
    }

    fn contain_module(&self, id: &str, fault: &HostFault) -> RecoveryAction {
        let module = self.supervisor.registry().read().get(id).cloned();
        let Some(module) = module else {
            tracing::warn!(module = id, error = %fault.source, "fault from unknown module");
            self.transition(RecoveryState::Running);
            return RecoveryAction::Ignored;
        };

        self.transition(RecoveryState::Quarantining);
        tracing::error!(module = id, error = %fault.source, "module crashed");
        self.supervisor.log_module_error(&module, fault);
        self.supervisor.quarantine([id]);
        self.transition(RecoveryState::Running);
        RecoveryAction::Quarantined(id.to_string())
    }

    fn recover_host(&self, fault: &HostFault) -> Result<RecoveryAction, RecoveryError> {
        tracing::error!(error = %fault.source, "host fault; disabling interception");
        self.switch.disable();

        if !self.marker.is_present() {
            self.transition(RecoveryState::RestartPending);
            if let Err(err) = self.marker.set() {
                // No restart without a marker.
                tracing::error!(error = %err, "could not set recovery marker; restart skipped");
                return Err(err.into());
            }
            self.platform.restart();
            return Ok(RecoveryAction::RestartRequested);
        }

        self.transition(RecoveryState::RestartPending);
        tracing::error!("repeated host fault; unloading all modules");
        let order = self.supervisor.registry().read().order();
        self.supervisor.quarantine(order);
        self.platform.notify(DISABLED_TITLE, DISABLED_MESSAGE);

        let repaired = self.platform.repair(&self.install_path);
        self.transition(RecoveryState::Terminated);
        if !repaired {
            tracing::error!(path = %self.install_path.display(), "repair failed");
            self.platform.notify(BROKEN_TITLE, BROKEN_MESSAGE);
            return Err(RecoveryError::RepairFailed(self.install_path.clone()));
        }
        self.platform.restart();
        Ok(RecoveryAction::Terminated)
    }

    /// Clear the recovery marker after the host started cleanly.
    pub fn startup_complete(&self) -> Result<(), RecoveryError> {
        self.marker.clear()?;
        Ok(())
    }

    /// Get a handle to the interception switch this controller turns off.
    pub fn switch(&self) -> InterceptionSwitch {
        self.switch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hooks::HookRegistry,
        registry::ModuleRegistry,
        testing::{MemoryMarker, MemoryOrderStore, RecordingPlatform, RecordingSink, ScriptedSource},
    };
    use splice_core::{MethodSurface, ModuleOrigin, RecoveryMarker};

    struct Rig {
        controller: CrashRecoveryController,
        supervisor: Arc<IsolationSupervisor>,
        platform: Arc<RecordingPlatform>,
        marker: Arc<MemoryMarker>,
        sink: Arc<RecordingSink>,
        store: Arc<MemoryOrderStore>,
    }

    fn rig(repairable: bool) -> Rig {
        let mut registry =
            ModuleRegistry::new(MethodSurface::new(), 1, Arc::new(HookRegistry::new()));
        registry.load("local", &ScriptedSource::new("local")).unwrap();
        let remote = ScriptedSource::new("remote").with_origin(ModuleOrigin::Remote {
            source: "hub".into(),
        });
        registry.load("remote", &remote).unwrap();

        let store = Arc::new(MemoryOrderStore::new());
        let sink = Arc::new(RecordingSink::new());
        let supervisor = Arc::new(IsolationSupervisor::new(
            registry.into_shared(),
            store.clone(),
            sink.clone(),
        ));
        let platform = Arc::new(RecordingPlatform::new().with_repair_result(repairable));
        let marker = Arc::new(MemoryMarker::new());
        let controller = CrashRecoveryController::new(
            supervisor.clone(),
            InterceptionSwitch::default(),
            platform.clone(),
            marker.clone(),
            "/opt/game",
        );
        Rig {
            controller,
            supervisor,
            platform,
            marker,
            sink,
            store,
        }
    }

    #[test]
    fn module_fault_quarantines_only_that_module() {
        let rig = rig(true);
        let action = rig
            .controller
            .report(HostFault::module("remote", "null reference"))
            .unwrap();

        assert_eq!(action, RecoveryAction::Quarantined("remote".into()));
        assert_eq!(rig.controller.state(), RecoveryState::Running);
        assert_eq!(rig.supervisor.registry().read().order(), vec!["local"]);
        assert_eq!(rig.store.saved(), vec!["local"]);
        assert_eq!(rig.sink.entries().len(), 1);
        assert!(rig.controller.switch().is_enabled());
        assert_eq!(rig.platform.restarts(), 0);
    }

    #[test]
    fn local_module_faults_skip_the_sink() {
        let rig = rig(true);
        rig.controller
            .report(HostFault::module("local", "oops"))
            .unwrap();
        assert!(rig.sink.entries().is_empty());
        assert_eq!(rig.supervisor.registry().read().order(), vec!["remote"]);
    }

    #[test]
    fn unknown_module_fault_is_ignored() {
        let rig = rig(true);
        let action = rig
            .controller
            .report(HostFault::module("ghost", "oops"))
            .unwrap();
        assert_eq!(action, RecoveryAction::Ignored);
        assert_eq!(rig.controller.state(), RecoveryState::Running);
        assert_eq!(rig.supervisor.registry().read().len(), 2);
    }

    #[test]
    fn first_host_fault_restarts_once() {
        let rig = rig(true);
        let action = rig.controller.report(HostFault::host("segfault")).unwrap();

        assert_eq!(action, RecoveryAction::RestartRequested);
        assert_eq!(rig.controller.state(), RecoveryState::RestartPending);
        assert!(rig.marker.is_present());
        assert_eq!(rig.platform.restarts(), 1);
        assert!(!rig.controller.switch().is_enabled());
        assert_eq!(rig.supervisor.registry().read().len(), 2);
    }

    #[test]
    fn repeated_host_fault_wipes_modules() {
        let rig = rig(true);
        rig.marker.set().unwrap();

        let action = rig.controller.report(HostFault::host("segfault")).unwrap();

        assert_eq!(action, RecoveryAction::Terminated);
        assert_eq!(rig.controller.state(), RecoveryState::Terminated);
        assert!(rig.supervisor.registry().read().is_empty());
        assert!(rig.store.saved().is_empty());
        assert_eq!(rig.platform.repairs().len(), 1);
        assert_eq!(rig.platform.restarts(), 1);
        assert_eq!(rig.platform.notifications().len(), 1);
        assert!(!rig.controller.switch().is_enabled());
    }

    #[test]
    fn failed_repair_is_fatal() {
        let rig = rig(false);
        rig.marker.set().unwrap();

        let err = rig.controller.report(HostFault::host("segfault")).unwrap_err();

        assert!(matches!(err, RecoveryError::RepairFailed(_)));
        assert_eq!(rig.controller.state(), RecoveryState::Terminated);
        assert_eq!(rig.platform.restarts(), 0);
        assert_eq!(rig.platform.notifications().len(), 2);
    }

    #[test]
    fn faults_after_termination_are_ignored() {
        let rig = rig(true);
        rig.marker.set().unwrap();
        rig.controller.report(HostFault::host("first")).unwrap();

        let action = rig.controller.report(HostFault::host("second")).unwrap();
        assert_eq!(action, RecoveryAction::Terminated);
        assert_eq!(rig.platform.restarts(), 1);
    }

    #[test]
    fn marker_failure_leaves_restart_pending() {
        let mut rig = rig(true);
        let marker = Arc::new(MemoryMarker::new().failing());
        rig.controller = CrashRecoveryController::new(
            rig.supervisor.clone(),
            InterceptionSwitch::default(),
            rig.platform.clone(),
            marker,
            "/opt/game",
        );

        let err = rig.controller.report(HostFault::host("segfault")).unwrap_err();

        assert!(matches!(err, RecoveryError::Marker(_)));
        assert_eq!(rig.controller.state(), RecoveryState::RestartPending);
        assert_eq!(rig.platform.restarts(), 0);
        assert!(!rig.controller.switch().is_enabled());

        rig.controller
            .report(HostFault::module("remote", "later"))
            .unwrap();
        assert_eq!(rig.controller.state(), RecoveryState::Running);
    }

    #[test]
    fn startup_complete_clears_marker() {
        let rig = rig(true);
        rig.marker.set().unwrap();
        rig.controller.startup_complete().unwrap();
        assert!(!rig.marker.is_present());
    }
}
