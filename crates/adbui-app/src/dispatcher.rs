//! Command Dispatcher - serialized pair/connect/disconnect/restart
//!
//! Per-device commands claim the device through the registry's command
//! token before touching adb; a second command on the same device fails
//! with `Busy` and does nothing. Global commands (server restart,
//! disconnect-all) hold a dispatcher-wide write lock, and while one runs
//! every per-device command fails fast with `ServerRestarting`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adbui_core::prelude::*;
use adbui_core::{CommandKind, CommandToken, DeviceIdentity, DeviceRecord, LastError};
use adbui_daemon::BridgeClient;
use tokio::sync::{oneshot, RwLock};

use crate::reconcile::{self, CommandEffect};
use crate::registry::{now, DeviceRegistry, ReleaseOutcome};

/// Hard deadline per adapter call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeouts {
    pub pair: Duration,
    pub connect: Duration,
    pub disconnect: Duration,
    pub restart: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            pair: Duration::from_secs(10),
            connect: Duration::from_secs(10),
            disconnect: Duration::from_secs(5),
            restart: Duration::from_secs(5),
        }
    }
}

/// A user-initiated operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pair {
        identity: DeviceIdentity,
        code: String,
    },
    Connect {
        identity: DeviceIdentity,
    },
    Disconnect {
        identity: DeviceIdentity,
    },
    RestartServer,
    DisconnectAll,
}

impl Command {
    pub fn describe(&self) -> String {
        match self {
            Command::Pair { identity, .. } => format!("pair {}", identity),
            Command::Connect { identity } => format!("connect {}", identity),
            Command::Disconnect { identity } => format!("disconnect {}", identity),
            Command::RestartServer => "restart adb server".to_string(),
            Command::DisconnectAll => "disconnect all".to_string(),
        }
    }
}

/// UI-facing submission boundary
///
/// The caller never waits on the command itself; the receiver resolves
/// once the outcome is already visible in the registry.
pub trait CommandSubmitter: Send + Sync {
    fn submit(&self, command: Command) -> oneshot::Receiver<Result<()>>;
}

/// Releases the device as `Abandoned` if the command future is dropped
struct LeaseGuard<'a> {
    registry: &'a DeviceRegistry,
    identity: DeviceIdentity,
    token: CommandToken,
    armed: bool,
}

impl LeaseGuard<'_> {
    fn release(mut self, outcome: ReleaseOutcome) {
        self.armed = false;
        self.registry
            .release_command(&self.identity, self.token, outcome);
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry
                .release_command(&self.identity, self.token, ReleaseOutcome::Abandoned);
        }
    }
}

/// Clears the global-operation flag on every exit path
struct GlobalFlagGuard<'a>(&'a AtomicBool);

impl Drop for GlobalFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct CommandDispatcher<C> {
    client: Arc<C>,
    registry: Arc<DeviceRegistry>,
    timeouts: CommandTimeouts,
    global: Arc<RwLock<()>>,
    global_active: Arc<AtomicBool>,
}

impl<C> Clone for CommandDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            registry: self.registry.clone(),
            timeouts: self.timeouts,
            global: self.global.clone(),
            global_active: self.global_active.clone(),
        }
    }
}

impl<C> CommandDispatcher<C>
where
    C: BridgeClient + Send + Sync + 'static,
{
    pub fn new(client: Arc<C>, registry: Arc<DeviceRegistry>, timeouts: CommandTimeouts) -> Self {
        Self {
            client,
            registry,
            timeouts,
            global: Arc::new(RwLock::new(())),
            global_active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Pair { identity, code } => self.pair(&identity, &code).await,
            Command::Connect { identity } => self.connect(&identity).await,
            Command::Disconnect { identity } => self.disconnect(&identity).await,
            Command::RestartServer => self.restart_server().await,
            Command::DisconnectAll => self.disconnect_all().await,
        }
    }

    pub async fn pair(&self, identity: &DeviceIdentity, code: &str) -> Result<()> {
        let code = code.to_string();
        self.run_device_command(identity, CommandKind::Pair, self.timeouts.pair, |record| {
            let address = record.pairing_address.clone().ok_or_else(|| {
                Error::not_found(format!("{} is not in pairing mode", record.display_name()))
            })?;
            let identity = record.identity.clone();
            let client = self.client.clone();
            Ok(async move {
                client.pair(&address, &code).await?;
                Ok(CommandEffect::Paired { identity })
            })
        })
        .await
    }

    pub async fn connect(&self, identity: &DeviceIdentity) -> Result<()> {
        self.run_device_command(
            identity,
            CommandKind::Connect,
            self.timeouts.connect,
            |record| {
                let address = record.identity.address.clone().ok_or_else(|| {
                    Error::not_found(format!("no address known for {}", record.display_name()))
                })?;
                let identity = record.identity.clone();
                let client = self.client.clone();
                Ok(async move {
                    client.connect(&address).await?;
                    Ok(CommandEffect::Connected { identity, address })
                })
            },
        )
        .await
    }

    pub async fn disconnect(&self, identity: &DeviceIdentity) -> Result<()> {
        self.run_device_command(
            identity,
            CommandKind::Disconnect,
            self.timeouts.disconnect,
            |record| {
                let target = record
                    .identity
                    .serial
                    .clone()
                    .or_else(|| record.identity.address.as_ref().map(ToString::to_string))
                    .ok_or_else(|| {
                        Error::not_found(format!("{} has no adb target", record.display_name()))
                    })?;
                let identity = record.identity.clone();
                let client = self.client.clone();
                Ok(async move {
                    client.disconnect(&target).await?;
                    Ok(CommandEffect::Disconnected { identity })
                })
            },
        )
        .await
    }

    pub async fn restart_server(&self) -> Result<()> {
        let client = self.client.clone();
        self.run_global_command(
            "restart-server",
            self.timeouts.restart,
            async move { client.restart_server().await },
            CommandEffect::ServerRestarted,
        )
        .await
    }

    pub async fn disconnect_all(&self) -> Result<()> {
        let client = self.client.clone();
        self.run_global_command(
            "disconnect",
            self.timeouts.disconnect,
            async move { client.disconnect_all().await },
            CommandEffect::AllDisconnected,
        )
        .await
    }

    /// Acquire, run under a deadline, release exactly once, apply the effect
    ///
    /// `prepare` sees the record as of acquisition and builds the adapter
    /// call. Busy and restart conflicts return before anything is touched.
    async fn run_device_command<F, Fut>(
        &self,
        identity: &DeviceIdentity,
        kind: CommandKind,
        deadline: Duration,
        prepare: F,
    ) -> Result<()>
    where
        F: FnOnce(&DeviceRecord) -> Result<Fut>,
        Fut: std::future::Future<Output = Result<CommandEffect>>,
    {
        if self.global_active.load(Ordering::SeqCst) {
            return Err(Error::ServerRestarting);
        }
        let Ok(_shared) = self.global.try_read() else {
            return Err(Error::ServerRestarting);
        };

        let lease = self.registry.try_acquire_command(identity, kind, now())?;
        let guard = LeaseGuard {
            registry: &self.registry,
            identity: lease.record.identity.clone(),
            token: lease.token,
            armed: true,
        };

        info!("{} {}", kind, lease.record.display_name());

        let result = match prepare(&lease.record) {
            Ok(call) => match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(kind.to_string(), deadline)),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(effect) => {
                guard.release(ReleaseOutcome::Succeeded);
                reconcile::apply_command_effect(&self.registry, effect, now());
                info!("{} {} succeeded", kind, lease.record.display_name());
                Ok(())
            }
            Err(e) => {
                warn!("{} {} failed: {}", kind, lease.record.display_name(), e);
                guard.release(ReleaseOutcome::Failed(LastError::from_error(&e)));
                Err(e)
            }
        }
    }

    async fn run_global_command<Fut>(
        &self,
        operation: &str,
        deadline: Duration,
        call: Fut,
        effect: CommandEffect,
    ) -> Result<()>
    where
        Fut: std::future::Future<Output = Result<()>>,
    {
        if self.global_active.swap(true, Ordering::SeqCst) {
            return Err(Error::ServerRestarting);
        }
        let _flag = GlobalFlagGuard(&self.global_active);

        // Waits for per-device commands already past their check
        let _exclusive = self.global.write().await;
        info!("adb {}", operation);

        let result = match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation, deadline)),
        };

        match result {
            Ok(()) => {
                self.registry.set_global_error(None);
                reconcile::apply_command_effect(&self.registry, effect, now());
                info!("adb {} succeeded", operation);
                Ok(())
            }
            Err(e) => {
                warn!("adb {} failed: {}", operation, e);
                self.registry.set_global_error(Some(LastError::from_error(&e)));
                Err(e)
            }
        }
    }
}

impl<C> CommandSubmitter for CommandDispatcher<C>
where
    C: BridgeClient + Send + Sync + 'static,
{
    fn submit(&self, command: Command) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let result = dispatcher.execute(command).await;
            let _ = tx.send(result);
        });
        rx
    }
}
