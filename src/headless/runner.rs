//! Headless mode runner - engine loop without a terminal

use std::io::BufRead;
use std::time::Duration;

use adbui_app::registry::now;
use adbui_app::{Engine, Message};
use adbui_core::prelude::*;
use adbui_core::{BridgeHealth, DeviceView};
use tokio::sync::mpsc;

use super::HeadlessEvent;

/// How often the registry is checked for changes between messages
const SYNC_INTERVAL: Duration = Duration::from_millis(100);

/// Run until stdin says `quit` or a signal arrives
pub async fn run_headless(mut engine: Engine) -> Result<()> {
    info!("adbui starting in headless mode");

    let stdin_tx = engine.msg_sender();
    std::thread::spawn(move || read_stdin_commands(stdin_tx));

    let result = event_loop(&mut engine).await;
    engine.shutdown().await;

    info!("adbui headless mode exiting");
    result
}

async fn event_loop(engine: &mut Engine) -> Result<()> {
    let mut ticker = tokio::time::interval(SYNC_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_health: Option<BridgeHealth> = None;

    while !engine.should_quit() {
        let msg = tokio::select! {
            msg = engine.msg_rx.recv() => match msg {
                Some(msg) => Some(msg),
                None => {
                    info!("Message channel closed");
                    break;
                }
            },
            _ = ticker.tick() => None,
        };

        if let Some(msg) = msg {
            engine.process_message(msg);
        }

        emit_changes(engine, &mut last_health);
    }

    Ok(())
}

/// Emit device, health and log events for whatever changed since last call
fn emit_changes(engine: &mut Engine, last_health: &mut Option<BridgeHealth>) {
    if engine.sync_registry() {
        let at = now();
        let devices = engine
            .state
            .devices
            .iter()
            .map(|record| DeviceView::from_record(record, at))
            .collect();
        HeadlessEvent::devices(devices).emit();

        if last_health.as_ref() != Some(&engine.state.bridge_health) {
            *last_health = Some(engine.state.bridge_health.clone());
            HeadlessEvent::bridge_health(engine.state.bridge_health.clone()).emit();
        }
    }

    // Headless owns the log buffer, so emitted lines are simply dropped
    for line in engine.state.logs.drain(..) {
        HeadlessEvent::log(line.level, line.message).emit();
    }
}

/// Blocking stdin reader; one command per line
fn read_stdin_commands(msg_tx: mpsc::Sender<Message>) {
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let msg = match line.trim() {
            "" => continue,
            "r" | "refresh" => Message::Refresh,
            "K" | "restart" => Message::RestartServer,
            "D" | "disconnect-all" => Message::DisconnectAll,
            "q" | "quit" => Message::Quit,
            other => {
                warn!("Unknown stdin command: {}", other);
                continue;
            }
        };

        let quit = msg == Message::Quit;
        if msg_tx.blocking_send(msg).is_err() || quit {
            break;
        }
    }

    debug!("Stdin reader exiting");
}
