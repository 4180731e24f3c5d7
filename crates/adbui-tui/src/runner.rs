//! Main TUI runner - terminal lifecycle and event loop

use adbui_app::Engine;
use adbui_core::prelude::*;

use crate::{event, render, terminal};

/// Run the interactive UI until the user quits or a signal arrives
///
/// The engine's background tasks are stopped and the terminal restored on
/// every exit path, including a draw or input error.
pub async fn run(mut engine: Engine) -> Result<()> {
    terminal::install_panic_hook();
    let mut term = ratatui::init();

    engine.state.log_info("adbui started");
    let result = run_loop(&mut term, &mut engine);

    engine.shutdown().await;
    ratatui::restore();

    result.context("TUI loop failed")
}

/// Main event loop
fn run_loop(terminal: &mut ratatui::DefaultTerminal, engine: &mut Engine) -> Result<()> {
    while !engine.should_quit() {
        // Signal handler, command completions
        engine.drain_pending_messages();

        // Reconciler output
        engine.sync_registry();

        terminal.draw(|frame| render::view(frame, &engine.state))?;

        if let Some(message) = event::poll()? {
            engine.process_message(message);
        }
    }
    Ok(())
}
