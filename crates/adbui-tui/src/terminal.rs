//! Terminal setup and restoration

/// Install a panic hook that restores the terminal before the report prints
///
/// Chains onto whatever hook is already installed (color-eyre's, in the
/// binary), so the report stays readable instead of landing in raw mode.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        ratatui::restore();
        previous(info);
    }));
}
