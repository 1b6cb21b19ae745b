use std::sync::Once;

use tracing::{info, warn};
use tracking::Shutdown;

/// Route Ctrl+C to `shutdown`. Only the first call installs a handler.
pub fn install_ctrlc(shutdown: &Shutdown) {
    static CTRL_HANDLER: Once = Once::new();

    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            info!("Stop requested");
            handler_shutdown.request_stop();
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });
}
