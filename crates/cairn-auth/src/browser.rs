//! Opening the authorization URL in the user's browser.

use std::process::Command;

use crate::errors::{AuthError, Result};

/// Opens a URL for the user.
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`. Returning an error is not fatal to sign-in; the URL is
    /// also logged so the user can open it by hand.
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform's default browser.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            let _ = c.arg(url);
            c
        } else if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            let _ = c.args(["/C", "start", "", url]);
            c
        } else {
            let mut c = Command::new("xdg-open");
            let _ = c.arg(url);
            c
        };
        let mut child = command
            .spawn()
            .map_err(|e| AuthError::Browser(e.to_string()))?;
        // Reap the launcher process without blocking the caller.
        let _ = std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}
