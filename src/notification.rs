//! Desktop notifications
//!
//! Sent via notify-rust after a layout was applied, when `settings.notify` is on.

use color_eyre::eyre::{Context, Result};
use notify_rust::Notification;
use tracing::warn;

use crate::config::{AudioSettings, LayoutDisplays};

/// Send a desktop notification
///
/// # Errors
/// Returns an error if the notification cannot be sent (e.g., no notification daemon running).
pub fn send_notification(summary: &str, body: &str, icon: &str) -> Result<()> {
    Notification::new()
        .summary(summary)
        .body(body)
        .appname("deskmode")
        .icon(icon)
        .timeout(3000)
        .show()
        .context("Failed to show notification")?;

    Ok(())
}

/// Icon for a layout: a TV for audio routed to HDMI/TV, a monitor otherwise
#[must_use]
pub fn layout_icon(audio: &AudioSettings) -> &'static str {
    let output = audio.output.as_deref().unwrap_or_default().to_lowercase();
    if output.contains("tv") || output.contains("hdmi") {
        "video-television"
    } else {
        "video-display"
    }
}

/// Body text listing the displays turned on
#[must_use]
pub fn layout_body(name: &str, displays: &LayoutDisplays) -> String {
    let enabled: Vec<&str> = displays
        .iter()
        .filter(|(_, s)| s.enabled == Some(true))
        .map(|(key, _)| key)
        .collect();
    if enabled.is_empty() {
        name.to_string()
    } else {
        format!("{name}: {}", enabled.join(" + "))
    }
}

/// Announce an applied layout; failures are only logged
pub fn notify_applied(name: &str, displays: &LayoutDisplays, audio: &AudioSettings) {
    if let Err(e) = send_notification("Layout applied", &layout_body(name, displays), layout_icon(audio)) {
        warn!("{:#}", e);
    }
}
