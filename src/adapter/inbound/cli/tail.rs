//! Handler for `pkgstream tail`.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::command::TailArgs;
use super::output;
use crate::application::consumer::{ConnectionState, ConsumerSnapshot};
use crate::domain::PackageFrame;
use crate::error::{Error, Result};
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::settings::Config;

/// Follow the relay until Ctrl-C or until the consumer gives up.
pub async fn execute(config: &Config, args: &TailArgs) -> Result<()> {
    let handle = bootstrap::spawn_consumer(config, args.endpoint.as_deref(), args.from_sequence)?;
    let mut packages = handle.subscribe();
    let mut status = handle.watch();
    let mut last = status.borrow().clone();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            received = packages.recv() => match received {
                Ok(frame) => {
                    let (timestamp, sequence, label) = render(&frame);
                    output::package(&timestamp, &sequence, &label);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output fell behind; packages dropped from display");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let snapshot = status.borrow_and_update().clone();
                if snapshot.state == last.state && snapshot.status_message == last.status_message {
                    continue;
                }
                last = snapshot.clone();
                output::status(snapshot.state.as_str(), snapshot.status_message.as_deref());
                if snapshot.state == ConnectionState::Failed {
                    break Err(failure(&snapshot));
                }
            }
        }
    };

    let snapshot = handle.status();
    handle.close().await;

    if let Some(sequence) = snapshot.last_sequence {
        output::field("Resume with", format!("--from-sequence {sequence}"));
    }
    output::field("Received", snapshot.packages_received);
    output::field("Duplicates", snapshot.duplicates_filtered);

    outcome
}

fn failure(snapshot: &ConsumerSnapshot) -> Error {
    Error::Connection(
        snapshot
            .status_message
            .clone()
            .unwrap_or_else(|| "consumer gave up".to_string()),
    )
}

/// Display columns of one package: `HH:MM:SS`, `#000123`, `npm left-pad@1.0.0`.
#[must_use]
pub fn render(frame: &PackageFrame) -> (String, String, String) {
    let timestamp = frame
        .timestamp
        .and_then(|millis| i64::try_from(millis).ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(|| "--:--:--".to_string(), |at| at.format("%H:%M:%S").to_string());

    let sequence = frame
        .sequence_number
        .map_or_else(|| "#------".to_string(), |seq| format!("#{seq:06}"));

    let event = &frame.event;
    let label = format!(
        "{} {}@{}",
        event.ecosystem(),
        event.package.name,
        event.version
    );

    (timestamp, sequence, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PackageEvent;

    #[test]
    fn test_render_full_frame() {
        let frame = PackageFrame {
            event: PackageEvent::new("ECOSYSTEM_NPM", "left-pad", "1.0.0"),
            // 2024-01-01T12:34:56Z
            timestamp: Some(1_704_112_496_000),
            sequence_number: Some(123),
        };

        let (timestamp, sequence, label) = render(&frame);
        assert_eq!(timestamp, "12:34:56");
        assert_eq!(sequence, "#000123");
        assert_eq!(label, "npm left-pad@1.0.0");
    }

    #[test]
    fn test_render_without_position() {
        let frame = PackageFrame {
            event: PackageEvent::new("pypi", "requests", "2.32.0"),
            timestamp: None,
            sequence_number: None,
        };

        let (timestamp, sequence, label) = render(&frame);
        assert_eq!(timestamp, "--:--:--");
        assert_eq!(sequence, "#------");
        assert_eq!(label, "pypi requests@2.32.0");
    }
}
