//! Location providers.
//!
//! A desktop has no GPS chip, so a fix comes either from configured
//! coordinates or from a helper command that prints `lat,lon` on stdout.

use std::cell::Cell;
use std::io;
use std::process::Stdio;
use std::time::Instant;

use tracing::debug;

use crate::error::LocationError;
use crate::model::Position;
use crate::platform::{CommandExec, LocationOptions, LocationProvider};

/// Always reports the same coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    position: Position,
}

impl FixedLocation {
    pub fn new(position: Position) -> Self {
        Self { position }
    }
}

impl LocationProvider for FixedLocation {
    async fn acquire_location(&self, _options: &LocationOptions) -> Result<Position, LocationError> {
        Ok(self.position)
    }
}

/// Runs a helper command per fix. `RIDEALERT_HIGH_ACCURACY` is set to `1` or
/// `0` in its environment. A fix younger than `maximum_age` is reused.
#[derive(Debug)]
pub struct CommandLocation {
    command: CommandExec,
    last_fix: Cell<Option<(Instant, Position)>>,
}

impl CommandLocation {
    pub fn new(command: CommandExec) -> Self {
        Self {
            command,
            last_fix: Cell::new(None),
        }
    }

    fn cached(&self, options: &LocationOptions) -> Option<Position> {
        let (at, position) = self.last_fix.get()?;
        (at.elapsed() <= options.maximum_age).then_some(position)
    }

    async fn run(&self, options: &LocationOptions) -> Result<Position, LocationError> {
        let mut command = self.command.to_tokio();
        command
            .env(
                "RIDEALERT_HIGH_ACCURACY",
                if options.high_accuracy { "1" } else { "0" },
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let output = match tokio::time::timeout(options.timeout, command.output()).await {
            Ok(result) => result.map_err(|err| spawn_error(&self.command.program, err))?,
            Err(_) => return Err(LocationError::Timeout),
        };

        if !output.status.success() {
            return Err(LocationError::Unavailable(format!(
                "`{}` exited with {}",
                self.command.program, output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Position::parse(text.trim()).ok_or_else(|| {
            LocationError::Unavailable(format!(
                "`{}` printed no valid coordinates",
                self.command.program
            ))
        })
    }
}

fn spawn_error(program: &str, err: io::Error) -> LocationError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => LocationError::PermissionDenied,
        _ => LocationError::Unavailable(format!("failed to run `{}`: {}", program, err)),
    }
}

impl LocationProvider for CommandLocation {
    async fn acquire_location(&self, options: &LocationOptions) -> Result<Position, LocationError> {
        if let Some(position) = self.cached(options) {
            debug!("reusing cached location fix");
            return Ok(position);
        }
        let position = self.run(options).await?;
        self.last_fix.set(Some((Instant::now(), position)));
        Ok(position)
    }
}

/// No provider configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    async fn acquire_location(&self, _options: &LocationOptions) -> Result<Position, LocationError> {
        Err(LocationError::Unavailable(
            "no location provider configured".to_string(),
        ))
    }
}

/// Provider chosen from configuration.
#[derive(Debug)]
pub enum LocationSource {
    Fixed(FixedLocation),
    Command(CommandLocation),
    Unconfigured(NoLocation),
}

impl LocationProvider for LocationSource {
    async fn acquire_location(&self, options: &LocationOptions) -> Result<Position, LocationError> {
        match self {
            LocationSource::Fixed(provider) => provider.acquire_location(options).await,
            LocationSource::Command(provider) => provider.acquire_location(options).await,
            LocationSource::Unconfigured(provider) => provider.acquire_location(options).await,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shell(script: &str) -> CommandExec {
        CommandExec::new("sh").with_args(["-c", script])
    }

    fn options(timeout_ms: u64, max_age_ms: u64) -> LocationOptions {
        LocationOptions {
            high_accuracy: true,
            timeout: Duration::from_millis(timeout_ms),
            maximum_age: Duration::from_millis(max_age_ms),
        }
    }

    #[tokio::test]
    async fn test_fixed_location() {
        let provider = FixedLocation::new(Position::new(12.9716, 77.5946));
        assert_eq!(
            provider
                .acquire_location(&LocationOptions::default())
                .await
                .unwrap(),
            Position::new(12.9716, 77.5946)
        );
    }

    #[tokio::test]
    async fn test_command_location_parses_output() {
        let provider = CommandLocation::new(shell("echo 12.9716,77.5946"));
        let position = provider.acquire_location(&options(5_000, 0)).await.unwrap();
        assert_eq!(position, Position::new(12.9716, 77.5946));
    }

    #[tokio::test]
    async fn test_command_location_passes_accuracy_hint() {
        let provider = CommandLocation::new(shell(
            r#"if [ "$RIDEALERT_HIGH_ACCURACY" = "1" ]; then echo 1,1; else echo 2,2; fi"#,
        ));
        let position = provider.acquire_location(&options(5_000, 0)).await.unwrap();
        assert_eq!(position, Position::new(1.0, 1.0));
    }

    #[tokio::test]
    async fn test_command_location_timeout() {
        let provider = CommandLocation::new(shell("sleep 5; echo 1,1"));
        let err = provider
            .acquire_location(&options(100, 0))
            .await
            .unwrap_err();
        assert_eq!(err, LocationError::Timeout);
    }

    #[tokio::test]
    async fn test_command_location_failure_is_unavailable() {
        let provider = CommandLocation::new(shell("exit 3"));
        assert!(matches!(
            provider.acquire_location(&options(5_000, 0)).await,
            Err(LocationError::Unavailable(_))
        ));

        let garbage = CommandLocation::new(shell("echo somewhere"));
        assert!(matches!(
            garbage.acquire_location(&options(5_000, 0)).await,
            Err(LocationError::Unavailable(_))
        ));

        let missing = CommandLocation::new(CommandExec::new("ridealert-no-such-helper"));
        assert!(matches!(
            missing.acquire_location(&options(5_000, 0)).await,
            Err(LocationError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_command_location_reuses_recent_fix() {
        let dir = tempfile::TempDir::new().unwrap();
        let counter = dir.path().join("count");
        let script = format!(
            "echo x >> '{}'; echo 1,2",
            counter.display()
        );
        let provider = CommandLocation::new(shell(&script));

        provider.acquire_location(&options(5_000, 60_000)).await.unwrap();
        provider.acquire_location(&options(5_000, 60_000)).await.unwrap();
        let runs = std::fs::read_to_string(&counter).unwrap().lines().count();
        assert_eq!(runs, 1);

        provider.acquire_location(&options(5_000, 0)).await.unwrap();
        let runs = std::fs::read_to_string(&counter).unwrap().lines().count();
        assert_eq!(runs, 2);
    }

    #[tokio::test]
    async fn test_no_location_is_unavailable() {
        assert!(matches!(
            NoLocation
                .acquire_location(&LocationOptions::default())
                .await,
            Err(LocationError::Unavailable(_))
        ));
    }
}
