//! Host capabilities the alert pipeline depends on.
//!
//! This module provides:
//! - `ContactSource` for enumerating the address book
//! - `LocationProvider` for single-shot location fixes
//! - `SmsDispatcher` for handing a composed alert to a messaging app
//! - `CommandExec`, the external program description shared by the
//!   command-backed implementations

pub mod address_book;
pub mod location;
pub mod sms;

use std::time::Duration;

use crate::error::{DispatchError, LocationError, PlatformError};
use crate::model::{AlertPayload, Contact, Position};

/// Source of the full device contact list
#[allow(async_fn_in_trait)]
pub trait ContactSource {
    async fn fetch_contacts(&self) -> Result<Vec<Contact>, PlatformError>;
}

/// Options for a single location fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// A cached fix younger than this may be returned instead of a new one
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(20),
            maximum_age: Duration::from_secs(1),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait LocationProvider {
    async fn acquire_location(&self, options: &LocationOptions) -> Result<Position, LocationError>;
}

#[allow(async_fn_in_trait)]
pub trait SmsDispatcher {
    async fn dispatch_sms(&self, payload: &AlertPayload) -> Result<(), DispatchError>;
}

impl<T: ContactSource + ?Sized> ContactSource for &T {
    async fn fetch_contacts(&self) -> Result<Vec<Contact>, PlatformError> {
        (**self).fetch_contacts().await
    }
}

impl<T: LocationProvider + ?Sized> LocationProvider for &T {
    async fn acquire_location(&self, options: &LocationOptions) -> Result<Position, LocationError> {
        (**self).acquire_location(options).await
    }
}

impl<T: SmsDispatcher + ?Sized> SmsDispatcher for &T {
    async fn dispatch_sms(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        (**self).dispatch_sms(payload).await
    }
}

/// External program plus leading arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandExec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The desktop's default URL opener.
    pub fn system_opener() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("open")
        } else if cfg!(target_os = "windows") {
            Self::new("cmd").with_args(["/C", "start", ""])
        } else {
            Self::new("xdg-open")
        }
    }

    pub(crate) fn to_tokio(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        command
    }
}
