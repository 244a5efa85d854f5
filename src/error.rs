//! Error taxonomy for the selection store and the alert pipeline.
//!
//! Persistence failures are best effort and usually end up logged and
//! defaulted. Everything a user has to act on surfaces through [`AlertError`],
//! which knows its own user-facing message and the kind of prompt to show.

use thiserror::Error;

use crate::model::ProfileField;

/// Host capability that can be refused by the user or the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Contacts,
    Location,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Contacts => f.write_str("contacts"),
            Capability::Location => f.write_str("location"),
        }
    }
}

/// Failure of the address-book fetcher.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{0} permission denied")]
    PermissionDenied(Capability),
    #[error("failed to read contacts: {0}")]
    FetchFailed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location request timed out")]
    Timeout,
    #[error("location provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("SMS app not available: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    #[error("no emergency contacts selected")]
    EmptySelection,
    #[error("no valid phone numbers found")]
    NoValidRecipients,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage read of `{key}` failed: {message}")]
    Read { key: String, message: String },
    #[error("storage write of `{key}` failed: {message}")]
    Write { key: String, message: String },
    #[error("stored value of `{key}` is malformed")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Please enter a driver {}", .0.noun())]
    Missing(ProfileField),
    #[error("Failed to save driver details")]
    Persistence(#[from] PersistenceError),
}

/// What the front end should do with a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Offer a shortcut to the system settings.
    OpenSettings,
    /// Let the user try again.
    Retry,
    /// Block and send the user back to contact selection.
    SelectContacts,
    /// Report and stop; the attempt is over.
    Terminal,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("no emergency contacts selected")]
    EmptySelection,
    #[error("no valid phone numbers among the selected contacts")]
    NoValidRecipients,
    #[error("{0} permission denied")]
    PermissionDenied(Capability),
    #[error("location unavailable: {0}")]
    LocationUnavailable(LocationError),
    #[error("SMS dispatch unavailable: {0}")]
    DispatchUnavailable(String),
    #[error("superseded by a newer alert request")]
    Superseded,
}

impl AlertError {
    pub fn user_message(&self) -> String {
        match self {
            AlertError::EmptySelection => {
                "No emergency contacts selected. Add contacts before sending.".to_string()
            }
            AlertError::NoValidRecipients => "No valid phone numbers found!".to_string(),
            AlertError::PermissionDenied(capability) => {
                format!("Permission required: enable {capability} access in settings.")
            }
            AlertError::LocationUnavailable(LocationError::Timeout) => {
                "Could not get your location in time. Try again.".to_string()
            }
            AlertError::LocationUnavailable(err) => format!("Location unavailable: {err}"),
            AlertError::DispatchUnavailable(_) => "SMS app not available.".to_string(),
            AlertError::Superseded => "A newer alert request replaced this one.".to_string(),
        }
    }

    pub fn prompt(&self) -> Prompt {
        match self {
            AlertError::EmptySelection | AlertError::NoValidRecipients => Prompt::SelectContacts,
            AlertError::PermissionDenied(_) => Prompt::OpenSettings,
            AlertError::LocationUnavailable(_) => Prompt::Retry,
            AlertError::DispatchUnavailable(_) | AlertError::Superseded => Prompt::Terminal,
        }
    }
}

impl From<PayloadError> for AlertError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::EmptySelection => AlertError::EmptySelection,
            PayloadError::NoValidRecipients => AlertError::NoValidRecipients,
        }
    }
}

impl From<LocationError> for AlertError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => AlertError::PermissionDenied(Capability::Location),
            other => AlertError::LocationUnavailable(other),
        }
    }
}

impl From<DispatchError> for AlertError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Unavailable(reason) => AlertError::DispatchUnavailable(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_error_messages() {
        assert_eq!(
            ProfileError::Missing(ProfileField::Name).to_string(),
            "Please enter a driver name"
        );
        assert_eq!(
            ProfileError::Missing(ProfileField::Vehicle).to_string(),
            "Please enter a driver vehicle"
        );
        assert_eq!(
            ProfileError::Missing(ProfileField::Contact).to_string(),
            "Please enter a driver contact"
        );
    }

    #[test]
    fn test_each_failure_kind_has_distinct_message() {
        let errors = [
            AlertError::EmptySelection,
            AlertError::NoValidRecipients,
            AlertError::PermissionDenied(Capability::Location),
            AlertError::LocationUnavailable(LocationError::Timeout),
            AlertError::LocationUnavailable(LocationError::Unavailable("gps off".into())),
            AlertError::DispatchUnavailable("no handler".into()),
        ];
        let messages: std::collections::HashSet<String> =
            errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn test_prompt_classification() {
        assert_eq!(AlertError::EmptySelection.prompt(), Prompt::SelectContacts);
        assert_eq!(AlertError::NoValidRecipients.prompt(), Prompt::SelectContacts);
        assert_eq!(
            AlertError::from(LocationError::PermissionDenied).prompt(),
            Prompt::OpenSettings
        );
        assert_eq!(
            AlertError::from(LocationError::Timeout).prompt(),
            Prompt::Retry
        );
        assert_eq!(
            AlertError::from(DispatchError::Unavailable("x".into())).prompt(),
            Prompt::Terminal
        );
    }
}
