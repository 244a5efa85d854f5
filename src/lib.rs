//! Emergency ride alerts: pick emergency contacts from an address book, keep
//! the driver's details, and send those contacts an SMS with the driver's
//! identity and a map link to the current location.

pub mod alert;
pub mod config;
pub mod db;
pub mod error;
pub mod kv;
pub mod model;
pub mod phone;
pub mod platform;
pub mod profile;
pub mod selection;
pub mod token;

pub use alert::AlertService;
pub use error::{AlertError, Prompt};
pub use model::{AlertPayload, Contact, DriverProfile, Position, ProfileField};
pub use selection::{ContactSelectionStore, RefreshOutcome};
