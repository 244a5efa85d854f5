//! Contact selection state: the volatile address-book list, the persisted
//! set of emergency contacts, and the alert payload built from them.
//!
//! `selected` is unique by phone and keeps insertion order. `toggle` is its
//! only mutator and rewrites the whole persisted set after every call.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::error::{Capability, PayloadError, PersistenceError, PlatformError};
use crate::kv::KeyValueStore;
use crate::model::{AlertPayload, Contact, DriverProfile, Position};
use crate::phone;
use crate::platform::ContactSource;
use crate::token::{RequestToken, RequestTokens};

pub const SELECTED_CONTACTS_KEY: &str = "selectedContacts";

/// Result of a full-contact refresh as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The full list was replaced; carries the new length.
    Updated(usize),
    /// The caller should ask for the capability (or point at settings).
    NeedsPermission(Capability),
    /// The platform read failed; the previous list is kept.
    Failed(String),
    /// A newer refresh was started before this one finished.
    Stale,
}

pub struct ContactSelectionStore<S> {
    kv: S,
    full_contacts: Vec<Contact>,
    selected: Vec<Contact>,
    fetches: RequestTokens,
}

impl<S: KeyValueStore> ContactSelectionStore<S> {
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            full_contacts: Vec::new(),
            selected: Vec::new(),
            fetches: RequestTokens::new(),
        }
    }

    /// Store with the persisted selection already loaded
    pub fn load_from(kv: S) -> Self {
        let mut store = Self::new(kv);
        store.load();
        store
    }

    pub fn full_contacts(&self) -> &[Contact] {
        &self.full_contacts
    }

    pub fn selected(&self) -> &[Contact] {
        &self.selected
    }

    pub fn is_selected(&self, phone: &str) -> bool {
        self.selected.iter().any(|c| c.phone == phone)
    }

    /// Replace the in-memory selection with the persisted one.
    ///
    /// Never fails: a missing entry is an empty selection, and read or
    /// parse errors are logged and treated the same way. Duplicates left by
    /// older writers are collapsed, first occurrence wins.
    pub fn load(&mut self) {
        self.selected = match self.read_persisted() {
            Ok(Some(contacts)) => {
                let before = contacts.len();
                let unique = dedup_by_phone(contacts);
                if unique.len() != before {
                    info!(
                        dropped = before - unique.len(),
                        "repaired duplicate entries in stored selection"
                    );
                }
                unique
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable stored selection");
                Vec::new()
            }
        };
        debug!(count = self.selected.len(), "loaded selected contacts");
    }

    fn read_persisted(&self) -> Result<Option<Vec<Contact>>, PersistenceError> {
        let Some(raw) = self.kv.get(SELECTED_CONTACTS_KEY)? else {
            return Ok(None);
        };
        let contacts = serde_json::from_str::<Vec<Contact>>(&raw).map_err(|source| {
            PersistenceError::Decode {
                key: SELECTED_CONTACTS_KEY.to_string(),
                source,
            }
        })?;
        Ok(Some(contacts))
    }

    fn persist(&self) {
        let encoded = match serde_json::to_string(&self.selected) {
            Ok(encoded) => encoded,
            Err(source) => {
                let err = PersistenceError::Encode {
                    key: SELECTED_CONTACTS_KEY.to_string(),
                    source,
                };
                warn!(error = %err, "selection not persisted");
                return;
            }
        };
        if let Err(err) = self.kv.set(SELECTED_CONTACTS_KEY, &encoded) {
            warn!(error = %err, "selection not persisted");
        }
    }

    /// Start a refresh. Pair with [`Self::apply_refresh`] when the fetch
    /// runs outside the store.
    pub fn begin_refresh(&self) -> RequestToken {
        self.fetches.issue()
    }

    pub fn apply_refresh(
        &mut self,
        token: RequestToken,
        result: Result<Vec<Contact>, PlatformError>,
    ) -> RefreshOutcome {
        if !self.fetches.is_current(token) {
            debug!(token = token.value(), "discarding stale contact fetch");
            return RefreshOutcome::Stale;
        }
        match result {
            Ok(contacts) => {
                self.full_contacts = contacts;
                debug!(count = self.full_contacts.len(), "refreshed full contact list");
                RefreshOutcome::Updated(self.full_contacts.len())
            }
            Err(PlatformError::PermissionDenied(capability)) => {
                info!(%capability, "contact fetch needs permission");
                RefreshOutcome::NeedsPermission(capability)
            }
            Err(err) => {
                warn!(error = %err, "contact fetch failed");
                RefreshOutcome::Failed(err.to_string())
            }
        }
    }

    pub async fn refresh_full_contacts<F: ContactSource>(&mut self, fetcher: &F) -> RefreshOutcome {
        let token = self.begin_refresh();
        let result = fetcher.fetch_contacts().await;
        self.apply_refresh(token, result)
    }

    /// Flip membership of `contact` (by phone) and persist the result.
    /// Returns whether the contact is selected afterwards.
    pub fn toggle(&mut self, contact: &Contact) -> bool {
        let now_selected = match self.selected.iter().position(|c| c.same_phone(contact)) {
            Some(idx) => {
                self.selected.remove(idx);
                false
            }
            None => {
                self.selected.push(contact.clone());
                true
            }
        };
        self.persist();
        now_selected
    }

    pub fn filter_full(&self, query: &str) -> Vec<&Contact> {
        filter(query, &self.full_contacts)
    }

    pub fn filter_selected(&self, query: &str) -> Vec<&Contact> {
        filter(query, &self.selected)
    }

    pub fn build_alert_payload(
        &self,
        driver: &DriverProfile,
        position: &Position,
    ) -> Result<AlertPayload, PayloadError> {
        build_alert_payload(&self.selected, driver, position)
    }
}

/// Keep the first contact seen for each phone, preserving order.
pub fn dedup_by_phone(contacts: Vec<Contact>) -> Vec<Contact> {
    let mut seen = HashSet::new();
    contacts
        .into_iter()
        .filter(|c| seen.insert(c.phone.clone()))
        .collect()
}

/// Contacts whose name contains `query`, ignoring case. An empty query
/// matches everything.
pub fn filter<'a>(query: &str, source: &'a [Contact]) -> Vec<&'a Contact> {
    if query.is_empty() {
        return source.iter().collect();
    }
    let needle = query.to_lowercase();
    source
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect()
}

pub fn compose_message(driver: &DriverProfile, position: &Position) -> String {
    format!(
        "🚨 Emergency Alert! Driver: {}, Contact: {}, Vehicle No: {}. My Current Location: {}",
        driver.name,
        driver.contact,
        driver.vehicle,
        position.map_link()
    )
}

pub fn build_alert_payload(
    selected: &[Contact],
    driver: &DriverProfile,
    position: &Position,
) -> Result<AlertPayload, PayloadError> {
    if selected.is_empty() {
        return Err(PayloadError::EmptySelection);
    }

    let mut seen = HashSet::new();
    let recipients: Vec<String> = selected
        .iter()
        .map(|c| phone::normalize_digits(&c.phone))
        .filter(|number| !number.is_empty())
        .filter(|number| seen.insert(number.clone()))
        .collect();

    if recipients.is_empty() {
        return Err(PayloadError::NoValidRecipients);
    }

    Ok(AlertPayload {
        recipients,
        message: compose_message(driver, position),
    })
}
