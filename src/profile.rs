//! Driver profile persistence.
//!
//! The profile is stored as three independent string entries, one per
//! [`ProfileField`], so older installs keep reading back.

use tracing::debug;

use crate::error::{PersistenceError, ProfileError};
use crate::kv::KeyValueStore;
use crate::model::{DriverProfile, ProfileField};

pub trait ProfileRepository {
    /// Stored profile, or `None` when no driver name was ever saved.
    fn get(&self) -> Result<Option<DriverProfile>, PersistenceError>;

    /// Validate and overwrite the stored profile.
    fn save(&self, profile: &DriverProfile) -> Result<(), ProfileError>;
}

impl<T: ProfileRepository + ?Sized> ProfileRepository for &T {
    fn get(&self) -> Result<Option<DriverProfile>, PersistenceError> {
        (**self).get()
    }

    fn save(&self, profile: &DriverProfile) -> Result<(), ProfileError> {
        (**self).save(profile)
    }
}

pub struct KvProfileRepository<S> {
    kv: S,
}

impl<S: KeyValueStore> KvProfileRepository<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }
}

impl<S: KeyValueStore> ProfileRepository for KvProfileRepository<S> {
    fn get(&self) -> Result<Option<DriverProfile>, PersistenceError> {
        let mut profile = DriverProfile::default();
        for field in ProfileField::ALL {
            if let Some(value) = self.kv.get(field.storage_key())? {
                profile.set_field(field, value);
            }
        }
        if profile.name.is_empty() {
            return Ok(None);
        }
        Ok(Some(profile))
    }

    fn save(&self, profile: &DriverProfile) -> Result<(), ProfileError> {
        if let Some(field) = profile.first_missing_field() {
            return Err(ProfileError::Missing(field));
        }
        let entries: Vec<(&str, &str)> = ProfileField::ALL
            .iter()
            .map(|field| (field.storage_key(), profile.field(*field)))
            .collect();
        self.kv.multi_set(&entries)?;
        debug!(driver = %profile.name, "saved driver profile");
        Ok(())
    }
}
