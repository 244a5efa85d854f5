use std::fmt;

use serde::{Deserialize, Serialize};

/// An address-book entry. `phone` is the identity key: two contacts with the
/// same phone are the same contact whatever their name or photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    #[serde(rename = "photoUri", default)]
    pub photo_uri: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            photo_uri: String::new(),
        }
    }

    pub fn with_photo(mut self, photo_uri: impl Into<String>) -> Self {
        self.photo_uri = photo_uri.into();
        self
    }

    pub fn same_phone(&self, other: &Contact) -> bool {
        self.phone == other.phone
    }
}

/// The three driver profile fields, in form order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Name,
    Vehicle,
    Contact,
}

impl ProfileField {
    pub const ALL: [ProfileField; 3] = [ProfileField::Name, ProfileField::Vehicle, ProfileField::Contact];

    /// Storage key. These names predate the repository and must not change.
    pub fn storage_key(&self) -> &'static str {
        match self {
            ProfileField::Name => "driverName",
            ProfileField::Vehicle => "driverVehicleNumber",
            ProfileField::Contact => "driverContact",
        }
    }

    /// Form label
    pub fn label(&self) -> &'static str {
        match self {
            ProfileField::Name => "Driver Name",
            ProfileField::Vehicle => "Vehicle Number",
            ProfileField::Contact => "Driver Contact",
        }
    }

    /// Word used in the "Please enter a driver ..." validation message
    pub fn noun(&self) -> &'static str {
        match self {
            ProfileField::Name => "name",
            ProfileField::Vehicle => "vehicle",
            ProfileField::Contact => "contact",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverProfile {
    pub name: String,
    pub vehicle: String,
    pub contact: String,
}

impl DriverProfile {
    pub fn new(
        name: impl Into<String>,
        vehicle: impl Into<String>,
        contact: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vehicle: vehicle.into(),
            contact: contact.into(),
        }
    }

    pub fn field(&self, field: ProfileField) -> &str {
        match field {
            ProfileField::Name => &self.name,
            ProfileField::Vehicle => &self.vehicle,
            ProfileField::Contact => &self.contact,
        }
    }

    pub fn set_field(&mut self, field: ProfileField, value: impl Into<String>) {
        let value = value.into();
        match field {
            ProfileField::Name => self.name = value,
            ProfileField::Vehicle => self.vehicle = value,
            ProfileField::Contact => self.contact = value,
        }
    }

    /// First field that is blank after trimming, in form order.
    pub fn first_missing_field(&self) -> Option<ProfileField> {
        ProfileField::ALL
            .into_iter()
            .find(|field| self.field(*field).trim().is_empty())
    }
}

/// A single location fix in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Parse `lat,lon` (or whitespace separated) text as printed by location helpers.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty());
        let latitude = parts.next()?.parse::<f64>().ok()?;
        let longitude = parts.next()?.parse::<f64>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        let position = Self::new(latitude, longitude);
        position.is_valid().then_some(position)
    }

    /// Google Maps link for this fix. `f64` display is the shortest exact
    /// representation, so all digits of the fix are kept.
    pub fn map_link(&self) -> String {
        format!(
            "https://maps.google.com/?q={},{}",
            self.latitude, self.longitude
        )
    }
}

/// Composed alert ready for dispatch. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPayload {
    pub recipients: Vec<String>,
    pub message: String,
}
