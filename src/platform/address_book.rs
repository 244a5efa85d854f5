//! Address book backed by a directory of vCard files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vcard4::property::TextOrUriProperty;
use vcard4::{parse, Vcard};

use crate::error::{Capability, PlatformError};
use crate::model::Contact;
use crate::phone::strip_tel_scheme;
use crate::platform::ContactSource;

/// Reads every `.vcf` file under `root` (recursively). Each `TEL` on a card
/// becomes one contact named after the card's `FN`.
#[derive(Debug, Clone)]
pub struct VdirContactSource {
    root: PathBuf,
}

impl VdirContactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ContactSource for VdirContactSource {
    async fn fetch_contacts(&self) -> Result<Vec<Contact>, PlatformError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || read_address_book(&root))
            .await
            .map_err(|err| PlatformError::FetchFailed(err.to_string()))?
    }
}

pub fn read_address_book(root: &Path) -> Result<Vec<Contact>, PlatformError> {
    let files = list_vcf_files(root).map_err(|err| match err.kind() {
        io::ErrorKind::PermissionDenied => PlatformError::PermissionDenied(Capability::Contacts),
        _ => PlatformError::FetchFailed(format!("{}: {}", root.display(), err)),
    })?;

    let mut contacts = Vec::new();
    let mut parsed_any = false;
    for path in &files {
        let cards = match read_cards(path) {
            Ok(cards) => cards,
            Err(message) => {
                warn!(path = %path.display(), %message, "skipping unreadable vCard file");
                continue;
            }
        };
        parsed_any = true;
        for card in &cards {
            contacts.extend(card_contacts(card));
        }
    }

    if !files.is_empty() && !parsed_any {
        return Err(PlatformError::FetchFailed(format!(
            "no readable vCards in {}",
            root.display()
        )));
    }

    contacts.sort_by_key(|c| c.name.to_lowercase());
    debug!(files = files.len(), contacts = contacts.len(), "read address book");
    Ok(contacts)
}

fn read_cards(path: &Path) -> Result<Vec<Vcard>, String> {
    let input = fs::read_to_string(path).map_err(|err| err.to_string())?;
    parse(&input).map_err(|err| err.to_string())
}

/// One contact per telephone property. Cards without a phone yield nothing.
pub fn card_contacts(card: &Vcard) -> Vec<Contact> {
    let photo_uri = card
        .photo
        .first()
        .map(property_text)
        .unwrap_or_default();

    card.tel
        .iter()
        .map(|tel| strip_tel_scheme(&property_text(tel)).to_string())
        .filter(|phone| !phone.is_empty())
        .map(|phone| {
            let name = card
                .formatted_name
                .first()
                .map(|prop| prop.value.trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| phone.clone());
            Contact::new(name, phone).with_photo(photo_uri.clone())
        })
        .collect()
}

fn property_text(prop: &TextOrUriProperty) -> String {
    match prop {
        TextOrUriProperty::Text(text) => text.value.trim().to_string(),
        TextOrUriProperty::Uri(uri) => uri.value.to_string(),
    }
}

pub fn list_vcf_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_vcf(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_vcf(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_vcf(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("vcf"))
            .unwrap_or(false)
        {
            files.push(path);
        }
    }
    Ok(())
}
