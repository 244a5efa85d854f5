//! Send orchestration: profile, location fix, payload, dispatch.
//!
//! Each step short-circuits the send with its own [`AlertError`]. The
//! empty-selection check runs first so an unconfigured user never triggers a
//! location request.

use tracing::{debug, info, warn};

use crate::error::AlertError;
use crate::kv::KeyValueStore;
use crate::model::{AlertPayload, DriverProfile};
use crate::platform::{LocationOptions, LocationProvider, SmsDispatcher};
use crate::profile::ProfileRepository;
use crate::selection::ContactSelectionStore;
use crate::token::RequestTokens;

pub struct AlertService<P, L, D> {
    profiles: P,
    location: L,
    dispatcher: D,
    options: LocationOptions,
    requests: RequestTokens,
}

impl<P, L, D> AlertService<P, L, D>
where
    P: ProfileRepository,
    L: LocationProvider,
    D: SmsDispatcher,
{
    pub fn new(profiles: P, location: L, dispatcher: D) -> Self {
        Self {
            profiles,
            location,
            dispatcher,
            options: LocationOptions::default(),
            requests: RequestTokens::new(),
        }
    }

    pub fn with_options(mut self, options: LocationOptions) -> Self {
        self.options = options;
        self
    }

    /// Stored driver profile. Read failures and a missing profile both fall
    /// back to empty fields; the alert still goes out.
    fn driver_profile(&self) -> DriverProfile {
        match self.profiles.get() {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!("no driver profile saved; sending alert without driver details");
                DriverProfile::default()
            }
            Err(err) => {
                warn!(error = %err, "driver profile unreadable; sending alert without driver details");
                DriverProfile::default()
            }
        }
    }

    /// Compose and dispatch an alert for the current selection.
    ///
    /// If another send starts while this one waits for a location fix, this
    /// one ends with [`AlertError::Superseded`] and nothing is dispatched.
    pub async fn send_alert<S: KeyValueStore>(
        &self,
        store: &ContactSelectionStore<S>,
    ) -> Result<AlertPayload, AlertError> {
        if store.selected().is_empty() {
            return Err(AlertError::EmptySelection);
        }

        let token = self.requests.issue();
        let driver = self.driver_profile();

        let position = self.location.acquire_location(&self.options).await?;
        if !self.requests.is_current(token) {
            debug!(token = token.value(), "discarding stale location fix");
            return Err(AlertError::Superseded);
        }

        let payload = store.build_alert_payload(&driver, &position)?;
        self.dispatcher.dispatch_sms(&payload).await?;
        info!(recipients = payload.recipients.len(), "emergency alert dispatched");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use tokio::sync::oneshot;

    use crate::error::{Capability, DispatchError, LocationError, PersistenceError, Prompt};
    use crate::kv::MemoryStore;
    use crate::model::{Contact, Position};
    use crate::profile::KvProfileRepository;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: RefCell<Vec<AlertPayload>>,
        fail: bool,
    }

    impl SmsDispatcher for RecordingDispatcher {
        async fn dispatch_sms(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::Unavailable("no handler".into()));
            }
            self.sent.borrow_mut().push(payload.clone());
            Ok(())
        }
    }

    struct ScriptedLocation {
        result: Result<Position, LocationError>,
        calls: Cell<usize>,
    }

    impl ScriptedLocation {
        fn ok(position: Position) -> Self {
            Self {
                result: Ok(position),
                calls: Cell::new(0),
            }
        }

        fn err(err: LocationError) -> Self {
            Self {
                result: Err(err),
                calls: Cell::new(0),
            }
        }
    }

    impl LocationProvider for ScriptedLocation {
        async fn acquire_location(&self, _options: &LocationOptions) -> Result<Position, LocationError> {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    /// Hands out fixes in the order the test releases them.
    struct GatedLocation {
        gates: RefCell<Vec<oneshot::Receiver<Position>>>,
    }

    impl LocationProvider for GatedLocation {
        async fn acquire_location(&self, _options: &LocationOptions) -> Result<Position, LocationError> {
            let gate = self.gates.borrow_mut().remove(0);
            gate.await
                .map_err(|_| LocationError::Unavailable("gate dropped".into()))
        }
    }

    struct BrokenProfiles;

    impl ProfileRepository for BrokenProfiles {
        fn get(&self) -> Result<Option<DriverProfile>, PersistenceError> {
            Err(PersistenceError::Read {
                key: "driverName".into(),
                message: "locked".into(),
            })
        }

        fn save(&self, _profile: &DriverProfile) -> Result<(), crate::error::ProfileError> {
            Ok(())
        }
    }

    fn seeded_store<'a>(kv: &'a MemoryStore, phones: &[&str]) -> ContactSelectionStore<&'a MemoryStore> {
        let mut store = ContactSelectionStore::new(kv);
        for (idx, phone) in phones.iter().enumerate() {
            store.toggle(&Contact::new(format!("Contact {idx}"), *phone));
        }
        store
    }

    fn saved_profiles(kv: &MemoryStore) -> KvProfileRepository<&MemoryStore> {
        let repo = KvProfileRepository::new(kv);
        repo.save(&DriverProfile::new("Asha", "KA01AB1234", "9998887776"))
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn test_send_alert_end_to_end() {
        let kv = MemoryStore::new();
        let store = seeded_store(&kv, &["9000011111"]);
        let dispatcher = RecordingDispatcher::default();
        let service = AlertService::new(
            saved_profiles(&kv),
            ScriptedLocation::ok(Position::new(12.9716, 77.5946)),
            &dispatcher,
        );

        let payload = service.send_alert(&store).await.unwrap();
        assert_eq!(payload.recipients, vec!["9000011111"]);
        assert!(payload.message.ends_with(
            "Driver: Asha, Contact: 9998887776, Vehicle No: KA01AB1234. My Current Location: https://maps.google.com/?q=12.9716,77.5946"
        ));
        assert_eq!(dispatcher.sent.borrow().as_slice(), &[payload]);
    }

    #[tokio::test]
    async fn test_empty_selection_never_touches_location_or_dispatch() {
        let kv = MemoryStore::new();
        let store = seeded_store(&kv, &[]);
        let location = ScriptedLocation::ok(Position::new(0.0, 0.0));
        let dispatcher = RecordingDispatcher::default();
        let service = AlertService::new(saved_profiles(&kv), &location, &dispatcher);

        let err = service.send_alert(&store).await.unwrap_err();
        assert_eq!(err, AlertError::EmptySelection);
        assert_eq!(err.prompt(), Prompt::SelectContacts);
        assert_eq!(location.calls.get(), 0);
        assert!(dispatcher.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_no_valid_recipients_never_dispatches() {
        let kv = MemoryStore::new();
        let store = seeded_store(&kv, &["abc", ""]);
        let dispatcher = RecordingDispatcher::default();
        let service = AlertService::new(
            saved_profiles(&kv),
            ScriptedLocation::ok(Position::new(0.0, 0.0)),
            &dispatcher,
        );

        assert_eq!(
            service.send_alert(&store).await.unwrap_err(),
            AlertError::NoValidRecipients
        );
        assert!(dispatcher.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_location_failures_map_to_distinct_errors() {
        let kv = MemoryStore::new();
        let store = seeded_store(&kv, &["1"]);
        let dispatcher = RecordingDispatcher::default();

        let denied = AlertService::new(
            saved_profiles(&kv),
            ScriptedLocation::err(LocationError::PermissionDenied),
            &dispatcher,
        );
        let err = denied.send_alert(&store).await.unwrap_err();
        assert_eq!(err, AlertError::PermissionDenied(Capability::Location));
        assert_eq!(err.prompt(), Prompt::OpenSettings);

        let timeout = AlertService::new(
            saved_profiles(&kv),
            ScriptedLocation::err(LocationError::Timeout),
            &dispatcher,
        );
        let err = timeout.send_alert(&store).await.unwrap_err();
        assert_eq!(err, AlertError::LocationUnavailable(LocationError::Timeout));
        assert_eq!(err.prompt(), Prompt::Retry);

        assert!(dispatcher.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_terminal() {
        let kv = MemoryStore::new();
        let store = seeded_store(&kv, &["1"]);
        let dispatcher = RecordingDispatcher {
            fail: true,
            ..Default::default()
        };
        let service = AlertService::new(
            saved_profiles(&kv),
            ScriptedLocation::ok(Position::new(0.0, 0.0)),
            &dispatcher,
        );
        let err = service.send_alert(&store).await.unwrap_err();
        assert!(matches!(err, AlertError::DispatchUnavailable(_)));
        assert_eq!(err.prompt(), Prompt::Terminal);
        assert_eq!(err.user_message(), "SMS app not available.");
    }

    #[tokio::test]
    async fn test_unreadable_profile_still_sends() {
        let kv = MemoryStore::new();
        let store = seeded_store(&kv, &["1"]);
        let dispatcher = RecordingDispatcher::default();
        let service = AlertService::new(
            BrokenProfiles,
            ScriptedLocation::ok(Position::new(1.0, 2.0)),
            &dispatcher,
        );
        let payload = service.send_alert(&store).await.unwrap();
        assert!(payload.message.contains("Driver: , Contact: , Vehicle No: ."));
    }

    #[tokio::test]
    async fn test_stale_location_fix_is_discarded() {
        let kv = MemoryStore::new();
        let store = seeded_store(&kv, &["1"]);
        let dispatcher = RecordingDispatcher::default();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let service = AlertService::new(
            saved_profiles(&kv),
            GatedLocation {
                gates: RefCell::new(vec![first_rx, second_rx]),
            },
            &dispatcher,
        );

        let release = async {
            tokio::task::yield_now().await;
            second_tx.send(Position::new(2.0, 2.0)).unwrap();
            tokio::task::yield_now().await;
            first_tx.send(Position::new(1.0, 1.0)).unwrap();
        };
        let (first, second, ()) =
            tokio::join!(service.send_alert(&store), service.send_alert(&store), release);

        assert_eq!(first.unwrap_err(), AlertError::Superseded);
        let second = second.unwrap();
        assert!(second.message.ends_with("?q=2,2"));
        assert_eq!(dispatcher.sent.borrow().len(), 1);
    }
}
