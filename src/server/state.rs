use std::sync::Arc;

use crate::alert::AlertManager;
use crate::config::BeaconConfig;
use crate::identity::IdentityAnonymizer;
use crate::location::LocationIngestor;
use crate::notify::NotificationDispatcher;
use crate::proximity::ProximitySearch;
use crate::store::Store;

/// Shared application state accessible to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub alerts: Arc<AlertManager>,
    pub locations: Arc<LocationIngestor>,
    pub proximity: Arc<ProximitySearch>,
    pub config: Arc<BeaconConfig>,
}

impl AppState {
    /// Wire the engines over one store
    pub fn new(
        store: Store,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: Arc<BeaconConfig>,
    ) -> Self {
        let mut anonymizer = IdentityAnonymizer::new(config.identity.day_policy);
        if let Some(secret) = &config.identity.secret {
            anonymizer = anonymizer.with_secret(secret);
        }

        let alerts = AlertManager::new(store.clone(), Arc::new(anonymizer), dispatcher)
            .with_notify_timeout(config.notifications.timeout());
        let locations = LocationIngestor::new(store.clone(), &config.location);
        let proximity = ProximitySearch::new(Arc::new(store.clone()), config.proximity.clone());

        Self {
            store,
            alerts: Arc::new(alerts),
            locations: Arc::new(locations),
            proximity: Arc::new(proximity),
            config,
        }
    }
}
