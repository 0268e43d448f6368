//! Nearest support services by great-circle distance

use std::sync::Arc;

use crate::config::ProximityConfig;
use crate::directory::ServiceDirectory;
use crate::error::{BeaconError, Result};
use crate::types::{Coordinates, NearbyQuery, NearbyService};

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points, in kilometers
pub fn haversine_km(from: &Coordinates, to: &Coordinates) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_phi = (to.latitude - from.latitude).to_radians();
    let d_lambda = (to.longitude - from.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Proximity search over a service directory
#[derive(Clone)]
pub struct ProximitySearch {
    directory: Arc<dyn ServiceDirectory>,
    config: ProximityConfig,
}

impl ProximitySearch {
    pub fn new(directory: Arc<dyn ServiceDirectory>, config: ProximityConfig) -> Self {
        Self { directory, config }
    }

    /// Active services strictly inside the radius, nearest first
    ///
    /// Ties on distance are ordered by service id. At most
    /// `max_results` entries are returned.
    pub async fn nearby(&self, query: NearbyQuery) -> Result<Vec<NearbyService>> {
        let origin = Coordinates::required(query.lat, query.lng)?;
        let radius_km = self.radius(query.radius)?;
        let category = query.category.as_deref().filter(|c| !c.is_empty());

        let services = self.directory.list_active_services(category).await?;

        let mut nearby: Vec<NearbyService> = services
            .into_iter()
            .filter(|s| s.active)
            .filter_map(|service| {
                let target = Coordinates::from_optional(service.latitude, service.longitude)
                    .ok()
                    .flatten()?;
                let distance_km = haversine_km(&origin, &target);
                (distance_km < radius_km).then_some(NearbyService {
                    service,
                    distance_km,
                })
            })
            .collect();

        nearby.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then(a.service.id.cmp(&b.service.id))
        });
        nearby.truncate(self.config.max_results);

        tracing::debug!(
            radius_km,
            category = category.unwrap_or("*"),
            results = nearby.len(),
            "Proximity search"
        );
        Ok(nearby)
    }

    fn radius(&self, requested: Option<f64>) -> Result<f64> {
        let radius = requested.unwrap_or(self.config.default_radius_km);
        if !radius.is_finite() || radius <= 0.0 || radius > self.config.max_radius_km {
            return Err(BeaconError::InvalidInput(format!(
                "radius must be greater than 0 and at most {} km",
                self.config.max_radius_km
            )));
        }
        Ok(radius)
    }
}
