//! Read interfaces to the service directory and emergency contacts
//!
//! Both datasets are owned by other parts of the platform; the alert
//! engine only reads them. `Store` implements both traits against the
//! shared database, `StaticDirectory` holds fixed data in memory.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EmergencyContact, ServiceLocation};

/// Source of support services for proximity search
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// Active services, optionally restricted to one category
    async fn list_active_services(&self, category: Option<&str>) -> Result<Vec<ServiceLocation>>;
}

/// Source of emergency contacts per identity, for readers outside a
/// transaction
///
/// Alert creation does not go through this trait. It reads contacts with
/// `store::directory::active_contacts` on its own transaction, so the
/// contact list and the new alert come from one snapshot.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Active contacts of an identity, in notification order
    async fn list_contacts(&self, identity_key: &str) -> Result<Vec<EmergencyContact>>;
}

/// In-memory directory with fixed contents
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    services: Vec<ServiceLocation>,
    contacts: Vec<EmergencyContact>,
}

impl StaticDirectory {
    pub fn new(services: Vec<ServiceLocation>, contacts: Vec<EmergencyContact>) -> Self {
        Self { services, contacts }
    }

    pub fn with_service(mut self, service: ServiceLocation) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_contact(mut self, contact: EmergencyContact) -> Self {
        self.contacts.push(contact);
        self
    }
}

#[async_trait]
impl ServiceDirectory for StaticDirectory {
    async fn list_active_services(&self, category: Option<&str>) -> Result<Vec<ServiceLocation>> {
        Ok(self
            .services
            .iter()
            .filter(|s| s.active)
            .filter(|s| category.map_or(true, |c| s.category == c))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContactDirectory for StaticDirectory {
    async fn list_contacts(&self, identity_key: &str) -> Result<Vec<EmergencyContact>> {
        let mut contacts: Vec<EmergencyContact> = self
            .contacts
            .iter()
            .filter(|c| c.active && c.anonymized_identity == identity_key)
            .cloned()
            .collect();
        contacts.sort_by_key(|c| c.order);
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(id: i64, category: &str, active: bool) -> ServiceLocation {
        ServiceLocation {
            id,
            category: category.to_string(),
            name: format!("Service {}", id),
            address: None,
            phone: None,
            municipality: None,
            open_24h: false,
            latitude: Some(-16.6),
            longitude: Some(-49.3),
            active,
        }
    }

    fn contact(identity: &str, order: i64, active: bool) -> EmergencyContact {
        EmergencyContact {
            anonymized_identity: identity.to_string(),
            name: format!("Contact {}", order),
            phone: format!("+55 62 9000-000{}", order),
            order,
            active,
        }
    }

    #[tokio::test]
    async fn test_static_services_filtering() {
        let dir = StaticDirectory::default()
            .with_service(service(1, "security", true))
            .with_service(service(2, "health", true))
            .with_service(service(3, "security", false));

        assert_eq!(dir.list_active_services(None).await.unwrap().len(), 2);
        let security = dir.list_active_services(Some("security")).await.unwrap();
        assert_eq!(security.len(), 1);
        assert_eq!(security[0].id, 1);
        assert!(dir
            .list_active_services(Some("legal"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_static_contacts_ordered_and_active() {
        let dir = StaticDirectory::default()
            .with_contact(contact("abc", 2, true))
            .with_contact(contact("abc", 1, true))
            .with_contact(contact("abc", 3, false))
            .with_contact(contact("xyz", 1, true));

        let contacts = dir.list_contacts("abc").await.unwrap();
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].order, 1);
        assert_eq!(contacts[1].order, 2);
    }
}
