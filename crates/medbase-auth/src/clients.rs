//! Registered client repositories.
//!
//! The in-memory repository holds only the built-in administrative client;
//! SMART application clients are persisted in the `Admin.clients`
//! collection. The composite checks in-memory first, then the store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::types::client::RegisteredClient;
use medbase_storage::{DocumentStore, Keyspace, ADMIN_SCOPE};

/// Admin collection holding persisted SMART clients.
pub const CLIENTS_COLLECTION: &str = "clients";

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<RegisteredClient>>;
}

/// Built-in clients held in memory.
#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: DashMap<String, RegisteredClient>,
}

impl InMemoryClientRepository {
    pub fn new(clients: Vec<RegisteredClient>) -> Self {
        let map = DashMap::new();
        for client in clients {
            map.insert(client.client_id.clone(), client);
        }
        Self { clients: map }
    }

    pub fn register(&self, client: RegisteredClient) {
        self.clients.insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<RegisteredClient>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }
}

/// SMART app clients persisted in the document store.
pub struct StoreClientRepository {
    store: Arc<dyn DocumentStore>,
}

impl StoreClientRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn keyspace() -> Keyspace {
        Keyspace::new(ADMIN_SCOPE, CLIENTS_COLLECTION)
    }

    pub async fn save(&self, client: &RegisteredClient) -> AuthResult<()> {
        let value = serde_json::to_value(client)
            .map_err(|e| AuthError::server_error(e.to_string()))?;
        self.store
            .upsert(&Self::keyspace(), &client.client_id, value)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClientRepository for StoreClientRepository {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<RegisteredClient>> {
        if !self.store.collection_exists(&Self::keyspace()).await? {
            return Ok(None);
        }
        let doc = self.store.get(&Self::keyspace(), client_id).await?;
        match doc {
            Some(doc) => {
                let client = serde_json::from_value(doc.content)
                    .map_err(|e| AuthError::server_error(e.to_string()))?;
                Ok(Some(client))
            }
            None => Ok(None),
        }
    }
}

/// In-memory built-ins overlaid with the persistent store.
pub struct CompositeClientRepository {
    builtin: Arc<InMemoryClientRepository>,
    persisted: Arc<StoreClientRepository>,
}

impl CompositeClientRepository {
    pub fn new(
        builtin: Arc<InMemoryClientRepository>,
        persisted: Arc<StoreClientRepository>,
    ) -> Self {
        Self { builtin, persisted }
    }
}

#[async_trait]
impl ClientRepository for CompositeClientRepository {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<RegisteredClient>> {
        if let Some(client) = self.builtin.find_by_client_id(client_id).await? {
            debug!(client_id, "client resolved from built-ins");
            return Ok(Some(client));
        }
        self.persisted.find_by_client_id(client_id).await
    }
}
