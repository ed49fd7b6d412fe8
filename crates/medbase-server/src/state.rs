//! Application state: the process composition root.
//!
//! Everything process-wide — the store, the search registry, the signing
//! key, the client and authorization stores — is constructed here once and
//! handed out behind `Arc`s.

use std::sync::Arc;

use tracing::{info, warn};

use medbase_auth::clients::{
    CompositeClientRepository, InMemoryClientRepository, StoreClientRepository,
};
use medbase_auth::consent::ConsentStateService;
use medbase_auth::keys::KeyService;
use medbase_auth::oauth::token::TokenService;
use medbase_auth::picker::PatientPickerService;
use medbase_auth::session::SessionStore;
use medbase_auth::store::{InMemoryAuthorizationStore, PatientContextStore};
use medbase_auth::types::client::RegisteredClient;
use medbase_auth::types::user::StoreUserStore;
use medbase_auth::AuthState;
use medbase_db_memory::{MemorySearchIndex, MemoryStore};
use medbase_search::{
    CollectionRouting, FtsSearchService, GroupFilterService, KvFetchService, ParamSource,
    ParameterResolver, SearchParamDef, SearchParamType, SearchParameterRegistry,
};
use medbase_storage::{DocumentStore, Keyspace};
use medbase_write::{BundleProcessor, DeleteService, PutService, TombstoneService};

use crate::config::AppConfig;

/// Development fallback for the admin client secret.
const FALLBACK_ADMIN_SECRET: &str = "change-me-admin-ui-secret";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub resolver: Arc<ParameterResolver>,
    pub search: Arc<FtsSearchService>,
    pub kv: Arc<KvFetchService>,
    pub group: Arc<GroupFilterService>,
    pub tombstones: Arc<TombstoneService>,
    pub put: Arc<PutService>,
    pub delete: Arc<DeleteService>,
    pub bundles: Arc<BundleProcessor>,
    pub auth: AuthState,
}

impl AppState {
    /// Build the full application over the in-memory backend.
    ///
    /// # Errors
    /// Fatal configuration problems, including a signing key that exists in
    /// the admin collection but cannot be loaded.
    pub async fn build(config: AppConfig) -> Result<Self, String> {
        let memory = MemoryStore::new();
        memory.provision_resource_layout(&config.resources.types);
        memory.create_collection(&Keyspace::admin_config());
        memory.create_collection(&Keyspace::admin_users());
        memory.create_collection(&Keyspace::new(
            medbase_storage::ADMIN_SCOPE,
            medbase_auth::clients::CLIENTS_COLLECTION,
        ));
        let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());

        let index = MemorySearchIndex::new(memory);
        index.register_resource_indexes(&config.resources.types);
        index.register_index("ftsVersions", Keyspace::versions());
        if !config.search.general_types.is_empty() {
            index.register_index("ftsGeneral", Keyspace::resources("General"));
        }
        let index = Arc::new(index);

        let registry = SearchParameterRegistry::with_base_definitions();
        for ig_param in &config.ig.search_parameters {
            match parse_param_type(&ig_param.param_type) {
                Some(param_type) => registry.register(
                    SearchParamDef::new(
                        ig_param.name.clone(),
                        param_type,
                        ig_param.expression.clone(),
                        vec![ig_param.resource.clone()],
                    )
                    .with_source(ParamSource::Ig),
                ),
                None => warn!(
                    name = %ig_param.name,
                    param_type = %ig_param.param_type,
                    "skipping IG parameter with unknown type"
                ),
            }
        }
        let resolver = Arc::new(ParameterResolver::new(Arc::new(registry)));

        let routing = CollectionRouting::new(config.search.general_types.clone());
        let search = Arc::new(FtsSearchService::new(
            index.clone(),
            index,
            routing.clone(),
            config.search.use_query_service,
        ));
        let kv = Arc::new(KvFetchService::new(store.clone(), routing));
        let group = Arc::new(
            GroupFilterService::new(resolver.clone(), search.clone(), kv.clone())
                .with_max_keys(config.search.group_max_keys),
        );

        let tombstones = Arc::new(TombstoneService::new(store.clone()));
        let put = Arc::new(PutService::new(store.clone(), tombstones.clone()));
        let delete = Arc::new(DeleteService::new(store.clone(), tombstones.clone()));
        let bundles = Arc::new(BundleProcessor::new(store.clone(), put.clone()));

        let auth = build_auth(&config, store.clone()).await?;

        info!(
            backend = store.backend_name(),
            resource_types = config.resources.types.len(),
            issuer = %config.issuer(),
            "application state ready"
        );
        Ok(Self {
            config: Arc::new(config),
            store,
            resolver,
            search,
            kv,
            group,
            tombstones,
            put,
            delete,
            bundles,
            auth,
        })
    }
}

async fn build_auth(config: &AppConfig, store: Arc<dyn DocumentStore>) -> Result<AuthState, String> {
    let keys = Arc::new(KeyService::new(store.clone()));
    keys.init().await.map_err(|e| format!("signing key init failed: {e}"))?;

    let admin_secret = if config.auth.admin_client_secret.is_empty() {
        warn!("using fallback admin-ui client secret; set ADMIN_UI_CLIENT_SECRET for production");
        FALLBACK_ADMIN_SECRET.to_string()
    } else {
        config.auth.admin_client_secret.clone()
    };
    let admin_client = RegisteredClient::confidential(
        config.auth.admin_client_id.clone(),
        &admin_secret,
        config.auth.admin_scope_list(),
    )
    .with_name("Administration UI");

    let builtin = Arc::new(InMemoryClientRepository::new(vec![admin_client]));
    let persisted = Arc::new(StoreClientRepository::new(store.clone()));
    let clients = Arc::new(CompositeClientRepository::new(builtin, persisted));

    let sessions = Arc::new(SessionStore::new());
    let authorizations = Arc::new(PatientContextStore::new(
        Arc::new(InMemoryAuthorizationStore::new()),
        sessions.clone(),
    ));
    let users = Arc::new(StoreUserStore::new(store.clone()));
    let issuer = config.issuer();

    let tokens = Arc::new(TokenService::new(
        clients.clone(),
        authorizations.clone(),
        users.clone(),
        keys.clone(),
        config.auth.clone(),
        issuer.clone(),
    ));
    let picker = Arc::new(PatientPickerService::new(store));

    Ok(AuthState {
        clients,
        authorizations,
        sessions,
        consents: Arc::new(ConsentStateService::new()),
        users,
        keys,
        tokens,
        picker,
        config: config.auth.clone(),
        issuer,
    })
}

fn parse_param_type(raw: &str) -> Option<SearchParamType> {
    match raw.to_ascii_lowercase().as_str() {
        "number" => Some(SearchParamType::Number),
        "date" => Some(SearchParamType::Date),
        "string" => Some(SearchParamType::String),
        "token" => Some(SearchParamType::Token),
        "reference" => Some(SearchParamType::Reference),
        "composite" => Some(SearchParamType::Composite),
        "quantity" => Some(SearchParamType::Quantity),
        "uri" => Some(SearchParamType::Uri),
        "special" => Some(SearchParamType::Special),
        _ => None,
    }
}
