//! Search parameter registry and resolver.
//!
//! The registry indexes definitions by `(resource_type, name)` plus a common
//! bucket for parameters whose base includes `Resource`. The resolver splits
//! `name:modifier`, tries base definitions first, then configured IG
//! definitions, and caches results per `(resource_type, name)`.
//!
//! Uses DashMap for lock-free concurrent access.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::{SearchError, SearchResult};
use crate::parameters::{
    ParamSource, ResolvedParam, SearchModifier, SearchParamDef, SearchParamType,
};

/// Registry of search parameter definitions.
#[derive(Debug, Default)]
pub struct SearchParameterRegistry {
    by_resource: DashMap<(String, String), Arc<SearchParamDef>>,
    common: DashMap<String, Arc<SearchParamDef>>,
}

impl SearchParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in base R4 definitions.
    pub fn with_base_definitions() -> Self {
        let registry = Self::new();
        for def in base_definitions() {
            registry.register(def);
        }
        registry
    }

    /// Register a definition. Base definitions shadow IG definitions of the
    /// same name; an IG definition never replaces an existing base one.
    pub fn register(&self, def: SearchParamDef) {
        let def = Arc::new(def);
        if def.is_common() {
            self.insert_guarded(&self.common, def.name.clone(), def.clone());
        }
        for base in &def.base {
            if base == "Resource" || base == "DomainResource" {
                continue;
            }
            self.insert_guarded(
                &self.by_resource,
                (base.clone(), def.name.clone()),
                def.clone(),
            );
        }
    }

    fn insert_guarded<K: std::hash::Hash + Eq>(
        &self,
        map: &DashMap<K, Arc<SearchParamDef>>,
        key: K,
        def: Arc<SearchParamDef>,
    ) {
        match map.get(&key) {
            Some(existing)
                if existing.source == ParamSource::Base && def.source != ParamSource::Base => {}
            _ => {
                map.insert(key, def);
            }
        }
    }

    /// Look up a definition for a resource type, falling back to common
    /// parameters.
    pub fn get(&self, resource_type: &str, name: &str) -> Option<Arc<SearchParamDef>> {
        let key = (resource_type.to_string(), name.to_string());
        if let Some(def) = self.by_resource.get(&key) {
            return Some(def.clone());
        }
        self.common.get(name).map(|def| def.clone())
    }

    pub fn len(&self) -> usize {
        self.by_resource.len() + self.common.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty() && self.common.is_empty()
    }
}

/// Resolves raw parameter names against the registry.
///
/// Stateless apart from a read-through cache keyed by
/// `(resource_type, raw_name)`.
pub struct ParameterResolver {
    registry: Arc<SearchParameterRegistry>,
    cache: DashMap<(String, String), Arc<ResolvedParam>>,
}

impl ParameterResolver {
    pub fn new(registry: Arc<SearchParameterRegistry>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &SearchParameterRegistry {
        &self.registry
    }

    /// Resolve `(resourceType, rawName)` where `rawName` may carry a
    /// `:modifier` suffix.
    ///
    /// # Errors
    /// `SearchError::UnknownParameter` when neither base nor IG definitions
    /// know the name.
    pub fn resolve(
        &self,
        resource_type: &str,
        raw_name: &str,
    ) -> SearchResult<Arc<ResolvedParam>> {
        let cache_key = (resource_type.to_string(), raw_name.to_string());
        if let Some(hit) = self.cache.get(&cache_key) {
            return Ok(hit.clone());
        }

        let (name, modifier) = split_name_and_modifier(raw_name);
        let def = self.registry.get(resource_type, name).ok_or_else(|| {
            warn!(resource_type, param = raw_name, "unknown search parameter");
            SearchError::unknown_parameter(raw_name, resource_type)
        })?;

        let resolved = Arc::new(ResolvedParam {
            name: name.to_string(),
            modifier,
            param_type: def.param_type,
            fhir_path: def.expression.clone(),
            resource_type: resource_type.to_string(),
            source: def.source,
        });
        self.cache.insert(cache_key, resolved.clone());
        Ok(resolved)
    }
}

fn split_name_and_modifier(raw: &str) -> (&str, Option<SearchModifier>) {
    match raw.split_once(':') {
        Some((name, modifier)) => (name, SearchModifier::parse(modifier)),
        None => (raw, None),
    }
}

/// The built-in base R4 definitions for the clinical resource types this
/// server indexes. Kept to the parameters the query builders understand.
pub fn base_definitions() -> Vec<SearchParamDef> {
    use SearchParamType::*;

    let mut defs = vec![
        // Common parameters
        SearchParamDef::new("_id", Token, "Resource.id", vec!["Resource".into()]),
        SearchParamDef::new(
            "_lastUpdated",
            Date,
            "Resource.meta.lastUpdated",
            vec!["Resource".into()],
        ),
    ];

    let patient = [
        ("name", String, "Patient.name"),
        ("family", String, "Patient.name.family"),
        ("given", String, "Patient.name.given"),
        ("birthdate", Date, "Patient.birthDate"),
        ("gender", Token, "Patient.gender"),
        ("active", Token, "Patient.active"),
        ("deceased", Token, "Patient.deceased[x]"),
        ("identifier", Token, "Patient.identifier"),
        ("address", String, "Patient.address"),
        ("email", Token, "Patient.telecom.where(system='email')"),
        ("organization", Reference, "Patient.managingOrganization"),
        ("death-date", Date, "Patient.deceasedDateTime"),
    ];
    let observation = [
        ("code", Token, "Observation.code"),
        ("status", Token, "Observation.status"),
        ("category", Token, "Observation.category"),
        ("date", Date, "Observation.effective[x]"),
        ("subject", Reference, "Observation.subject"),
        ("patient", Reference, "Observation.subject.where(resolve() is Patient)"),
        ("encounter", Reference, "Observation.encounter"),
        ("performer", Reference, "Observation.performer"),
        ("value-quantity", Quantity, "Observation.valueQuantity"),
        ("value-concept", Token, "Observation.valueCodeableConcept"),
        ("value-date", Date, "Observation.value[x]"),
        ("identifier", Token, "Observation.identifier"),
    ];
    let encounter = [
        ("status", Token, "Encounter.status"),
        ("class", Token, "Encounter.class"),
        ("date", Date, "Encounter.period"),
        ("subject", Reference, "Encounter.subject"),
        ("patient", Reference, "Encounter.subject.where(resolve() is Patient)"),
        ("identifier", Token, "Encounter.identifier"),
        ("service-provider", Reference, "Encounter.serviceProvider"),
    ];
    let condition = [
        ("code", Token, "Condition.code"),
        ("clinical-status", Token, "Condition.clinicalStatus"),
        ("onset-date", Date, "Condition.onset[x]"),
        ("recorded-date", Date, "Condition.recordedDate"),
        ("subject", Reference, "Condition.subject"),
        ("patient", Reference, "Condition.subject.where(resolve() is Patient)"),
        ("identifier", Token, "Condition.identifier"),
    ];
    let organization = [
        ("name", String, "Organization.name"),
        ("active", Token, "Organization.active"),
        ("identifier", Token, "Organization.identifier"),
        ("address", String, "Organization.address"),
    ];
    let practitioner = [
        ("name", String, "Practitioner.name"),
        ("family", String, "Practitioner.name.family"),
        ("given", String, "Practitioner.name.given"),
        ("active", Token, "Practitioner.active"),
        ("identifier", Token, "Practitioner.identifier"),
        ("gender", Token, "Practitioner.gender"),
    ];
    let procedure = [
        ("code", Token, "Procedure.code"),
        ("status", Token, "Procedure.status"),
        ("date", Date, "Procedure.performed[x]"),
        ("subject", Reference, "Procedure.subject"),
        ("patient", Reference, "Procedure.subject.where(resolve() is Patient)"),
    ];
    let medication_request = [
        ("status", Token, "MedicationRequest.status"),
        ("intent", Token, "MedicationRequest.intent"),
        ("authoredon", Date, "MedicationRequest.authoredOn"),
        ("subject", Reference, "MedicationRequest.subject"),
        ("patient", Reference, "MedicationRequest.subject.where(resolve() is Patient)"),
        ("medication", Reference, "MedicationRequest.medicationReference"),
    ];
    let diagnostic_report = [
        ("code", Token, "DiagnosticReport.code"),
        ("status", Token, "DiagnosticReport.status"),
        ("date", Date, "DiagnosticReport.effective[x]"),
        ("subject", Reference, "DiagnosticReport.subject"),
        ("patient", Reference, "DiagnosticReport.subject.where(resolve() is Patient)"),
    ];
    let immunization = [
        ("status", Token, "Immunization.status"),
        ("vaccine-code", Token, "Immunization.vaccineCode"),
        ("date", Date, "Immunization.occurrence[x]"),
        ("patient", Reference, "Immunization.patient"),
    ];
    let group = [
        ("type", Token, "Group.type"),
        ("actual", Token, "Group.actual"),
        ("member", Reference, "Group.member.entity"),
        ("identifier", Token, "Group.identifier"),
    ];

    let tables: [(&str, &[(&str, SearchParamType, &str)]); 11] = [
        ("Patient", &patient),
        ("Observation", &observation),
        ("Encounter", &encounter),
        ("Condition", &condition),
        ("Organization", &organization),
        ("Practitioner", &practitioner),
        ("Procedure", &procedure),
        ("MedicationRequest", &medication_request),
        ("DiagnosticReport", &diagnostic_report),
        ("Immunization", &immunization),
        ("Group", &group),
    ];

    for (resource_type, params) in tables {
        for (name, param_type, expression) in params.iter() {
            defs.push(SearchParamDef::new(
                *name,
                *param_type,
                *expression,
                vec![resource_type.to_string()],
            ));
        }
    }
    defs
}
