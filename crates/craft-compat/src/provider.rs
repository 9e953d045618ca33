use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::capability::CapabilityTable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityUnavailable {
    #[error("capability '{name}' is absent")]
    Absent { name: String },
    #[error("capability '{name}' is present but no provider is registered for it")]
    NoProvider { name: String },
    #[error("provider for '{name}' rejected the request: {reason}")]
    Rejected { name: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityRequest {
    /// Resolve an externally rendered model into a client-facing model id.
    ResolveModel { key: String, model: String },
    /// Expand provider placeholders inside a display string.
    ExpandText { text: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityResponse {
    Model { model: String },
    Text { text: String },
}

pub trait CapabilityProvider: Send + Sync {
    fn handle(&self, request: &CapabilityRequest) -> Result<CapabilityResponse, String>;
}

/// Providers keyed by capability name. Only providers whose capability is
/// present in the frozen table are ever consulted.
#[derive(Clone, Default)]
pub struct Providers {
    table: CapabilityTable,
    providers: HashMap<String, Arc<dyn CapabilityProvider>>,
}

impl Providers {
    pub fn new(table: CapabilityTable) -> Self {
        Self {
            table,
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn CapabilityProvider>) {
        let name = name.into();
        if !self.table.is_present(&name) {
            log::warn!("provider registered for absent capability {}; it will not be used", name);
        }
        self.providers.insert(name, provider);
    }

    #[inline]
    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    pub fn delegate(
        &self,
        name: &str,
        request: &CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        if !self.table.is_present(name) {
            return Err(CapabilityUnavailable::Absent { name: name.into() });
        }
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| CapabilityUnavailable::NoProvider { name: name.into() })?;
        provider
            .handle(request)
            .map_err(|reason| CapabilityUnavailable::Rejected {
                name: name.into(),
                reason,
            })
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("Providers")
            .field("table", &self.table)
            .field("providers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{StaticProbe, well_known};

    struct Echo;

    impl CapabilityProvider for Echo {
        fn handle(&self, request: &CapabilityRequest) -> Result<CapabilityResponse, String> {
            match request {
                CapabilityRequest::ResolveModel { model, .. } => Ok(CapabilityResponse::Model {
                    model: format!("ext/{model}"),
                }),
                CapabilityRequest::ExpandText { .. } => Err("text not supported".into()),
            }
        }
    }

    fn providers(present: bool) -> Providers {
        let mut probe = StaticProbe::new();
        if present {
            probe = probe.with(well_known::MODEL_ENGINE, None);
        }
        let mut p = Providers::new(CapabilityTable::probe_well_known(&probe));
        p.register(well_known::MODEL_ENGINE, Arc::new(Echo));
        p
    }

    #[test]
    fn delegate_reaches_present_provider() {
        let p = providers(true);
        let out = p
            .delegate(
                well_known::MODEL_ENGINE,
                &CapabilityRequest::ResolveModel {
                    key: "craft:lamp".into(),
                    model: "lamp".into(),
                },
            )
            .unwrap();
        assert_eq!(out, CapabilityResponse::Model { model: "ext/lamp".into() });
    }

    #[test]
    fn delegate_refuses_absent_capability() {
        let p = providers(false);
        let err = p
            .delegate(
                well_known::MODEL_ENGINE,
                &CapabilityRequest::ResolveModel {
                    key: "craft:lamp".into(),
                    model: "lamp".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, CapabilityUnavailable::Absent { .. }));
    }

    #[test]
    fn delegate_reports_rejections_and_missing_providers() {
        let p = providers(true);
        let err = p
            .delegate(
                well_known::MODEL_ENGINE,
                &CapabilityRequest::ExpandText { text: "%x%".into() },
            )
            .unwrap_err();
        assert!(matches!(err, CapabilityUnavailable::Rejected { .. }));

        let table = CapabilityTable::probe_well_known(
            &StaticProbe::new().with(well_known::PLACEHOLDER, None),
        );
        let p = Providers::new(table);
        let err = p
            .delegate(
                well_known::PLACEHOLDER,
                &CapabilityRequest::ExpandText { text: "x".into() },
            )
            .unwrap_err();
        assert!(matches!(err, CapabilityUnavailable::NoProvider { .. }));
    }
}
