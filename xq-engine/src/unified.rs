//! Unified engine with runtime backend selection
//!
//! Provides a single [`Engine`] type over any supported vendor, selected at
//! runtime from a [`Backend`] and an installation.

use std::sync::Arc;

use basex_adapter::BasexBinding;
use saxon_adapter::SaxonBinding;
use serde::{Deserialize, Serialize};
use tracing::debug;
use xq_engine_traits::{
    ConnectionSettings, EngineBinding, Error, Installation, QueryKind, Result, SchemaVersion, SessionTarget,
    SessionVariant, UnitLoader,
};

use crate::scheduler::Scheduler;
use crate::session::Session;

/// Backend engine selection
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Backend {
    /// BaseX - XQuery, XPath; local and client sessions
    Basex,
    /// Saxon - XQuery, XPath, XSLT; local sessions only
    Saxon,
}

/// A resolved engine installation.
#[derive(Clone)]
pub struct Engine {
    backend: Backend,
    binding: Arc<dyn EngineBinding>,
    scheduler: Scheduler,
}

impl Engine {
    /// Resolve a BaseX installation
    pub fn basex(installation: &Installation, loader: Option<&dyn UnitLoader>) -> Result<Self> {
        Self::resolve(Backend::Basex, installation, loader)
    }

    /// Resolve a Saxon installation
    pub fn saxon(installation: &Installation, loader: Option<&dyn UnitLoader>) -> Result<Self> {
        Self::resolve(Backend::Saxon, installation, loader)
    }

    /// Resolve `installation` with the specified backend.
    ///
    /// Fails before any query runs if the distribution is missing or lacks a
    /// capability. Sessions run on the shared worker pool.
    pub fn resolve(backend: Backend, installation: &Installation, loader: Option<&dyn UnitLoader>) -> Result<Self> {
        let binding: Arc<dyn EngineBinding> = match backend {
            Backend::Basex => Arc::new(BasexBinding::resolve(installation, loader)?),
            Backend::Saxon => Arc::new(SaxonBinding::resolve(installation, loader)?),
        };
        debug!(%backend, distribution = %installation.describe(), "resolved engine");
        Ok(Self {
            backend,
            binding,
            scheduler: Scheduler::shared()?,
        })
    }

    /// Run this engine's native calls on `scheduler` instead of the shared pool
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Get the current backend
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Display name of the vendor engine
    pub fn name(&self) -> &str {
        self.binding.engine()
    }

    pub fn binding(&self) -> &dyn EngineBinding {
        self.binding.as_ref()
    }

    pub fn supports(&self, kind: QueryKind) -> bool {
        self.binding.supports_kind(kind)
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.binding.schema_version()
    }

    /// Number of native calls made through this installation
    pub fn native_calls(&self) -> usize {
        self.binding.resolver().calls()
    }

    fn require_variant(&self, variant: SessionVariant) -> Result<()> {
        if self.binding.supports_variant(variant) {
            Ok(())
        } else {
            Err(Error::UnsupportedEngineVariant {
                engine: self.name().to_string(),
                variant,
            })
        }
    }

    /// An in-process session. Local sessions of one installation share the
    /// engine's embedded state where the engine has any.
    pub fn create_session(&self) -> Result<Session> {
        self.require_variant(SessionVariant::Local)?;
        Ok(Session::new(
            Arc::clone(&self.binding),
            SessionTarget::Local,
            self.scheduler.clone(),
        ))
    }

    /// A session against an engine server.
    ///
    /// An empty hostname fails with [`Error::HostUnreachable`] without any
    /// native call; the connection itself is made on first use.
    pub fn connect(&self, settings: ConnectionSettings) -> Result<Session> {
        self.require_variant(SessionVariant::Client)?;
        if settings.hostname.trim().is_empty() {
            return Err(Error::HostUnreachable("empty hostname".to_string()));
        }
        Ok(Session::new(
            Arc::clone(&self.binding),
            SessionTarget::Client(settings),
            self.scheduler.clone(),
        ))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.backend)
            .field("engine", &self.name())
            .field("schema", &self.schema_version())
            .finish()
    }
}
