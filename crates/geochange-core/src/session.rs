use std::{
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use geochange_toolchain::{Availability, ToolchainPaths};

#[derive(Debug)]
pub struct Session {
    paths: ToolchainPaths,
    avd_name: String,
    default_identity: RwLock<Option<String>>,
    pinned: bool,
    config_path: Option<PathBuf>,
}

impl Session {
    pub fn new(paths: ToolchainPaths, avd_name: impl Into<String>) -> Self {
        Self {
            paths,
            avd_name: avd_name.into(),
            default_identity: RwLock::new(None),
            pinned: false,
            config_path: None,
        }
    }

    pub fn with_default_identity(self, identity: Option<String>) -> Self {
        let identity = identity.filter(|id| !id.trim().is_empty());
        *self
            .default_identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = identity;
        self
    }

    /// An identity chosen by the user. Device discovery never replaces it.
    pub fn with_pinned_identity(self, identity: impl Into<String>) -> Self {
        let identity = identity.into();
        if identity.trim().is_empty() {
            return self;
        }
        let mut session = self.with_default_identity(Some(identity));
        session.pinned = true;
        session
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn paths(&self) -> &ToolchainPaths {
        &self.paths
    }

    pub fn avd_name(&self) -> &str {
        &self.avd_name
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn default_identity(&self) -> Option<String> {
        self.default_identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_default_identity(&self, identity: &str) -> bool {
        if self.pinned {
            return false;
        }
        *self
            .default_identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(identity.to_string());
        true
    }

    pub fn availability(&self) -> Availability {
        self.paths.availability(&self.avd_name)
    }
}
