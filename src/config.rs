//! Toolchain configuration.
//!
//! [`ToolchainConfig`] is the serialisable form read from the `toolchain:`
//! section of a graph manifest. [`Toolchain`] is the validated runtime view
//! that derivation consults: the platform flavour domain, the output root and
//! the Infer settings.

use std::sync::Arc;

use anyhow::{bail, ensure};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::{DeriveError, Result};
use crate::flavour::FlavourDomain;
use crate::platform::{CxxPlatform, DEFAULT_PLATFORM};
use crate::target::{BuildTarget, Flavour};

/// Default directory receiving derived outputs.
pub const DEFAULT_OUT_ROOT: &str = "kasane-out";

/// Name of the platform flavour domain.
pub const PLATFORM_DOMAIN: &str = "C/C++ platform flavours";

/// Settings for the Infer analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferConfig {
    /// Analyzer executable.
    pub binary: String,
    /// Extra arguments passed to every analyzer invocation.
    pub extra_args: Vec<String>,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            binary: "infer".to_owned(),
            extra_args: Vec::new(),
        }
    }
}

/// Serialisable toolchain settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    out_root: Utf8PathBuf,
    default_platform: Flavour,
    platforms: Vec<CxxPlatform>,
    sandbox_sources: bool,
    private_headers_symlinks: bool,
    infer: InferConfig,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            out_root: Utf8PathBuf::from(DEFAULT_OUT_ROOT),
            default_platform: DEFAULT_PLATFORM,
            platforms: Vec::new(),
            sandbox_sources: false,
            private_headers_symlinks: true,
            infer: InferConfig::default(),
        }
    }
}

impl ToolchainConfig {
    /// Override the output root.
    ///
    /// # Errors
    ///
    /// Returns an error when the path is empty or climbs out of the
    /// workspace through `..` components.
    pub fn with_out_root(mut self, out_root: impl Into<Utf8PathBuf>) -> anyhow::Result<Self> {
        let path = out_root.into();
        validate_out_root(&path)?;
        self.out_root = path;
        Ok(self)
    }

    /// Add a platform.
    ///
    /// # Errors
    ///
    /// Returns an error when a platform with the same flavour exists.
    pub fn with_platform(mut self, platform: CxxPlatform) -> anyhow::Result<Self> {
        ensure!(
            self.platforms.iter().all(|p| p.name != platform.name),
            "platform '{}' is declared twice",
            platform.name
        );
        self.platforms.push(platform);
        Ok(self)
    }

    /// Select the platform used for targets without a platform flavour.
    #[must_use]
    pub fn with_default_platform(mut self, flavour: Flavour) -> Self {
        self.default_platform = flavour;
        self
    }

    /// Toggle the sandbox include directory for source compilation.
    #[must_use]
    pub const fn with_sandbox_sources(mut self, enabled: bool) -> Self {
        self.sandbox_sources = enabled;
        self
    }

    /// Set the default for private header symlink trees.
    #[must_use]
    pub const fn with_private_headers_symlinks(mut self, enabled: bool) -> Self {
        self.private_headers_symlinks = enabled;
        self
    }

    /// Replace the Infer settings.
    #[must_use]
    pub fn with_infer(mut self, infer: InferConfig) -> Self {
        self.infer = infer;
        self
    }
}

fn validate_out_root(path: &Utf8Path) -> anyhow::Result<()> {
    if path.as_str().is_empty() {
        bail!("output root must not be empty");
    }
    if path
        .components()
        .any(|c| matches!(c, Utf8Component::ParentDir))
    {
        bail!("output root '{path}' must not contain '..' components");
    }
    Ok(())
}

/// Validated toolchain consulted during derivation.
#[derive(Debug, Clone)]
pub struct Toolchain {
    out_root: Utf8PathBuf,
    platforms: FlavourDomain<Arc<CxxPlatform>>,
    default_platform: Arc<CxxPlatform>,
    sandbox_sources: bool,
    private_headers_symlinks: bool,
    infer: InferConfig,
}

impl Toolchain {
    /// Validate `config` and build the platform flavour domain.
    ///
    /// When no platforms are declared a default platform named after
    /// `default_platform` is synthesised.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid output root, duplicate platforms or a
    /// default platform that is not declared.
    pub fn new(config: ToolchainConfig) -> anyhow::Result<Self> {
        let ToolchainConfig {
            out_root,
            default_platform,
            mut platforms,
            sandbox_sources,
            private_headers_symlinks,
            infer,
        } = config;
        validate_out_root(&out_root)?;
        if platforms.is_empty() {
            platforms.push(CxxPlatform::named(default_platform.clone()));
        }
        let mut pairs: Vec<(Flavour, Arc<CxxPlatform>)> = Vec::with_capacity(platforms.len());
        for platform in platforms {
            ensure!(
                pairs.iter().all(|(name, _)| *name != platform.name),
                "platform '{}' is declared twice",
                platform.name
            );
            pairs.push((platform.name.clone(), Arc::new(platform)));
        }
        let Some(default) = pairs
            .iter()
            .find(|(name, _)| *name == default_platform)
            .map(|(_, platform)| Arc::clone(platform))
        else {
            bail!("default platform '{default_platform}' is not declared");
        };
        Ok(Self {
            out_root,
            platforms: FlavourDomain::new(PLATFORM_DOMAIN, pairs),
            default_platform: default,
            sandbox_sources,
            private_headers_symlinks,
            infer,
        })
    }

    /// Root directory for derived outputs.
    #[must_use]
    pub fn out_root(&self) -> &Utf8Path {
        &self.out_root
    }

    /// The platform flavour domain.
    #[must_use]
    pub const fn platforms(&self) -> &FlavourDomain<Arc<CxxPlatform>> {
        &self.platforms
    }

    /// Platform used when a target carries no platform flavour.
    #[must_use]
    pub fn default_platform(&self) -> &Arc<CxxPlatform> {
        &self.default_platform
    }

    /// Look up a platform by flavour.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::UnknownPlatform`] for an undeclared flavour.
    pub fn platform(&self, flavour: &Flavour) -> Result<Arc<CxxPlatform>> {
        self.platforms
            .value(flavour)
            .cloned()
            .map_err(|_| DeriveError::UnknownPlatform {
                flavour: flavour.clone(),
            })
    }

    /// Platform selected by `target`, falling back to the default.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::Flavour`] when the target carries more than one
    /// platform flavour.
    pub fn platform_for(&self, target: &BuildTarget) -> Result<Arc<CxxPlatform>> {
        Ok(self
            .platforms
            .value_of(target)?
            .unwrap_or_else(|| Arc::clone(&self.default_platform)))
    }

    /// Whether sources compile against a sandbox include directory.
    #[must_use]
    pub const fn sandbox_sources(&self) -> bool {
        self.sandbox_sources
    }

    /// Platform default for private header symlink trees.
    #[must_use]
    pub const fn private_headers_symlinks(&self) -> bool {
        self.private_headers_symlinks
    }

    /// Infer analyzer settings.
    #[must_use]
    pub const fn infer(&self) -> &InferConfig {
        &self.infer
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        let platform = Arc::new(CxxPlatform::default());
        Self {
            out_root: Utf8PathBuf::from(DEFAULT_OUT_ROOT),
            platforms: FlavourDomain::new(
                PLATFORM_DOMAIN,
                [(platform.name.clone(), Arc::clone(&platform))],
            ),
            default_platform: platform,
            sandbox_sources: false,
            private_headers_symlinks: true,
            infer: InferConfig::default(),
        }
    }
}
