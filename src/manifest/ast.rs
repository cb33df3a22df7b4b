//! Serde model of a graph manifest.
//!
//! ```yaml
//! toolchain:
//!   platforms:
//!     - name: linux
//! targets:
//!   - kind: cxx_library
//!     name: "//app:lib"
//!     srcs: [a.c, b.c]
//!     deps: ["//app:dep"]
//! ```
//!
//! Every target is a flat mapping. Fields that do not apply to the declared
//! `kind` are rejected when the target is converted into a [`TargetNode`].

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::capability::{LinkStyle, Linkage};
use crate::config::ToolchainConfig;
use crate::graph::{
    CommonCxxArgs, CxxBinaryArgs, CxxLibraryArgs, PlatformFlags, RuleArgs, SourceLanguage,
    SwiftLibraryArgs, TargetNode,
};
use crate::target::UnflavouredTarget;

use super::ManifestError;

/// A parsed manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphManifest {
    /// Toolchain configuration.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Declared targets.
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

/// Rule kind of a declared target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// `cxx_library`
    CxxLibrary,
    /// `cxx_binary`
    CxxBinary,
    /// `swift_library`
    SwiftLibrary,
}

impl TargetKind {
    /// Manifest spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CxxLibrary => "cxx_library",
            Self::CxxBinary => "cxx_binary",
            Self::SwiftLibrary => "swift_library",
        }
    }

    fn accepts(self, field: &str) -> bool {
        let allowed: &[&str] = match self {
            Self::CxxLibrary => &[
                "headers",
                "preprocessor_flags",
                "platform_compiler_flags",
                "lang_compiler_flags",
                "include_dirs",
                "exported_headers",
                "exported_preprocessor_flags",
                "exported_linker_flags",
                "exported_deps",
                "linkage",
                "supported_platforms_regex",
                "private_headers_symlinks",
            ],
            Self::CxxBinary => &[
                "headers",
                "preprocessor_flags",
                "platform_compiler_flags",
                "lang_compiler_flags",
                "include_dirs",
                "linker_flags",
                "link_style",
            ],
            Self::SwiftLibrary => &[
                "exported_deps",
                "linkage",
                "supported_platforms_regex",
                "libraries",
                "module_name",
            ],
        };
        allowed.contains(&field)
    }
}

/// A target as written in the manifest.
///
/// `srcs`, `deps`, `compiler_flags` and `frameworks` apply to every kind;
/// every other field is kind specific.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Rule kind.
    pub kind: TargetKind,
    /// Unflavoured target name.
    pub name: UnflavouredTarget,
    /// Source files.
    #[serde(default)]
    pub srcs: Vec<Utf8PathBuf>,
    /// Declared dependencies.
    #[serde(default)]
    pub deps: Vec<UnflavouredTarget>,
    /// Compiler flags.
    #[serde(default)]
    pub compiler_flags: Vec<String>,
    /// Frameworks: bundle paths for C/C++, names for Swift.
    #[serde(default)]
    pub frameworks: Vec<String>,
    /// Private headers.
    pub headers: Option<Vec<Utf8PathBuf>>,
    /// Preprocessor flags.
    pub preprocessor_flags: Option<Vec<String>>,
    /// Flags selected by platform.
    pub platform_compiler_flags: Option<Vec<PlatformFlags>>,
    /// Flags selected by source language.
    pub lang_compiler_flags: Option<IndexMap<SourceLanguage, Vec<String>>>,
    /// Extra include directories.
    pub include_dirs: Option<Vec<Utf8PathBuf>>,
    /// Headers visible to dependents.
    pub exported_headers: Option<Vec<Utf8PathBuf>>,
    /// Preprocessor flags propagated to dependents.
    pub exported_preprocessor_flags: Option<Vec<String>>,
    /// Linker flags propagated to dependents.
    pub exported_linker_flags: Option<Vec<String>>,
    /// Dependencies re-exported to dependents.
    pub exported_deps: Option<Vec<UnflavouredTarget>>,
    /// Preferred linkage.
    pub linkage: Option<Linkage>,
    /// Platforms the library builds for.
    pub supported_platforms_regex: Option<String>,
    /// Override for private header symlink trees.
    pub private_headers_symlinks: Option<bool>,
    /// Binary linker flags.
    pub linker_flags: Option<Vec<String>>,
    /// Binary link style.
    pub link_style: Option<LinkStyle>,
    /// Swift system libraries.
    pub libraries: Option<Vec<String>>,
    /// Swift module name.
    pub module_name: Option<String>,
}

impl TargetSpec {
    fn present_fields(&self) -> impl Iterator<Item = &'static str> {
        [
            ("headers", self.headers.is_some()),
            ("preprocessor_flags", self.preprocessor_flags.is_some()),
            (
                "platform_compiler_flags",
                self.platform_compiler_flags.is_some(),
            ),
            ("lang_compiler_flags", self.lang_compiler_flags.is_some()),
            ("include_dirs", self.include_dirs.is_some()),
            ("exported_headers", self.exported_headers.is_some()),
            (
                "exported_preprocessor_flags",
                self.exported_preprocessor_flags.is_some(),
            ),
            ("exported_linker_flags", self.exported_linker_flags.is_some()),
            ("exported_deps", self.exported_deps.is_some()),
            ("linkage", self.linkage.is_some()),
            (
                "supported_platforms_regex",
                self.supported_platforms_regex.is_some(),
            ),
            (
                "private_headers_symlinks",
                self.private_headers_symlinks.is_some(),
            ),
            ("linker_flags", self.linker_flags.is_some()),
            ("link_style", self.link_style.is_some()),
            ("libraries", self.libraries.is_some()),
            ("module_name", self.module_name.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, present)| present.then_some(field))
    }

    /// Convert into a graph node.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnsupportedArgument`] for the first field
    /// the target's kind does not accept.
    pub fn into_node(self) -> Result<TargetNode, ManifestError> {
        let rejected = self.present_fields().find(|f| !self.kind.accepts(f));
        if let Some(field) = rejected {
            return Err(ManifestError::UnsupportedArgument {
                target: self.name,
                kind: self.kind.as_str(),
                field,
            });
        }
        let args = match self.kind {
            TargetKind::CxxLibrary => RuleArgs::CxxLibrary(CxxLibraryArgs {
                common: self.common(),
                exported_headers: self.exported_headers.unwrap_or_default(),
                exported_preprocessor_flags: self.exported_preprocessor_flags.unwrap_or_default(),
                exported_linker_flags: self.exported_linker_flags.unwrap_or_default(),
                exported_deps: self.exported_deps.unwrap_or_default(),
                linkage: self.linkage.unwrap_or_default(),
                supported_platforms_regex: self.supported_platforms_regex,
                private_headers_symlinks: self.private_headers_symlinks,
            }),
            TargetKind::CxxBinary => RuleArgs::CxxBinary(CxxBinaryArgs {
                common: self.common(),
                linker_flags: self.linker_flags.unwrap_or_default(),
                link_style: self.link_style.unwrap_or_default(),
            }),
            TargetKind::SwiftLibrary => RuleArgs::SwiftLibrary(SwiftLibraryArgs {
                srcs: self.srcs,
                deps: self.deps,
                exported_deps: self.exported_deps.unwrap_or_default(),
                compiler_flags: self.compiler_flags,
                frameworks: self.frameworks,
                libraries: self.libraries.unwrap_or_default(),
                module_name: self.module_name,
                linkage: self.linkage.unwrap_or_default(),
                supported_platforms_regex: self.supported_platforms_regex,
            }),
        };
        Ok(TargetNode::new(self.name, args))
    }

    fn common(&self) -> CommonCxxArgs {
        CommonCxxArgs {
            srcs: self.srcs.clone(),
            headers: self.headers.clone().unwrap_or_default(),
            compiler_flags: self.compiler_flags.clone(),
            preprocessor_flags: self.preprocessor_flags.clone().unwrap_or_default(),
            platform_compiler_flags: self.platform_compiler_flags.clone().unwrap_or_default(),
            lang_compiler_flags: self.lang_compiler_flags.clone().unwrap_or_default(),
            include_dirs: self.include_dirs.clone().unwrap_or_default(),
            frameworks: self.frameworks.iter().map(Utf8PathBuf::from).collect(),
            deps: self.deps.clone(),
        }
    }
}
