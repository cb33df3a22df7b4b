//! Constructor arguments of primary rules.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::capability::{LinkStyle, Linkage};
use crate::error::{DeriveError, Result};
use crate::platform::CxxPlatform;
use crate::target::UnflavouredTarget;

/// Language of a C-family source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    /// C.
    C,
    /// C++.
    Cxx,
    /// Objective-C.
    ObjC,
    /// Objective-C++.
    ObjCxx,
    /// Preprocessed assembly.
    Asm,
}

impl SourceLanguage {
    /// Infer the language from a file extension.
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use kasane::graph::SourceLanguage;
    ///
    /// assert_eq!(SourceLanguage::from_path(Utf8Path::new("a.cc")), Some(SourceLanguage::Cxx));
    /// assert_eq!(SourceLanguage::from_path(Utf8Path::new("a.h")), None);
    /// ```
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        match path.extension()? {
            "c" => Some(Self::C),
            "cc" | "cpp" | "cxx" | "c++" => Some(Self::Cxx),
            "m" => Some(Self::ObjC),
            "mm" => Some(Self::ObjCxx),
            "S" | "s" => Some(Self::Asm),
            _ => None,
        }
    }
}

/// Flags applied on platforms whose flavour matches `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformFlags {
    /// Regular expression searched for in the platform flavour.
    pub pattern: String,
    /// Flags to add on a match.
    pub flags: Vec<String>,
}

/// Whether `platform` is selected by `pattern`. An absent pattern selects
/// every platform.
///
/// # Errors
///
/// Returns [`DeriveError::InvalidPattern`] when the pattern does not compile.
pub fn platform_matches(
    pattern: Option<&str>,
    platform: &CxxPlatform,
    owner: &UnflavouredTarget,
) -> Result<bool> {
    let Some(source) = pattern else {
        return Ok(true);
    };
    Ok(compile_pattern(source, owner)?.is_match(platform.name.as_str()))
}

/// Compile a platform pattern declared by `owner`.
///
/// # Errors
///
/// Returns [`DeriveError::InvalidPattern`] when the pattern does not compile.
pub fn compile_pattern(pattern: &str, owner: &UnflavouredTarget) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| DeriveError::InvalidPattern {
        target: owner.clone(),
        pattern: pattern.to_owned(),
        source,
    })
}

/// Platform filter compiled from an optional `supported_platforms_regex`.
#[derive(Debug, Clone, Default)]
pub struct PlatformFilter(Option<Regex>);

impl PlatformFilter {
    /// Compile the filter.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::InvalidPattern`] when the pattern does not compile.
    pub fn new(pattern: Option<&str>, owner: &UnflavouredTarget) -> Result<Self> {
        pattern
            .map(|p| compile_pattern(p, owner))
            .transpose()
            .map(Self)
    }

    /// Whether `platform` is supported.
    #[must_use]
    pub fn supports(&self, platform: &CxxPlatform) -> bool {
        self.0
            .as_ref()
            .is_none_or(|regex| regex.is_match(platform.name.as_str()))
    }
}

/// Arguments shared by C/C++ libraries and binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonCxxArgs {
    /// Source files in declared order.
    pub srcs: Vec<Utf8PathBuf>,
    /// Private headers.
    pub headers: Vec<Utf8PathBuf>,
    /// Flags for every compilation.
    pub compiler_flags: Vec<String>,
    /// Flags for every preprocessing step.
    pub preprocessor_flags: Vec<String>,
    /// Flags selected by platform.
    pub platform_compiler_flags: Vec<PlatformFlags>,
    /// Flags selected by source language.
    pub lang_compiler_flags: IndexMap<SourceLanguage, Vec<String>>,
    /// Extra include directories.
    pub include_dirs: Vec<Utf8PathBuf>,
    /// Frameworks.
    pub frameworks: Vec<Utf8PathBuf>,
    /// Declared dependencies in order.
    pub deps: Vec<UnflavouredTarget>,
}

impl CommonCxxArgs {
    /// Compiler flags for `source` on `platform`: common flags, then
    /// platform-matched flags, then flags for the source's language.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::InvalidPattern`] for a malformed platform
    /// pattern.
    pub fn compiler_flags_for(
        &self,
        source: &Utf8Path,
        platform: &CxxPlatform,
        owner: &UnflavouredTarget,
    ) -> Result<Vec<String>> {
        let mut flags = self.compiler_flags.clone();
        for entry in &self.platform_compiler_flags {
            if platform_matches(Some(&entry.pattern), platform, owner)? {
                flags.extend(entry.flags.iter().cloned());
            }
        }
        if let Some(extra) = SourceLanguage::from_path(source)
            .and_then(|language| self.lang_compiler_flags.get(&language))
        {
            flags.extend(extra.iter().cloned());
        }
        Ok(flags)
    }
}

/// Arguments of a C/C++ library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CxxLibraryArgs {
    /// Arguments shared with binaries.
    pub common: CommonCxxArgs,
    /// Headers visible to dependents.
    pub exported_headers: Vec<Utf8PathBuf>,
    /// Preprocessor flags propagated to dependents.
    pub exported_preprocessor_flags: Vec<String>,
    /// Linker flags propagated to dependents.
    pub exported_linker_flags: Vec<String>,
    /// Dependencies re-exported to dependents.
    pub exported_deps: Vec<UnflavouredTarget>,
    /// Preferred linkage.
    pub linkage: Linkage,
    /// Platforms the library builds for; all when absent.
    pub supported_platforms_regex: Option<String>,
    /// Override for private header symlink trees.
    pub private_headers_symlinks: Option<bool>,
}

/// Arguments of a C/C++ binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CxxBinaryArgs {
    /// Arguments shared with libraries.
    pub common: CommonCxxArgs,
    /// Extra linker flags.
    pub linker_flags: Vec<String>,
    /// How dependencies are linked.
    pub link_style: LinkStyle,
}

/// Arguments of a Swift library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwiftLibraryArgs {
    /// Swift sources.
    pub srcs: Vec<Utf8PathBuf>,
    /// Declared dependencies.
    pub deps: Vec<UnflavouredTarget>,
    /// Dependencies re-exported to linkers.
    pub exported_deps: Vec<UnflavouredTarget>,
    /// Swift compiler flags.
    pub compiler_flags: Vec<String>,
    /// Frameworks to link.
    pub frameworks: Vec<String>,
    /// System libraries to link.
    pub libraries: Vec<String>,
    /// Module name; defaults to the short name.
    pub module_name: Option<String>,
    /// Preferred linkage.
    pub linkage: Linkage,
    /// Platforms the library builds for; all when absent.
    pub supported_platforms_regex: Option<String>,
}

/// Constructor arguments for a target node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleArgs {
    /// `cxx_library`
    CxxLibrary(CxxLibraryArgs),
    /// `cxx_binary`
    CxxBinary(CxxBinaryArgs),
    /// `swift_library`
    SwiftLibrary(SwiftLibraryArgs),
}

impl RuleArgs {
    /// Manifest name of the rule kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::CxxLibrary(_) => "cxx_library",
            Self::CxxBinary(_) => "cxx_binary",
            Self::SwiftLibrary(_) => "swift_library",
        }
    }

    /// Declared dependencies followed by exported ones.
    pub fn all_deps(&self) -> impl Iterator<Item = &UnflavouredTarget> {
        let (declared, exported): (&[UnflavouredTarget], &[UnflavouredTarget]) = match self {
            Self::CxxLibrary(args) => (args.common.deps.as_slice(), args.exported_deps.as_slice()),
            Self::CxxBinary(args) => (args.common.deps.as_slice(), &[]),
            Self::SwiftLibrary(args) => (args.deps.as_slice(), args.exported_deps.as_slice()),
        };
        declared.iter().chain(exported)
    }

    /// View C/C++ arguments, if these are C/C++ arguments.
    #[must_use]
    pub const fn as_cxx(&self) -> Option<CxxArgs<'_>> {
        match self {
            Self::CxxLibrary(args) => Some(CxxArgs::Library(args)),
            Self::CxxBinary(args) => Some(CxxArgs::Binary(args)),
            Self::SwiftLibrary(_) => None,
        }
    }
}

/// Borrowed C/C++ arguments tagged by rule shape.
#[derive(Debug, Clone, Copy)]
pub enum CxxArgs<'a> {
    /// Library arguments.
    Library(&'a CxxLibraryArgs),
    /// Binary arguments.
    Binary(&'a CxxBinaryArgs),
}

impl<'a> CxxArgs<'a> {
    /// Arguments common to both shapes.
    #[must_use]
    pub const fn common(self) -> &'a CommonCxxArgs {
        match self {
            Self::Library(args) => &args.common,
            Self::Binary(args) => &args.common,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Flavour;
    use rstest::rstest;

    fn owner() -> UnflavouredTarget {
        "//app:lib".parse().expect("parse")
    }

    fn platform(name: &'static str) -> CxxPlatform {
        CxxPlatform::named(Flavour::from_static(name))
    }

    #[rstest]
    #[case(None, "linux-x86_64", true)]
    #[case(Some("^linux"), "linux-x86_64", true)]
    #[case(Some("x86"), "linux-x86_64", true)]
    #[case(Some("^macos"), "linux-x86_64", false)]
    fn pattern_selection(
        #[case] pattern: Option<&str>,
        #[case] name: &'static str,
        #[case] expected: bool,
    ) {
        assert_eq!(
            platform_matches(pattern, &platform(name), &owner()).expect("pattern"),
            expected
        );
    }

    #[rstest]
    fn malformed_pattern_is_reported() {
        let err = platform_matches(Some("("), &platform("linux"), &owner()).expect_err("bad");
        assert!(matches!(err, DeriveError::InvalidPattern { .. }));
    }

    #[rstest]
    fn compiler_flags_combine_in_order() {
        let args = CommonCxxArgs {
            compiler_flags: vec!["-O2".into()],
            platform_compiler_flags: vec![
                PlatformFlags {
                    pattern: "linux".into(),
                    flags: vec!["-fPIC".into()],
                },
                PlatformFlags {
                    pattern: "macos".into(),
                    flags: vec!["-mmacos".into()],
                },
            ],
            lang_compiler_flags: IndexMap::from([
                (SourceLanguage::Cxx, vec!["-std=c++17".into()]),
                (SourceLanguage::C, vec!["-std=c11".into()]),
            ]),
            ..CommonCxxArgs::default()
        };
        let flags = args
            .compiler_flags_for(Utf8Path::new("a.cpp"), &platform("linux"), &owner())
            .expect("flags");
        assert_eq!(flags, vec!["-O2", "-fPIC", "-std=c++17"]);
    }
}
