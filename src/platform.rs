//! C/C++ platform descriptions.
//!
//! A platform is addressed by its flavour (for example `linux-x86_64`) and
//! supplies the compiler, library naming and, optionally, the Swift toolchain
//! used when Swift libraries are linked into C/C++ consumers.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::flavour::FlavourConvertible;
use crate::target::Flavour;

/// Flavour of the platform used when nothing else is configured.
pub const DEFAULT_PLATFORM: Flavour = Flavour::from_static("default");

/// A configured C/C++ platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CxxPlatform {
    /// Platform flavour.
    pub name: Flavour,
    /// C/C++ compiler driver.
    #[serde(default = "default_compiler")]
    pub compiler: String,
    /// Extension of shared libraries, without the dot.
    #[serde(default = "default_shared_extension")]
    pub shared_library_extension: String,
    /// Extension of static archives, without the dot.
    #[serde(default = "default_static_extension")]
    pub static_library_extension: String,
    /// Swift toolchain, when the platform supports Swift.
    #[serde(default)]
    pub swift: Option<SwiftPlatform>,
}

/// Swift compiler and runtime for a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwiftPlatform {
    /// Swift compiler driver.
    #[serde(default = "default_swiftc")]
    pub swiftc: String,
    /// Directories holding the Swift runtime libraries.
    #[serde(default)]
    pub runtime_library_dirs: Vec<Utf8PathBuf>,
    /// Runtime libraries every Swift consumer links against.
    #[serde(default)]
    pub runtime_libraries: Vec<String>,
}

fn default_compiler() -> String {
    "cc".to_owned()
}

fn default_shared_extension() -> String {
    "so".to_owned()
}

fn default_static_extension() -> String {
    "a".to_owned()
}

fn default_swiftc() -> String {
    "swiftc".to_owned()
}

impl CxxPlatform {
    /// A platform with default tools and the given flavour.
    #[must_use]
    pub fn named(name: Flavour) -> Self {
        Self {
            name,
            compiler: default_compiler(),
            shared_library_extension: default_shared_extension(),
            static_library_extension: default_static_extension(),
            swift: None,
        }
    }

    /// Attach a Swift toolchain.
    #[must_use]
    pub fn with_swift(mut self, swift: SwiftPlatform) -> Self {
        self.swift = Some(swift);
        self
    }

    /// File name of the shared library built for `short_name`.
    ///
    /// ```
    /// use kasane::platform::CxxPlatform;
    /// use kasane::target::Flavour;
    ///
    /// let platform = CxxPlatform::named(Flavour::from_static("linux"));
    /// assert_eq!(platform.shared_library_name("zlib"), "libzlib.so");
    /// ```
    #[must_use]
    pub fn shared_library_name(&self, short_name: &str) -> String {
        format!("lib{short_name}.{}", self.shared_library_extension)
    }

    /// File name of the static archive built for `short_name`.
    #[must_use]
    pub fn static_library_name(&self, short_name: &str) -> String {
        format!("lib{short_name}.{}", self.static_library_extension)
    }
}

impl Default for CxxPlatform {
    fn default() -> Self {
        Self::named(DEFAULT_PLATFORM)
    }
}

impl Default for SwiftPlatform {
    fn default() -> Self {
        Self {
            swiftc: default_swiftc(),
            runtime_library_dirs: Vec::new(),
            runtime_libraries: Vec::new(),
        }
    }
}

impl FlavourConvertible for CxxPlatform {
    fn flavour(&self) -> Flavour {
        self.name.clone()
    }
}
