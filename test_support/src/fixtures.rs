//! Canned graphs and toolchains shared by integration tests.

use kasane::config::ToolchainConfig;
use kasane::graph::TargetNode;
use kasane::platform::{CxxPlatform, SwiftPlatform};
use kasane::target::Flavour;

use crate::{binary, library, swift_library};

/// `//app:lib` (`a.c`, `b.c`) depending on `//app:dep` (`dep.c`).
pub fn app_graph() -> Vec<TargetNode> {
    vec![
        library("//app:lib", &["a.c", "b.c"], &["//app:dep"]),
        library("//app:dep", &["dep.c"], &[]),
    ]
}

/// `//d:top` depends on `//d:left` and `//d:right`, which both depend on
/// `//d:bottom`.
pub fn diamond() -> Vec<TargetNode> {
    vec![
        library("//d:top", &["top.c"], &["//d:left", "//d:right"]),
        library("//d:left", &["left.c"], &["//d:bottom"]),
        library("//d:right", &["right.c"], &["//d:bottom"]),
        library("//d:bottom", &["bottom.c"], &[]),
    ]
}

/// A binary linking a Swift library that depends on a C/C++ library.
pub fn mixed_graph() -> Vec<TargetNode> {
    vec![
        binary("//app:main", &["main.c"], &["//ui:kit"]),
        swift_library("//ui:kit", &["View.swift", "Model.swift"], &["//core:util"]),
        library("//core:util", &["util.c"], &[]),
    ]
}

/// Flavour of the Swift-capable platform in [`swift_toolchain`].
pub const SWIFT_PLATFORM: Flavour = Flavour::from_static("macos");

/// Flavour of the platform without Swift in [`swift_toolchain`].
pub const PLAIN_PLATFORM: Flavour = Flavour::from_static("linux");

/// Toolchain with a Swift-capable default platform and a plain one.
pub fn swift_toolchain() -> ToolchainConfig {
    let swift = SwiftPlatform {
        swiftc: "swiftc".to_owned(),
        runtime_library_dirs: vec!["/usr/lib/swift".into()],
        runtime_libraries: vec!["swiftCore".to_owned()],
    };
    ToolchainConfig::default()
        .with_platform(CxxPlatform::named(SWIFT_PLATFORM).with_swift(swift))
        .expect("swift platform")
        .with_platform(CxxPlatform::named(PLAIN_PLATFORM))
        .expect("plain platform")
        .with_default_platform(SWIFT_PLATFORM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, ensure};
    use kasane::config::Toolchain;
    use kasane::graph::StaticTargetGraph;
    use rstest::rstest;

    #[rstest]
    #[case(app_graph(), 2)]
    #[case(diamond(), 4)]
    #[case(mixed_graph(), 3)]
    fn fixtures_are_valid_graphs(#[case] nodes: Vec<TargetNode>, #[case] len: usize) -> Result<()> {
        let graph = StaticTargetGraph::new(nodes)?;
        ensure!(graph.len() == len, "unexpected node count {}", graph.len());
        Ok(())
    }

    #[rstest]
    fn swift_toolchain_defaults_to_the_swift_platform() -> Result<()> {
        let toolchain = Toolchain::new(swift_toolchain())?;
        ensure!(
            toolchain.default_platform().name == SWIFT_PLATFORM,
            "default platform must build Swift"
        );
        ensure!(
            toolchain.platform(&PLAIN_PLATFORM)?.swift.is_none(),
            "plain platform has no Swift toolchain"
        );
        Ok(())
    }
}
