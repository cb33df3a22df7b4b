//! Cross-toolchain linking and header propagation.

use anyhow::{Context, Result, ensure};
use kasane::capability::{LinkStyle, Linkage, NativeLinkable, PreprocessorDep};
use kasane::cxx::{CxxBinary, CxxLibrary};
use kasane::error::DeriveError;
use kasane::graph::{CommonCxxArgs, CxxBinaryArgs, CxxLibraryArgs, SwiftLibraryArgs};
use kasane::resolver::RuleResolver;
use kasane::swift::SwiftLibrary;
use rstest::{fixture, rstest};
use test_support::fixtures::{mixed_graph, swift_toolchain};
use test_support::{
    binary_with, library, library_args, library_with, resolver, resolver_with, swift_args,
    swift_library, swift_library_with, target, unflavoured,
};

const COMPILE_DIR: &str = "kasane-out/gen/ui/kit#macos,swift-compile";

#[fixture]
fn mixed() -> RuleResolver {
    resolver_with(mixed_graph(), swift_toolchain())
}

fn strings(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| (*s).to_owned()).collect()
}

fn ast_args() -> Vec<String> {
    strings(&[
        "-Xlinker",
        "-add_ast_path",
        "-Xlinker",
        &format!("{COMPILE_DIR}/kit.swiftmodule"),
    ])
}

#[rstest]
fn static_link_flattens_swift_objects_and_dependencies(mixed: RuleResolver) -> Result<()> {
    let (_, main) = mixed.require_typed::<CxxBinary>(&target("//app:main"))?;
    let mut expected = ast_args();
    expected.extend(strings(&[
        &format!("{COMPILE_DIR}/View.o"),
        &format!("{COMPILE_DIR}/Model.o"),
        "kasane-out/gen/core/util#macos,static/libutil.a",
        "-L/usr/lib/swift",
        "-Wl,-rpath,/usr/lib/swift",
        "-lswiftCore",
    ]));
    ensure!(
        main.link_args() == expected.as_slice(),
        "unexpected link line {:?}",
        main.link_args()
    );
    Ok(())
}

#[rstest]
fn shared_link_hides_declared_dependencies_of_the_swift_library() -> Result<()> {
    let graph = resolver_with(
        [
            binary_with(
                "//app:main",
                CxxBinaryArgs {
                    link_style: LinkStyle::Shared,
                    common: CommonCxxArgs {
                        srcs: vec!["main.c".into()],
                        deps: vec![unflavoured("//ui:kit")],
                        ..Default::default()
                    },
                    ..CxxBinaryArgs::default()
                },
            ),
            swift_library("//ui:kit", &["View.swift", "Model.swift"], &["//core:util"]),
            library("//core:util", &["util.c"], &[]),
        ],
        swift_toolchain(),
    );
    let (_, main) = graph.require_typed::<CxxBinary>(&target("//app:main"))?;
    let mut expected = ast_args();
    expected.extend(strings(&[
        "kasane-out/gen/ui/kit#macos,shared/libkit.so",
        "-L/usr/lib/swift",
        "-Wl,-rpath,/usr/lib/swift",
        "-lswiftCore",
    ]));
    ensure!(
        main.link_args() == expected.as_slice(),
        "unexpected link line {:?}",
        main.link_args()
    );
    Ok(())
}

#[rstest]
fn platforms_without_swift_contribute_nothing(mixed: RuleResolver) -> Result<()> {
    let (_, main) = mixed.require_typed::<CxxBinary>(&target("//app:main#linux"))?;
    ensure!(
        main.link_args().is_empty(),
        "unsupported Swift library must not link: {:?}",
        main.link_args()
    );
    let (_, kit) = mixed.require_typed::<SwiftLibrary>(&target("//ui:kit"))?;
    let linux = mixed.platform_for(&target("//ui:kit#linux"))?;
    ensure!(!kit.supports(&linux), "linux has no Swift toolchain");
    ensure!(
        kit.shared_libraries(&linux, &mixed)?.is_empty(),
        "no shared libraries on an unsupported platform"
    );
    ensure!(
        kit.transitive_preprocessor_input(&linux, &mixed)?.is_empty(),
        "no headers on an unsupported platform"
    );
    ensure!(
        kit.native_linkable_deps(&linux).is_empty(),
        "dependencies are hidden on an unsupported platform"
    );
    Ok(())
}

#[rstest]
fn compile_request_for_unsupported_platform_fails(mixed: RuleResolver) {
    let err = mixed
        .require_rule(&target("//ui:kit#linux,swift-compile"))
        .expect_err("linux cannot compile Swift");
    assert!(matches!(err, DeriveError::UnsupportedFlavours { .. }));
}

#[rstest]
fn supported_platforms_regex_filters_swift_libraries() -> Result<()> {
    let graph = resolver_with(
        [swift_library_with(
            "//ui:kit",
            SwiftLibraryArgs {
                supported_platforms_regex: Some("^ios".to_owned()),
                ..swift_args(&["View.swift"], &[])
            },
        )],
        swift_toolchain(),
    );
    let (_, kit) = graph.require_typed::<SwiftLibrary>(&target("//ui:kit"))?;
    let macos = graph.platform_for(&target("//ui:kit"))?;
    ensure!(!kit.supports(&macos), "regex must exclude macos");
    ensure!(
        kit.native_linkable_input(&macos, LinkStyle::Static, &graph)?
            .is_empty(),
        "excluded platform links nothing"
    );
    Ok(())
}

#[rstest]
fn shared_libraries_are_keyed_by_soname(mixed: RuleResolver) -> Result<()> {
    let (_, kit) = mixed.require_typed::<SwiftLibrary>(&target("//ui:kit"))?;
    let macos = mixed.platform_for(&target("//ui:kit"))?;
    let libraries = kit.shared_libraries(&macos, &mixed)?;
    let (soname, path) = libraries.first().context("one shared library")?;
    ensure!(soname == "libkit.so", "unexpected soname {soname}");
    ensure!(
        path.as_str() == "kasane-out/gen/ui/kit#macos,shared/libkit.so",
        "unexpected path {path}"
    );
    Ok(())
}

#[rstest]
fn runtime_deps_include_exported_dependencies() -> Result<()> {
    let graph = resolver_with(
        [
            swift_library_with(
                "//ui:kit",
                SwiftLibraryArgs {
                    exported_deps: vec![unflavoured("//core:api")],
                    ..swift_args(&["View.swift"], &["//core:util", "//core:api"])
                },
            ),
            library("//core:util", &["util.c"], &[]),
            library("//core:api", &["api.c"], &[]),
        ],
        swift_toolchain(),
    );
    let (_, kit) = graph.require_typed::<SwiftLibrary>(&target("//ui:kit"))?;
    let names = kit
        .runtime_deps()
        .iter()
        .map(|id| graph.rule(*id).map(|rule| rule.target().to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    ensure!(
        names == ["//core:util", "//core:api"],
        "runtime deps must be declared then exported without duplicates: {names:?}"
    );
    Ok(())
}

#[rstest]
fn companion_links_statically_and_keeps_headers_local(mixed: RuleResolver) -> Result<()> {
    let (_, companion) =
        mixed.require_typed::<SwiftLibrary>(&target("//ui:kit#swift-companion"))?;
    let macos = mixed.platform_for(&target("//ui:kit"))?;
    ensure!(companion.is_companion(), "flavour marks the companion");
    ensure!(
        companion.preferred_linkage(&macos) == Linkage::Static,
        "companions always link statically"
    );
    let companion_headers = companion.transitive_preprocessor_input(&macos, &mixed)?;
    ensure!(
        companion_headers.len() == 1,
        "companion must not forward dependency headers"
    );
    let (_, kit) = mixed.require_typed::<SwiftLibrary>(&target("//ui:kit"))?;
    let headers = kit.transitive_preprocessor_input(&macos, &mixed)?;
    let keys: Vec<String> = headers.keys().map(ToString::to_string).collect();
    ensure!(
        keys == ["//ui:kit", "//core:util"],
        "library forwards its dependencies' headers: {keys:?}"
    );
    let own = headers.first().map(|(_, input)| input.include_args());
    ensure!(
        own == Some(vec![format!("-I{COMPILE_DIR}")]),
        "Swift headers come from the compile output: {own:?}"
    );
    Ok(())
}

#[rstest]
fn exported_headers_and_flags_reach_dependents() -> Result<()> {
    let graph = resolver([
        library("//app:lib", &["lib.c"], &["//app:dep"]),
        library_with(
            "//app:dep",
            CxxLibraryArgs {
                exported_headers: vec!["dep.h".into()],
                exported_preprocessor_flags: vec!["-DDEP".to_owned()],
                ..library_args(&["dep.c"], &[])
            },
        ),
    ]);
    let (_, dep) = graph.require_typed::<CxxLibrary>(&target("//app:dep"))?;
    let platform = graph.platform_for(&target("//app:dep"))?;
    let input = dep.preprocessor_input(&platform, &graph)?;
    ensure!(
        input.args() == ["-DDEP", "-Ikasane-out/gen/app/dep#default,headers"],
        "unexpected preprocessor args {:?}",
        input.args()
    );
    let tree = *input.rules.first().context("header tree rule")?;
    ensure!(
        graph.rule(tree)?.target().to_string() == "//app:dep#default,headers",
        "exported tree is registered per platform"
    );
    Ok(())
}

#[rstest]
fn header_only_libraries_link_only_their_flags() -> Result<()> {
    let graph = resolver([library_with(
        "//app:hdrs",
        CxxLibraryArgs {
            exported_linker_flags: vec!["-pthread".to_owned()],
            linkage: Linkage::Any,
            ..library_args(&[], &[])
        },
    )]);
    let (_, hdrs) = graph.require_typed::<CxxLibrary>(&target("//app:hdrs"))?;
    let platform = graph.platform_for(&target("//app:hdrs"))?;
    let input = hdrs.native_linkable_input(&platform, LinkStyle::Shared, &graph)?;
    ensure!(input.args == ["-pthread"], "unexpected args {:?}", input.args);
    ensure!(
        hdrs.shared_libraries(&platform, &graph)?.is_empty(),
        "no shared library without sources"
    );
    Ok(())
}
