//! Swift module compilation.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;

use crate::capability::transitive_preprocessor_input_of;
use crate::error::Result;
use crate::graph::SwiftLibraryArgs;
use crate::platform::{CxxPlatform, SwiftPlatform};
use crate::registry::{BuildRule, RuleId, RuleKind, TypedRule};
use crate::resolver::RuleResolver;
use crate::target::BuildTarget;

use super::SwiftLibrary;

/// Compiles every source of a Swift library into objects, a
/// `.swiftmodule` and an Objective-C compatibility header.
#[derive(Debug)]
pub struct SwiftCompile {
    target: BuildTarget,
    module_name: String,
    output_dir: Utf8PathBuf,
    objects: Vec<Utf8PathBuf>,
    swiftmodule: Utf8PathBuf,
    objc_header: Utf8PathBuf,
    deps: Vec<RuleId>,
    command: Vec<String>,
}

impl SwiftCompile {
    /// Require the compile rules of Swift dependencies and the preprocessor
    /// input of C/C++ dependencies, then build the compile command.
    ///
    /// # Errors
    ///
    /// Propagates failures from dependencies.
    pub fn new(
        resolver: &RuleResolver,
        target: &BuildTarget,
        args: &SwiftLibraryArgs,
        platform: &CxxPlatform,
        swift: &SwiftPlatform,
    ) -> Result<Self> {
        let module_name = module_name(target, args);
        let output_dir = target.output_dir(resolver.toolchain().out_root());
        let objects = args
            .srcs
            .iter()
            .map(|src| {
                let stem = src.file_stem().unwrap_or(src.as_str());
                output_dir.join(format!("{stem}.o"))
            })
            .collect();
        let swiftmodule = output_dir.join(format!("{module_name}.swiftmodule"));
        let objc_header = output_dir.join(format!("{module_name}-Swift.h"));

        let declared = resolver.declared_dependencies(target.unflavoured())?;
        let mut deps = IndexSet::new();
        let mut module_dirs = Vec::new();
        for id in &declared {
            let rule = resolver.rule(*id)?;
            if rule.kind() != RuleKind::SwiftLibrary {
                continue;
            }
            let library = resolver.typed::<SwiftLibrary>(*id)?;
            if !library.supports(platform) {
                continue;
            }
            let (compile_id, compile) = library.require_compile(resolver, platform)?;
            deps.insert(compile_id);
            module_dirs.push(compile.output_dir.clone());
        }
        let preprocessor = transitive_preprocessor_input_of(&declared, platform, resolver)?;
        let mut clang_args = Vec::new();
        for input in preprocessor.values() {
            deps.extend(input.rules.iter().copied());
            clang_args.extend(input.args());
        }

        let mut command = vec![
            swift.swiftc.clone(),
            "-c".to_owned(),
            "-module-name".to_owned(),
            module_name.clone(),
            "-emit-module".to_owned(),
            "-emit-module-path".to_owned(),
            swiftmodule.to_string(),
            "-emit-objc-header-path".to_owned(),
            objc_header.to_string(),
        ];
        for dir in &module_dirs {
            command.extend(["-I".to_owned(), dir.to_string()]);
        }
        for arg in clang_args {
            command.extend(["-Xcc".to_owned(), arg]);
        }
        command.extend(args.compiler_flags.iter().cloned());
        command.extend(args.srcs.iter().map(ToString::to_string));

        Ok(Self {
            target: target.clone(),
            module_name,
            output_dir,
            objects,
            swiftmodule,
            objc_header,
            deps: deps.into_iter().collect(),
            command,
        })
    }

    /// Swift module name.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Object files, one per source.
    #[must_use]
    pub fn objects(&self) -> &[Utf8PathBuf] {
        &self.objects
    }

    /// Path of the emitted `.swiftmodule`.
    #[must_use]
    pub fn swiftmodule(&self) -> &Utf8Path {
        &self.swiftmodule
    }

    /// Path of the generated Objective-C header.
    #[must_use]
    pub fn objc_header(&self) -> &Utf8Path {
        &self.objc_header
    }

    /// Linker arguments registering the module's AST for debugging.
    #[must_use]
    pub fn ast_link_args(&self) -> Vec<String> {
        vec![
            "-Xlinker".to_owned(),
            "-add_ast_path".to_owned(),
            "-Xlinker".to_owned(),
            self.swiftmodule.to_string(),
        ]
    }
}

impl BuildRule for SwiftCompile {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        Self::KIND
    }

    fn build_deps(&self) -> &[RuleId] {
        &self.deps
    }

    fn output(&self) -> Option<&Utf8Path> {
        Some(&self.output_dir)
    }

    fn command(&self) -> Option<&[String]> {
        Some(&self.command)
    }
}

impl TypedRule for SwiftCompile {
    const KIND: RuleKind = RuleKind::SwiftCompile;
}

/// Module name of a Swift library: the declared name, or the short name
/// with dashes replaced.
pub(super) fn module_name(target: &BuildTarget, args: &SwiftLibraryArgs) -> String {
    args.module_name
        .clone()
        .unwrap_or_else(|| target.unflavoured().short_name().replace('-', "_"))
}
