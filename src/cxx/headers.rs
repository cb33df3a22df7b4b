//! Private header symlink trees.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

use crate::graph::CxxArgs;
use crate::registry::{BuildRule, RuleId, RuleKind, TypedRule, shared};
use crate::resolver::RuleResolver;
use crate::target::BuildTarget;

/// Directory of links exposing a target's private headers under their
/// include names.
#[derive(Debug)]
pub struct HeaderTree {
    target: BuildTarget,
    root: Utf8PathBuf,
    links: IndexMap<Utf8PathBuf, Utf8PathBuf>,
    symlinks: bool,
}

impl HeaderTree {
    /// Lay out `headers` under the target's output directory.
    ///
    /// When `symlinks` is false the headers are only recorded; consumers
    /// resolve them through the include directory without a link farm.
    #[must_use]
    pub fn new(
        target: BuildTarget,
        headers: &[Utf8PathBuf],
        symlinks: bool,
        out_root: &Utf8Path,
    ) -> Self {
        let root = target.output_dir(out_root);
        let links = headers
            .iter()
            .map(|header| {
                let name = header.file_name().unwrap_or(header.as_str());
                (root.join(name), header.clone())
            })
            .collect();
        Self {
            target,
            root,
            links,
            symlinks,
        }
    }

    /// Directory added to the include path.
    #[must_use]
    pub fn include_dir(&self) -> &Utf8Path {
        &self.root
    }

    /// Link path to source header mapping.
    #[must_use]
    pub const fn links(&self) -> &IndexMap<Utf8PathBuf, Utf8PathBuf> {
        &self.links
    }

    /// Whether the tree is materialised as symlinks.
    #[must_use]
    pub const fn uses_symlinks(&self) -> bool {
        self.symlinks
    }
}

impl BuildRule for HeaderTree {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        Self::KIND
    }

    fn build_deps(&self) -> &[RuleId] {
        &[]
    }

    fn output(&self) -> Option<&Utf8Path> {
        Some(&self.root)
    }
}

impl TypedRule for HeaderTree {
    const KIND: RuleKind = RuleKind::HeaderTree;
}

/// Build a header tree over `headers` for `target`.
///
/// Libraries may override the toolchain's symlink default; binaries always
/// use symlinks.
pub(super) fn describe(
    resolver: &RuleResolver,
    target: &BuildTarget,
    args: CxxArgs<'_>,
    headers: &[Utf8PathBuf],
) -> Arc<dyn BuildRule> {
    let toolchain = resolver.toolchain();
    let symlinks = match args {
        CxxArgs::Library(library) => library
            .private_headers_symlinks
            .unwrap_or(toolchain.private_headers_symlinks()),
        CxxArgs::Binary(_) => true,
    };
    shared(HeaderTree::new(
        target.clone(),
        headers,
        symlinks,
        toolchain.out_root(),
    ))
}
