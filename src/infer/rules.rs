//! Rule nodes produced by the Infer pipeline.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;

use crate::config::InferConfig;
use crate::error::Result;
use crate::registry::{BuildRule, RuleId, RuleKind, TypedRule};
use crate::resolver::RuleResolver;
use crate::traversal::breadth_first;
use crate::target::BuildTarget;

/// Results directory name inside a rule's output directory.
const RESULTS_DIR: &str = "infer-out";

/// Captures one source file into an Infer results directory.
#[derive(Debug)]
pub struct InferCapture {
    target: BuildTarget,
    source: Utf8PathBuf,
    deps: Vec<RuleId>,
    results_dir: Utf8PathBuf,
    command: Vec<String>,
}

/// Inputs for [`InferCapture::new`].
#[derive(Debug)]
pub struct CaptureSpec<'a> {
    /// Source file.
    pub source: &'a Utf8Path,
    /// Compiler driver.
    pub compiler: &'a str,
    /// Compiler flags for the source.
    pub compiler_flags: Vec<String>,
    /// Flattened preprocessor arguments.
    pub preprocessor_args: Vec<String>,
    /// Rules the capture depends on.
    pub deps: Vec<RuleId>,
}

impl InferCapture {
    /// Create a capture rule under `out_root`.
    #[must_use]
    pub fn new(
        target: BuildTarget,
        spec: CaptureSpec<'_>,
        infer: &InferConfig,
        out_root: &Utf8Path,
    ) -> Self {
        let results_dir = target.output_dir(out_root).join(RESULTS_DIR);
        let mut command = vec![infer.binary.clone(), "capture".to_owned()];
        command.extend(infer.extra_args.iter().cloned());
        command.extend([
            "--results-dir".to_owned(),
            results_dir.to_string(),
            "--".to_owned(),
            spec.compiler.to_owned(),
        ]);
        command.extend(spec.compiler_flags);
        command.extend(spec.preprocessor_args);
        command.extend(["-c".to_owned(), spec.source.to_string()]);
        Self {
            target,
            source: spec.source.to_owned(),
            deps: spec.deps,
            results_dir,
            command,
        }
    }

    /// The captured source.
    #[must_use]
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }
}

impl BuildRule for InferCapture {
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
        Some(&self.results_dir)
    }

    fn command(&self) -> Option<&[String]> {
        Some(&self.command)
    }
}

impl TypedRule for InferCapture {
    const KIND: RuleKind = RuleKind::InferCapture;
}

/// Analyses a set of captures together with the analyses of dependencies.
#[derive(Debug)]
pub struct InferAnalyze {
    target: BuildTarget,
    captures: IndexSet<RuleId>,
    transitive_analyses: IndexSet<RuleId>,
    deps: Vec<RuleId>,
    specs_dirs: Vec<Utf8PathBuf>,
    results_dir: Utf8PathBuf,
    command: Vec<String>,
}

impl InferAnalyze {
    /// Create an analysis rule. `specs_dirs` are the results directories of
    /// `transitive_analyses`, in the same order.
    #[must_use]
    pub fn new(
        target: BuildTarget,
        captures: IndexSet<RuleId>,
        transitive_analyses: IndexSet<RuleId>,
        specs_dirs: Vec<Utf8PathBuf>,
        infer: &InferConfig,
        out_root: &Utf8Path,
    ) -> Self {
        let results_dir = target.output_dir(out_root).join(RESULTS_DIR);
        let mut command = vec![infer.binary.clone(), "analyze".to_owned()];
        command.extend(infer.extra_args.iter().cloned());
        command.extend(["--results-dir".to_owned(), results_dir.to_string()]);
        for dir in &specs_dirs {
            command.extend(["--specs-library".to_owned(), dir.to_string()]);
        }
        let deps = captures
            .iter()
            .chain(&transitive_analyses)
            .copied()
            .collect();
        Self {
            target,
            captures,
            transitive_analyses,
            deps,
            specs_dirs,
            results_dir,
            command,
        }
    }

    /// Capture rules analysed by this rule.
    #[must_use]
    pub const fn captures(&self) -> &IndexSet<RuleId> {
        &self.captures
    }

    /// Analyses of transitive library dependencies.
    #[must_use]
    pub const fn transitive_analyses(&self) -> &IndexSet<RuleId> {
        &self.transitive_analyses
    }

    /// Results directories of the transitive analyses.
    #[must_use]
    pub fn specs_dirs(&self) -> &[Utf8PathBuf] {
        &self.specs_dirs
    }

    /// Directory receiving this analysis' results.
    #[must_use]
    pub fn results_dir(&self) -> &Utf8Path {
        &self.results_dir
    }
}

impl BuildRule for InferAnalyze {
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
        Some(&self.results_dir)
    }

    fn command(&self) -> Option<&[String]> {
        Some(&self.command)
    }
}

impl TypedRule for InferAnalyze {
    const KIND: RuleKind = RuleKind::InferAnalyze;
}

/// Groups the captures of a target with the aggregators of its library
/// dependencies.
#[derive(Debug)]
pub struct InferAggregator {
    target: BuildTarget,
    captures: IndexSet<RuleId>,
    transitive_aggregators: IndexSet<RuleId>,
    deps: Vec<RuleId>,
}

impl InferAggregator {
    /// Create an aggregator.
    #[must_use]
    pub fn new(
        target: BuildTarget,
        captures: IndexSet<RuleId>,
        transitive_aggregators: IndexSet<RuleId>,
    ) -> Self {
        let deps = captures
            .iter()
            .chain(&transitive_aggregators)
            .copied()
            .collect();
        Self {
            target,
            captures,
            transitive_aggregators,
            deps,
        }
    }

    /// Captures of this target's own sources.
    #[must_use]
    pub const fn captures(&self) -> &IndexSet<RuleId> {
        &self.captures
    }

    /// Aggregators of library dependencies.
    #[must_use]
    pub const fn transitive_aggregators(&self) -> &IndexSet<RuleId> {
        &self.transitive_aggregators
    }

    /// Every capture reachable through the aggregator chain: own captures
    /// first, then those of dependencies in breadth-first order.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the chain contains a rule that is not
    /// an aggregator.
    pub fn all_transitive_captures(&self, resolver: &RuleResolver) -> Result<IndexSet<RuleId>> {
        let mut captures = self.captures.clone();
        let roots = self.transitive_aggregators.iter().copied();
        breadth_first(roots, |id| -> Result<Vec<RuleId>> {
            let aggregator = resolver.typed::<Self>(*id)?;
            captures.extend(aggregator.captures.iter().copied());
            Ok(aggregator.transitive_aggregators.iter().copied().collect())
        })?;
        Ok(captures)
    }
}

impl BuildRule for InferAggregator {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        Self::KIND
    }

    fn build_deps(&self) -> &[RuleId] {
        &self.deps
    }
}

impl TypedRule for InferAggregator {
    const KIND: RuleKind = RuleKind::InferAggregator;
}

/// Produces the JSON report of an analysis.
#[derive(Debug)]
pub struct InferReport {
    target: BuildTarget,
    deps: [RuleId; 1],
    report: Utf8PathBuf,
    command: Vec<String>,
}

impl InferReport {
    /// Create a report over `analysis`.
    #[must_use]
    pub fn new(
        target: BuildTarget,
        analysis: RuleId,
        analysis_results: &Utf8Path,
        infer: &InferConfig,
        out_root: &Utf8Path,
    ) -> Self {
        let report = target.output_dir(out_root).join("report.json");
        let command = vec![
            infer.binary.clone(),
            "report".to_owned(),
            "--results-dir".to_owned(),
            analysis_results.to_string(),
            "--issues-json".to_owned(),
            report.to_string(),
        ];
        Self {
            target,
            deps: [analysis],
            report,
            command,
        }
    }

    /// The analysis being reported.
    #[must_use]
    pub const fn analysis(&self) -> RuleId {
        self.deps[0]
    }
}

impl BuildRule for InferReport {
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
        Some(&self.report)
    }

    fn command(&self) -> Option<&[String]> {
        Some(&self.command)
    }
}

impl TypedRule for InferReport {
    const KIND: RuleKind = RuleKind::InferReport;
}

/// The flattened transitive capture set of a target.
#[derive(Debug)]
pub struct InferCaptureTransitive {
    target: BuildTarget,
    captures: Vec<RuleId>,
    output: Utf8PathBuf,
}

impl InferCaptureTransitive {
    /// Create the flattened capture node.
    #[must_use]
    pub fn new(target: BuildTarget, captures: IndexSet<RuleId>, out_root: &Utf8Path) -> Self {
        let output = target.output_dir(out_root).join(RESULTS_DIR);
        Self {
            target,
            captures: captures.into_iter().collect(),
            output,
        }
    }

    /// Every capture reachable from the target.
    #[must_use]
    pub fn captures(&self) -> &[RuleId] {
        &self.captures
    }
}

impl BuildRule for InferCaptureTransitive {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        Self::KIND
    }

    fn build_deps(&self) -> &[RuleId] {
        &self.captures
    }

    fn output(&self) -> Option<&Utf8Path> {
        Some(&self.output)
    }
}

impl TypedRule for InferCaptureTransitive {
    const KIND: RuleKind = RuleKind::InferCaptureTransitive;
}
