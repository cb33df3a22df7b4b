//! Infer static-analysis pipeline for C/C++ rules.
//!
//! Appending an Infer stage flavour to a C/C++ library or binary target
//! selects one of four derived rules:
//!
//! | flavour | rule |
//! |---|---|
//! | `infer` | [`InferReport`] over the target's analysis |
//! | `infer-analyze` | [`InferAnalyze`] over own captures and dependency analyses |
//! | `infer-capture-only` | [`InferAggregator`] over own captures and dependency aggregators |
//! | `infer-capture-all` | [`InferCaptureTransitive`] flattening every reachable capture |
//!
//! Each source is captured by its own [`InferCapture`] rule, addressed by the
//! clean target plus `infer-capture` and a flavour derived from the source
//! path.

use std::sync::{Arc, LazyLock};

use camino::Utf8Path;
use indexmap::IndexSet;
use tracing::debug;

use crate::config::InferConfig;
use crate::cxx::{self, HEADER_TREE_FLAVOUR};
use crate::error::{DeriveError, Result};
use crate::flavour::{FlavourConvertible, FlavourDomain};
use crate::graph::CxxArgs;
use crate::platform::CxxPlatform;
use crate::registry::{BuildRule, RuleId, TypedRule, shared};
use crate::resolver::RuleResolver;
use crate::target::{BuildTarget, Flavour};
use crate::traversal::require_transitive_libraries;

mod rules;

pub use rules::{
    CaptureSpec, InferAggregator, InferAnalyze, InferCapture, InferCaptureTransitive, InferReport,
};

/// Flavour carried by per-source capture rules.
pub const INFER_CAPTURE_FLAVOUR: Flavour = Flavour::from_static("infer-capture");

/// Infer pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum InferFlavour {
    /// Analyse and report.
    Report,
    /// Analyse only.
    Analyze,
    /// Flatten every transitive capture.
    CaptureAll,
    /// Aggregate captures without analysing.
    Aggregate,
}

impl FlavourConvertible for InferFlavour {
    fn flavour(&self) -> Flavour {
        match self {
            Self::Report => Flavour::from_static("infer"),
            Self::Analyze => Flavour::from_static("infer-analyze"),
            Self::CaptureAll => Flavour::from_static("infer-capture-all"),
            Self::Aggregate => Flavour::from_static("infer-capture-only"),
        }
    }
}

/// The mutually exclusive Infer stage domain.
pub static INFER_FLAVOURS: LazyLock<FlavourDomain<InferFlavour>> = LazyLock::new(|| {
    FlavourDomain::from_values(
        "Infer flavours",
        [
            InferFlavour::Report,
            InferFlavour::Analyze,
            InferFlavour::CaptureAll,
            InferFlavour::Aggregate,
        ],
    )
});

/// Derives Infer rules for one C/C++ target node.
#[derive(Debug)]
pub struct InferEnhancer<'a> {
    resolver: &'a RuleResolver,
    args: CxxArgs<'a>,
    platform: Arc<CxxPlatform>,
}

impl<'a> InferEnhancer<'a> {
    /// Bind the enhancer to a node's arguments and the platform selected by
    /// `target`.
    ///
    /// # Errors
    ///
    /// Fails when the target carries more than one platform flavour.
    pub fn new(resolver: &'a RuleResolver, target: &BuildTarget, args: CxxArgs<'a>) -> Result<Self> {
        Ok(Self {
            resolver,
            args,
            platform: resolver.platform_for(target)?,
        })
    }

    /// Build the rule for `target`, whose stage flavour selects the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::MissingStageFlavour`] when `target` carries no
    /// stage flavour, and propagates derivation failures.
    pub fn require(&self, target: &BuildTarget) -> Result<Arc<dyn BuildRule>> {
        let Some(stage) = INFER_FLAVOURS.value_of(target)? else {
            return Err(DeriveError::MissingStageFlavour {
                target: target.clone(),
                stage: INFER_FLAVOURS.name().to_owned(),
            });
        };
        debug!(%target, ?stage, "dispatching infer stage");
        let clean = INFER_FLAVOURS.strip(target);
        match stage {
            InferFlavour::Report => self.report(target, &clean),
            InferFlavour::Analyze => self.analyze(target, &clean),
            InferFlavour::Aggregate => self.aggregate(target, &clean),
            InferFlavour::CaptureAll => self.capture_all(target, &clean),
        }
    }

    fn report(&self, target: &BuildTarget, clean: &BuildTarget) -> Result<Arc<dyn BuildRule>> {
        let (analysis_id, analysis) =
            self.require_stage::<InferAnalyze>(clean, InferFlavour::Analyze)?;
        Ok(shared(InferReport::new(
            target.clone(),
            analysis_id,
            analysis.results_dir(),
            self.toolchain_infer(),
            self.out_root(),
        )))
    }

    fn analyze(&self, target: &BuildTarget, clean: &BuildTarget) -> Result<Arc<dyn BuildRule>> {
        let analyses =
            self.require_dependency_stage::<InferAnalyze>(clean, InferFlavour::Analyze)?;
        let specs_dirs = analyses
            .iter()
            .map(|id| {
                self.resolver
                    .typed::<InferAnalyze>(*id)
                    .map(|analysis| analysis.results_dir().to_owned())
            })
            .collect::<Result<Vec<_>>>()?;
        let captures = self.require_captures(clean)?;
        Ok(shared(InferAnalyze::new(
            target.clone(),
            captures,
            analyses,
            specs_dirs,
            self.toolchain_infer(),
            self.out_root(),
        )))
    }

    fn aggregate(&self, target: &BuildTarget, clean: &BuildTarget) -> Result<Arc<dyn BuildRule>> {
        let captures = self.require_captures(clean)?;
        let aggregators =
            self.require_dependency_stage::<InferAggregator>(clean, InferFlavour::Aggregate)?;
        Ok(shared(InferAggregator::new(
            target.clone(),
            captures,
            aggregators,
        )))
    }

    fn capture_all(&self, target: &BuildTarget, clean: &BuildTarget) -> Result<Arc<dyn BuildRule>> {
        let (_, aggregator) =
            self.require_stage::<InferAggregator>(clean, InferFlavour::Aggregate)?;
        let captures = aggregator.all_transitive_captures(self.resolver)?;
        Ok(shared(InferCaptureTransitive::new(
            target.clone(),
            captures,
            self.out_root(),
        )))
    }

    /// Require another stage of the same clean target.
    fn require_stage<T: TypedRule>(
        &self,
        clean: &BuildTarget,
        stage: InferFlavour,
    ) -> Result<(RuleId, Arc<T>)> {
        let staged = INFER_FLAVOURS.with_value(clean, &stage)?;
        self.resolver.require_typed::<T>(&staged)
    }

    /// Require `stage` for every transitive library dependency, carrying the
    /// request's platform flavours.
    fn require_dependency_stage<T: TypedRule>(
        &self,
        clean: &BuildTarget,
        stage: InferFlavour,
    ) -> Result<IndexSet<RuleId>> {
        let deps = self.resolver.declared_dependencies(clean.unflavoured())?;
        let mut flavours = vec![stage.flavour()];
        flavours.extend(self.resolver.platform_flavours(clean));
        require_transitive_libraries::<T>(self.resolver, &deps, &flavours)
    }

    /// Require one capture rule per source, in declared order. Distinct
    /// sources whose capture identities collide are rejected.
    fn require_captures(&self, clean: &BuildTarget) -> Result<IndexSet<RuleId>> {
        INFER_FLAVOURS.assert_absent(clean)?;
        let common = self.args.common();
        let header_tree = self
            .resolver
            .require_rule(&clean.with_appended_flavours([HEADER_TREE_FLAVOUR]))?;
        let preprocessor = cxx::preprocessor_input_for_sources(
            self.resolver,
            self.args,
            clean,
            &self.platform,
            header_tree,
        )?;
        let preprocessor_args = preprocessor.args();
        let mut prerequisites: IndexSet<RuleId> = IndexSet::from([header_tree]);
        prerequisites.extend(preprocessor.rules.iter().copied());
        let deps: Vec<RuleId> = prerequisites.into_iter().collect();

        let mut captures = IndexSet::new();
        for source in &common.srcs {
            let capture_target = clean.with_appended_flavours([
                INFER_CAPTURE_FLAVOUR,
                Flavour::sanitised(source.as_str()),
            ]);
            let id = self.resolver.registry().get_or_construct(&capture_target, || {
                let compiler_flags =
                    common.compiler_flags_for(source, &self.platform, clean.unflavoured())?;
                Ok(shared(InferCapture::new(
                    capture_target.clone(),
                    CaptureSpec {
                        source,
                        compiler: &self.platform.compiler,
                        compiler_flags,
                        preprocessor_args: preprocessor_args.clone(),
                        deps: deps.clone(),
                    },
                    self.toolchain_infer(),
                    self.out_root(),
                )))
            })?;
            let capture = self.resolver.typed::<InferCapture>(id)?;
            if capture.source() != source.as_path() {
                return Err(DeriveError::CaptureCollision {
                    target: clean.unflavoured().clone(),
                    capture: capture_target,
                    first: capture.source().to_owned(),
                    second: source.clone(),
                });
            }
            captures.insert(id);
        }
        Ok(captures)
    }

    fn toolchain_infer(&self) -> &InferConfig {
        self.resolver.toolchain().infer()
    }

    fn out_root(&self) -> &Utf8Path {
        self.resolver.toolchain().out_root()
    }
}
