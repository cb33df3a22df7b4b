//! Cross-toolchain capabilities.
//!
//! Rules expose capabilities through [`BuildRule::as_native_linkable`] and
//! [`BuildRule::as_preprocessor_dep`] so that a consumer written for one
//! toolchain can link against, or include headers from, a rule produced by
//! another without knowing its concrete type.
//!
//! [`BuildRule::as_native_linkable`]: crate::registry::BuildRule::as_native_linkable
//! [`BuildRule::as_preprocessor_dep`]: crate::registry::BuildRule::as_preprocessor_dep

pub mod linkable;
pub mod preprocessor;

pub use linkable::{
    LinkStyle, LinkableDep, Linkage, NativeLinkable, NativeLinkableInput, collect_link_input,
    linkable_deps,
};
pub use preprocessor::{
    IncludeDir, IncludeKind, PreprocessorDep, PreprocessorInput, TransitiveInput,
    TransitiveInputCache, compute_transitive_input, transitive_preprocessor_input_of,
};
