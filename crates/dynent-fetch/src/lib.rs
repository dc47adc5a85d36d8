//! Fetch plans over dynamic entity graphs.
//!
//! A [`FetchPlan`] names the attributes of a type, and through nested plans
//! of the types it references, that one traversal must visit. Once bound to
//! a type with [`FetchPlan::initialize`] a plan drives three operations:
//!
//! - **fetch**: materialize every planned attribute ([`FetchPlan::fetch`])
//! - **copy**: produce a detached subgraph holding only planned attributes
//!   ([`FetchPlan::copy`])
//! - **merge**: apply planned attributes onto managed instances found by
//!   primary key ([`FetchPlan::merge`])
//!
//! Every traversal is cycle-safe: fetch keeps a visited set, copy and merge
//! keep an identity map from source instance to result.
//!
//! Unless a plan is built with [`FetchPlan::without_auto_keys`], binding it
//! adds the type's key and version attributes, so a partial copy can always
//! be merged back.

pub mod copy;
pub mod error;
pub mod merge;
pub mod plan;
pub mod traversal;

pub use error::{FetchError, FetchResult};
pub use merge::{MergeContext, DEFAULT_MAX_MERGE_DEPTH};
pub use plan::{FetchItem, FetchPlan};
pub use traversal::{FetchContext, FetchReport, TraversalState};
