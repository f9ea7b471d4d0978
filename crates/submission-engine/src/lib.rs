//! Submission materialization over a compiled form layout.
//!
//! A [`Submission`] is the top-level [`SubmissionSet`] of one form instance.
//! Sets own the physical rows of their group (including phantom rows) and a
//! typed [`SubmissionValue`] per element; repeats nest further sets.

pub mod error;
pub mod format;
pub mod registry;
pub mod set;
pub mod submission;
pub mod value;

pub use error::EngineError;
pub use format::{ElementFormatter, FormattedRow};
pub use registry::FormRegistry;
pub use set::{ElementSelection, EnclosingSet, ResolvedElement, SetState, SubmissionSet, SubmissionVisitor};
pub use submission::Submission;
pub use value::{
    BlobValue, ChoiceValue, ColumnBinding, DateTimeData, DateTimeKind, DateTimeValue, GeoPoint,
    GeoPointValue, RepeatValue, ScalarKind, ScalarValue, StringValue, SubmissionValue,
};
