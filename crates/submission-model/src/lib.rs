//! Form definitions, their compiled physical layout, and submission addressing.
//!
//! A [`FormDefinition`] is compiled under [`StoreLimits`] into a [`SchemaTree`]
//! (tables, columns and the phantom tables that split oversized groups) and a
//! [`FormElementTree`], the submission-facing view that hides those splits.

pub mod compile;
pub mod definition;
pub mod element;
pub mod form;
pub mod key;
pub mod limits;
pub mod schema;

pub use compile::compile;
pub use definition::{FieldKind, FieldSpec, FormDefinition};
pub use element::{
    ElementKeyError, ElementSource, FormElement, FormElementId, FormElementKey,
    FormElementNamespace, FormElementTree, FormElementType, FormElementVisitor, MetadataKind,
};
pub use form::CompiledForm;
pub use key::{FormVersion, KeyError, SubmissionKey, SubmissionKeyPart};
pub use limits::{LimitsError, StoreLimits};
pub use schema::{
    ColumnDef, ColumnType, ElementId, ElementType, NewElement, PhysicalLocation, PhysicalTable,
    SchemaElement, SchemaError, SchemaTree, TableId, TableName, TableRole,
};
