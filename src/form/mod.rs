mod binding;
mod controller;
mod defaults;
mod model;
mod registry;
mod scope;
mod validation;
mod value;

#[cfg(test)]
mod tests;

pub use calmform_derive::FormModel;
pub use binding::{BoundWidget, FieldBinder, FieldPresentation, FieldWidget, ResetTrigger, SubmitTrigger};
pub use controller::{
    Direction, FormController, FormError, FormId, FormOptions, FormResult, LabelProps, SubmitState,
    ValidationTicket,
};
pub use defaults::{DefaultValues, DefaultsError, DefaultsFuture, DefaultsPhase};
pub use model::{FieldLens, FormModel, from_value_map, to_value_map};
pub use registry::{FieldChangeListener, FieldId, FieldRegistry};
pub use scope::{
    ArrayAction, ArrayItem, ArrayScope, ChangeHandler, ExternalValue, FormContext, ObjectScope,
    ValueSource, ValueStore,
};
pub use validation::{
    BoxedValidationFuture, FieldError, Rule, RuleKind, RuleSet, Schema, ValidationErrors, ValueKind,
};
pub use value::{FieldKey, Slot, ValueMap};
