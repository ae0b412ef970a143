pub use crate::form::{
    ArrayAction, ArrayScope, BoundWidget, DefaultValues, Direction, ExternalValue, FieldBinder,
    FieldKey, FieldLens, FieldWidget, FormContext, FormController, FormError, FormModel,
    FormOptions, FormResult, ObjectScope, ResetTrigger, Rule, RuleSet, Slot, SubmitTrigger,
    ValidationErrors, ValueKind, ValueMap,
};
pub use crate::i18n::{I18nManager, Locale};
