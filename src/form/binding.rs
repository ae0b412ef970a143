use std::sync::Arc;

use serde_json::Value;

use super::controller::{Direction, FormResult, LabelProps};
use super::registry::FieldId;
use super::scope::{ChangeHandler, FormContext};
use super::validation::{FieldError, RuleSet};
use super::value::{FieldKey, Slot, merge_into};

/// Connects one field name of the in-scope form to one editable value.
///
/// Mounting registers the binder in the form's field registry; dropping it unmounts it.
/// Rule sets registered by a binder outlive it.
pub struct FieldBinder {
    context: FormContext,
    id: FieldId,
    field: FieldKey,
    rules: RuleSet,
    label: Option<String>,
    label_props: LabelProps,
    direction: Option<Direction>,
    required: bool,
    disabled: Option<bool>,
    multiple: bool,
}

/// What a label wrapper needs to draw a bound field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldPresentation {
    pub label: Option<String>,
    pub label_props: LabelProps,
    pub required: bool,
    pub horizontal: bool,
    pub disabled: bool,
    pub error: Option<String>,
}

impl FieldBinder {
    pub fn mount(
        context: &FormContext,
        field: impl Into<FieldKey>,
        rules: RuleSet,
    ) -> FormResult<Self> {
        let field = field.into();
        let controller = context.controller();
        if !rules.is_empty() {
            controller.add_item(field.clone(), rules.clone())?;
        }
        let id = controller.mount_field(field.clone())?;
        Ok(Self {
            context: context.clone(),
            id,
            field,
            rules,
            label: None,
            label_props: LabelProps::new(),
            direction: None,
            required: false,
            disabled: None,
            multiple: false,
        })
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label_props(mut self, label_props: LabelProps) -> Self {
        self.label_props = label_props;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    /// Edits several fields at once: the bound value is the whole scope and changes are
    /// merged into it.
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn field(&self) -> &FieldKey {
        &self.field
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn context(&self) -> &FormContext {
        &self.context
    }

    /// Re-points the binder at another field name, re-registering its rules under the new
    /// name. The old name's rule set is left in place.
    pub fn set_field(&mut self, field: impl Into<FieldKey>) -> FormResult<()> {
        let field = field.into();
        if field == self.field {
            return Ok(());
        }
        let controller = self.context.controller();
        if !self.rules.is_empty() {
            controller.add_item(field.clone(), self.rules.clone())?;
        }
        controller.rename_field(self.id, field.clone())?;
        self.field = field;
        Ok(())
    }

    pub fn set_rules(&mut self, rules: RuleSet) -> FormResult<()> {
        if !rules.is_empty() {
            self.context
                .controller()
                .add_item(self.field.clone(), rules.clone())?;
        }
        self.rules = rules;
        Ok(())
    }

    pub fn value(&self) -> Option<Value> {
        if self.multiple {
            return Some(self.context.values());
        }
        self.context.value(self.slot())
    }

    pub fn change(&self, value: Value) -> FormResult<()> {
        if self.multiple {
            return self.context.set_values(value);
        }
        self.context.set_value(self.slot(), value)
    }

    pub fn error(&self) -> FormResult<Option<FieldError>> {
        self.context.field_error(self.field.as_str())
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(self.context.disabled())
    }

    pub fn is_horizontal(&self) -> bool {
        self.direction.unwrap_or(self.context.direction()) == Direction::Horizontal
    }

    /// Form-level label props overridden by the binder's own.
    pub fn merged_label_props(&self) -> LabelProps {
        let mut merged = self.context.label_props().clone();
        merge_into(&mut merged, self.label_props.clone());
        merged
    }

    pub fn presentation(&self) -> FormResult<FieldPresentation> {
        let error = match &self.label {
            Some(_) => self.error()?.map(|error| error.message),
            None => None,
        };
        Ok(FieldPresentation {
            label: self.label.clone(),
            label_props: self.merged_label_props(),
            required: self.required,
            horizontal: self.is_horizontal(),
            disabled: self.is_disabled(),
            error,
        })
    }

    pub fn bind<W: FieldWidget>(self, widget: W) -> BoundWidget<W> {
        BoundWidget::new(self, widget)
    }

    fn slot(&self) -> Slot {
        Slot::Field(self.field.clone())
    }
}

impl Drop for FieldBinder {
    fn drop(&mut self) {
        if let Err(error) = self.context.controller().unmount_field(self.id) {
            tracing::warn!(field = %self.field, %error, "failed to unmount field binder");
        }
    }
}

/// Input widget that can display a bound value.
pub trait FieldWidget {
    fn sync(&mut self, value: Option<&Value>, disabled: bool);
}

/// Widget wrapped with its binder: each change runs the widget's own handler, then writes
/// through the binder, then re-syncs the widget.
pub struct BoundWidget<W> {
    widget: W,
    binder: FieldBinder,
    handler: Option<ChangeHandler>,
}

impl<W: FieldWidget> BoundWidget<W> {
    pub fn new(binder: FieldBinder, widget: W) -> Self {
        let mut bound = Self {
            widget,
            binder,
            handler: None,
        };
        bound.refresh();
        bound
    }

    pub fn on_change(mut self, handler: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn binder(&self) -> &FieldBinder {
        &self.binder
    }

    pub fn binder_mut(&mut self) -> &mut FieldBinder {
        &mut self.binder
    }

    pub fn change(&mut self, value: Value) -> FormResult<()> {
        if let Some(handler) = &self.handler {
            handler(&value);
        }
        self.binder.change(value)?;
        self.refresh();
        Ok(())
    }

    pub fn refresh(&mut self) {
        let value = self.binder.value();
        self.widget.sync(value.as_ref(), self.binder.is_disabled());
    }
}

type ClickHandler = Arc<dyn Fn() + Send + Sync>;

/// Clickable that submits the in-scope form after its own click handler.
#[derive(Clone)]
pub struct SubmitTrigger {
    context: FormContext,
    handler: Option<ClickHandler>,
}

impl SubmitTrigger {
    pub fn new(context: &FormContext) -> Self {
        Self {
            context: context.clone(),
            handler: None,
        }
    }

    pub fn on_click(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub async fn click(&self) -> FormResult<()> {
        if let Some(handler) = &self.handler {
            handler();
        }
        self.context.submit().await
    }
}

/// Clickable that resets the in-scope form after its own click handler.
#[derive(Clone)]
pub struct ResetTrigger {
    context: FormContext,
    handler: Option<ClickHandler>,
}

impl ResetTrigger {
    pub fn new(context: &FormContext) -> Self {
        Self {
            context: context.clone(),
            handler: None,
        }
    }

    pub fn on_click(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn click(&self) -> FormResult<()> {
        if let Some(handler) = &self.handler {
            handler();
        }
        self.context.reset()
    }
}
