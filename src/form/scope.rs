use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::controller::{Direction, FormController, FormResult, LabelProps, read_lock, write_lock};
use super::validation::{FieldError, RuleSet, ValidationErrors};
use super::value::{FieldKey, Slot, ValueMap, as_sequence, as_value_map, merge_into};

pub type ChangeHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Storage seen by one scope of a form: the root map, a nested map or a sequence.
pub trait ValueStore: Send + Sync {
    /// Snapshot of the scope's values, read fresh on every call.
    fn current(&self) -> Value;

    fn write(&self, slot: Slot, value: Value) -> FormResult<()>;

    /// Root and object scopes merge a partial map; array scopes replace the sequence.
    fn write_all(&self, values: Value) -> FormResult<()>;
}

impl ValueStore for FormController {
    fn current(&self) -> Value {
        match self.values() {
            Ok(values) => Value::Object(values),
            Err(error) => {
                tracing::warn!(%error, "reading form values failed, scope sees an empty map");
                Value::Object(ValueMap::new())
            }
        }
    }

    fn write(&self, slot: Slot, value: Value) -> FormResult<()> {
        self.set_value(FieldKey::owned(slot.map_key()), value)
    }

    fn write_all(&self, values: Value) -> FormResult<()> {
        match values {
            Value::Object(partial) => self.set_values(partial),
            other => {
                tracing::warn!(kind = ?other, "ignoring non-map values written to form");
                Ok(())
            }
        }
    }
}

/// Where a sub-form reads its value from and sends its changes to.
pub trait ValueSource: Send + Sync {
    fn read(&self) -> Option<Value>;

    fn emit(&self, next: Value) -> FormResult<()>;
}

struct ParentSlot {
    store: Arc<dyn ValueStore>,
    slot: Slot,
}

impl ValueSource for ParentSlot {
    fn read(&self) -> Option<Value> {
        self.slot.read(&self.store.current())
    }

    fn emit(&self, next: Value) -> FormResult<()> {
        self.store.write(self.slot.clone(), next)
    }
}

/// Externally supplied value plus its change handler.
///
/// The held value is always the latest one: the host refreshes it with
/// [`ExternalValue::update_value`], and every emitted change is written through so that
/// consecutive writes compose.
#[derive(Clone)]
pub struct ExternalValue {
    held: Arc<RwLock<Option<Value>>>,
    on_change: ChangeHandler,
}

impl ExternalValue {
    pub fn new(value: Option<Value>, on_change: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        Self {
            held: Arc::new(RwLock::new(value)),
            on_change: Arc::new(on_change),
        }
    }

    pub fn update_value(&self, value: Option<Value>) -> FormResult<()> {
        *write_lock(&self.held, "updating external value")? = value;
        Ok(())
    }

    pub fn value(&self) -> FormResult<Option<Value>> {
        Ok(read_lock(&self.held, "reading external value")?.clone())
    }
}

impl Debug for ExternalValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalValue")
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}

impl ValueSource for ExternalValue {
    fn read(&self) -> Option<Value> {
        self.value().ok().flatten()
    }

    fn emit(&self, next: Value) -> FormResult<()> {
        self.update_value(Some(next.clone()))?;
        (self.on_change)(&next);
        Ok(())
    }
}

struct ObjectStore {
    source: Arc<dyn ValueSource>,
}

impl ValueStore for ObjectStore {
    fn current(&self) -> Value {
        Value::Object(as_value_map(self.source.read().as_ref()))
    }

    fn write(&self, slot: Slot, value: Value) -> FormResult<()> {
        let mut next = as_value_map(self.source.read().as_ref());
        next.insert(slot.map_key(), value);
        self.source.emit(Value::Object(next))
    }

    fn write_all(&self, values: Value) -> FormResult<()> {
        let Value::Object(partial) = values else {
            tracing::warn!("ignoring non-map values written to object scope");
            return Ok(());
        };
        let mut next = as_value_map(self.source.read().as_ref());
        merge_into(&mut next, partial);
        self.source.emit(Value::Object(next))
    }
}

/// Most `null` entries a single write may pad an array with.
const MAX_ARRAY_PADDING: usize = 4096;

struct ArrayStore {
    source: Arc<dyn ValueSource>,
}

impl ValueStore for ArrayStore {
    fn current(&self) -> Value {
        Value::Array(as_sequence(self.source.read().as_ref()))
    }

    fn write(&self, slot: Slot, value: Value) -> FormResult<()> {
        let Some(index) = slot.index() else {
            tracing::warn!(slot = %slot, "ignoring non-index write to array scope");
            return Ok(());
        };
        let mut next = as_sequence(self.source.read().as_ref());
        if index.saturating_sub(next.len()) > MAX_ARRAY_PADDING {
            tracing::warn!(index, len = next.len(), "ignoring array write far past the end");
            return Ok(());
        }
        match next.get_mut(index) {
            Some(slot) => *slot = value,
            None => {
                next.resize(index, Value::Null);
                next.push(value);
            }
        }
        self.source.emit(Value::Array(next))
    }

    fn write_all(&self, values: Value) -> FormResult<()> {
        match values {
            Value::Array(items) => self.source.emit(Value::Array(items)),
            other => {
                tracing::warn!(kind = ?other, "ignoring non-sequence values written to array scope");
                Ok(())
            }
        }
    }
}

/// Control surface handed down a form tree.
///
/// Values and writes go through the scope's store; submission, validation, registration and
/// presentation always belong to the root form.
#[derive(Clone)]
pub struct FormContext {
    controller: FormController,
    store: Arc<dyn ValueStore>,
    label_props: LabelProps,
    direction: Direction,
    disabled: bool,
}

impl FormContext {
    pub fn root(controller: &FormController) -> Self {
        let options = controller.options();
        Self {
            controller: controller.clone(),
            store: Arc::new(controller.clone()),
            label_props: options.label_props.clone(),
            direction: options.direction,
            disabled: options.disabled,
        }
    }

    pub fn controller(&self) -> &FormController {
        &self.controller
    }

    pub fn data(&self) -> FormResult<ValueMap> {
        self.controller.data()
    }

    pub fn default_values(&self) -> FormResult<ValueMap> {
        self.controller.default_values()
    }

    /// Values of this scope: a map for root and object scopes, a sequence for array scopes.
    pub fn values(&self) -> Value {
        self.store.current()
    }

    pub fn value(&self, slot: impl Into<Slot>) -> Option<Value> {
        slot.into().read(&self.store.current())
    }

    pub fn set_value(&self, slot: impl Into<Slot>, value: Value) -> FormResult<()> {
        self.store.write(slot.into(), value)
    }

    pub fn set_values(&self, values: Value) -> FormResult<()> {
        self.store.write_all(values)
    }

    pub async fn submit(&self) -> FormResult<()> {
        self.controller.submit().await
    }

    pub fn reset(&self) -> FormResult<()> {
        self.controller.reset()
    }

    pub async fn validate(&self) -> FormResult<()> {
        self.controller.validate().await
    }

    pub fn add_item(&self, field: impl Into<FieldKey>, rules: RuleSet) -> FormResult<()> {
        self.controller.add_item(field, rules)
    }

    pub fn validate_errors(&self) -> FormResult<Option<ValidationErrors>> {
        self.controller.validate_errors()
    }

    pub fn field_error(&self, field: &str) -> FormResult<Option<FieldError>> {
        self.controller.field_error(field)
    }

    pub fn label_props(&self) -> &LabelProps {
        &self.label_props
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    pub fn with_label_props(mut self, label_props: LabelProps) -> Self {
        self.label_props = label_props;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Object sub-form over one slot of this scope, re-merged into it on every write.
    pub fn object(&self, slot: impl Into<Slot>) -> ObjectScope {
        ObjectScope::new(self, self.parent_slot(slot.into()), None)
    }

    /// Object sub-form over an externally owned value.
    pub fn object_with(&self, external: ExternalValue) -> ObjectScope {
        ObjectScope::new(self, Arc::new(external.clone()), Some(external))
    }

    /// Array sub-form over one slot of this scope.
    pub fn array(&self, slot: impl Into<Slot>) -> ArrayScope {
        ArrayScope::new(self, self.parent_slot(slot.into()), None)
    }

    /// Array sub-form over an externally owned sequence.
    pub fn array_with(&self, external: ExternalValue) -> ArrayScope {
        ArrayScope::new(self, Arc::new(external.clone()), Some(external))
    }

    fn parent_slot(&self, slot: Slot) -> Arc<dyn ValueSource> {
        Arc::new(ParentSlot {
            store: self.store.clone(),
            slot,
        })
    }

    fn rescoped(&self, store: Arc<dyn ValueStore>) -> Self {
        Self {
            controller: self.controller.clone(),
            store,
            label_props: self.label_props.clone(),
            direction: self.direction,
            disabled: self.disabled,
        }
    }
}

impl Debug for FormContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormContext")
            .field("values", &self.store.current())
            .field("direction", &self.direction)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ObjectScope {
    context: FormContext,
    external: Option<ExternalValue>,
}

impl ObjectScope {
    fn new(
        parent: &FormContext,
        source: Arc<dyn ValueSource>,
        external: Option<ExternalValue>,
    ) -> Self {
        Self {
            context: parent.rescoped(Arc::new(ObjectStore { source })),
            external,
        }
    }

    pub fn context(&self) -> &FormContext {
        &self.context
    }

    pub fn values(&self) -> ValueMap {
        as_value_map(Some(&self.context.values()))
    }

    pub fn set_value(&self, field: impl Into<FieldKey>, value: Value) -> FormResult<()> {
        self.context.set_value(Slot::Field(field.into()), value)
    }

    pub fn set_values(&self, partial: ValueMap) -> FormResult<()> {
        self.context.set_values(Value::Object(partial))
    }

    /// Refreshes the externally supplied value; no-op for slot-backed scopes.
    pub fn update_value(&self, value: Option<Value>) -> FormResult<()> {
        match &self.external {
            Some(external) => external.update_value(value),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArrayItem {
    pub value: Value,
    pub index: usize,
    pub values: Vec<Value>,
}

#[derive(Clone)]
pub struct ArrayScope {
    context: FormContext,
    store: Arc<ArrayStore>,
    external: Option<ExternalValue>,
}

impl ArrayScope {
    fn new(
        parent: &FormContext,
        source: Arc<dyn ValueSource>,
        external: Option<ExternalValue>,
    ) -> Self {
        let store = Arc::new(ArrayStore { source });
        Self {
            context: parent.rescoped(store.clone()),
            store,
            external,
        }
    }

    pub fn context(&self) -> &FormContext {
        &self.context
    }

    pub fn values(&self) -> Vec<Value> {
        as_sequence(Some(&self.store.current()))
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    pub fn set_value(&self, index: usize, value: Value) -> FormResult<()> {
        self.store.write(Slot::Index(index), value)
    }

    pub fn set_values(&self, values: Vec<Value>) -> FormResult<()> {
        self.store.write_all(Value::Array(values))
    }

    pub fn items(&self) -> Vec<ArrayItem> {
        let values = self.values();
        values
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, value)| ArrayItem {
                value,
                index,
                values: values.clone(),
            })
            .collect()
    }

    /// One result per element, in order.
    pub fn render_items<R>(&self, render: impl FnMut(ArrayItem) -> R) -> Vec<R> {
        self.items().into_iter().map(render).collect()
    }

    /// Object sub-form over the element at `index`.
    pub fn item(&self, index: usize) -> ObjectScope {
        self.context.object(Slot::Index(index))
    }

    pub fn apply(&self, action: &ArrayAction) -> FormResult<()> {
        self.set_values(action.transform(self.values()))
    }

    pub fn update_value(&self, value: Option<Value>) -> FormResult<()> {
        match &self.external {
            Some(external) => external.update_value(value),
            None => Ok(()),
        }
    }
}

type ArrayTransform = Arc<dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync>;

/// Whole-sequence edit applied to a copy of an array scope's current values.
#[derive(Clone)]
pub struct ArrayAction {
    transform: ArrayTransform,
}

impl ArrayAction {
    pub fn new(transform: impl Fn(Vec<Value>) -> Vec<Value> + Send + Sync + 'static) -> Self {
        Self {
            transform: Arc::new(transform),
        }
    }

    pub fn push(value: Value) -> Self {
        Self::new(move |mut items| {
            items.push(value.clone());
            items
        })
    }

    pub fn remove(index: usize) -> Self {
        Self::new(move |mut items| {
            if index < items.len() {
                items.remove(index);
            }
            items
        })
    }

    pub fn swap(a: usize, b: usize) -> Self {
        Self::new(move |mut items| {
            if a < items.len() && b < items.len() {
                items.swap(a, b);
            }
            items
        })
    }

    pub fn transform(&self, items: Vec<Value>) -> Vec<Value> {
        (self.transform)(items)
    }
}

impl Debug for ArrayAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ArrayAction(..)")
    }
}
