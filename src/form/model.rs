use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::controller::{FormController, FormError, FormOptions, FormResult};
use super::validation::RuleSet;
use super::value::{FieldKey, ValueMap};

/// Typed handle on one field of a [`FormModel`]. Usually generated by `#[derive(FormModel)]`.
pub trait FieldLens: Copy + Send + Sync + 'static {
    type Model: FormModel;
    type Value: Serialize + DeserializeOwned;

    fn key(self) -> FieldKey;
}

pub trait FormModel: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;

    fn field_keys() -> &'static [&'static str];
}

pub fn to_value_map<T: Serialize>(model: &T) -> FormResult<ValueMap> {
    match serde_json::to_value(model) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(FormError::Serialization {
            field: std::any::type_name::<T>().to_string(),
            message: "model did not serialize to a map".to_string(),
        }),
        Err(error) => Err(FormError::Serialization {
            field: std::any::type_name::<T>().to_string(),
            message: error.to_string(),
        }),
    }
}

pub fn from_value_map<T: DeserializeOwned>(values: ValueMap) -> FormResult<T> {
    serde_json::from_value(Value::Object(values)).map_err(|error| FormError::Serialization {
        field: std::any::type_name::<T>().to_string(),
        message: error.to_string(),
    })
}

impl FormController {
    pub fn from_model<T: FormModel>(model: &T, options: FormOptions) -> FormResult<Self> {
        Ok(Self::new(to_value_map(model)?, options))
    }

    pub fn set_field<L: FieldLens>(&self, lens: L, value: L::Value) -> FormResult<()> {
        let key = lens.key();
        let value = serde_json::to_value(value).map_err(|error| FormError::Serialization {
            field: key.to_string(),
            message: error.to_string(),
        })?;
        self.set_value(key, value)
    }

    /// Current value of a field; `None` when absent.
    pub fn field<L: FieldLens>(&self, lens: L) -> FormResult<Option<L::Value>> {
        let key = lens.key();
        let Some(value) = self.value(key.as_str())? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|error| FormError::Serialization {
                field: key.to_string(),
                message: error.to_string(),
            })
    }

    pub fn register_rules<L: FieldLens>(&self, lens: L, rules: RuleSet) -> FormResult<()> {
        self.add_item(lens.key(), rules)
    }

    /// Live values decoded into the model type.
    pub fn model<T: FormModel>(&self) -> FormResult<T> {
        from_value_map(self.values()?)
    }

    /// Committed values decoded into the model type.
    pub fn result_model<T: FormModel>(&self) -> FormResult<T> {
        from_value_map(self.data()?)
    }
}
