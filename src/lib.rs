pub mod form;
pub mod i18n;
pub mod prelude;

pub use form::{FormContext, FormController, FormError, FormOptions, FormResult};
pub use i18n::{I18nManager, Locale};
