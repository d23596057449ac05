//! Formwork Widgets
//!
//! Bindings between input widgets and a [`FormController`](formwork_core::FormController).
//!
//! - [`bind`]: controller + field name → [`FieldProps`]
//! - [`InputKind`]: raw widget events → field values
//! - [`FormInput`]: a typed, labelled input bound to one field
//!
//! # Example
//!
//! ```ignore
//! use formwork_widgets::prelude::*;
//!
//! let props = bind(&form, "email").with_error_message("Enter an email");
//! render_text_input(&props);
//!
//! // on a keystroke
//! props.change(InputKind::Text.parse_event(raw, props.value.as_ref()));
//! ```

pub mod bind;
pub mod inputs;

pub use bind::{bind, BlurHandler, ChangeHandler, FieldProps, Indicator};
pub use inputs::{FormInput, InputKind};

pub mod prelude {
    pub use crate::bind::{bind, FieldProps, Indicator};
    pub use crate::inputs::{FormInput, InputKind};
}
