//! Focus-on-invalid
//!
//! After a failed `valid()` the controller moves focus to the first failing
//! field, in the host form's document order. The host is reached through the
//! [`FocusHost`] trait; hosts without a focus API (tests, headless use) use
//! [`NoopFocusHost`] and nothing happens. A missing form or missing element
//! is not an error.

use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Element ID convention shared with the widget bindings: `"{form_id}-{name}"`
pub fn element_id(form_id: &str, name: &str) -> String {
    if form_id.is_empty() {
        name.to_string()
    } else {
        format!("{form_id}-{name}")
    }
}

/// Host side of focus management
pub trait FocusHost: Send + Sync {
    /// Names of the focusable elements inside form `form_id`, in document
    /// order; `None` if the form cannot be found
    fn focusable_names(&self, form_id: &str) -> Option<Vec<String>>;

    /// Move focus to the element called `name` inside form `form_id`
    fn focus(&self, form_id: &str, name: &str);
}

/// Host without a focus API
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopFocusHost;

impl FocusHost for NoopFocusHost {
    fn focusable_names(&self, _form_id: &str) -> Option<Vec<String>> {
        None
    }

    fn focus(&self, _form_id: &str, _name: &str) {}
}

/// Callback for focus management, called with the element ID to focus
pub type FocusCallback = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Focus host for frameworks that focus elements by string ID
///
/// Forms register their field order as they are laid out; focusing calls the
/// callback with [`element_id`].
pub struct CallbackFocusHost {
    forms: RwLock<IndexMap<String, Vec<String>>>,
    callback: FocusCallback,
}

impl CallbackFocusHost {
    pub fn new(callback: FocusCallback) -> Self {
        Self {
            forms: RwLock::new(IndexMap::new()),
            callback,
        }
    }

    /// Record the document order of a form's focusable fields
    pub fn register_form<I, S>(&self, form_id: impl Into<String>, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(form_id.into(), names.into_iter().map(Into::into).collect());
    }

    pub fn unregister_form(&self, form_id: &str) {
        self.forms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(form_id);
    }
}

impl FocusHost for CallbackFocusHost {
    fn focusable_names(&self, form_id: &str) -> Option<Vec<String>> {
        self.forms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(form_id)
            .cloned()
    }

    fn focus(&self, form_id: &str, name: &str) {
        (self.callback)(Some(&element_id(form_id, name)));
    }
}

/// Focus the first element (in document order) whose name is in `failing`
///
/// Returns the focused field name, if any.
pub fn focus_first_invalid(host: &dyn FocusHost, form_id: &str, failing: &[String]) -> Option<String> {
    let Some(names) = host.focusable_names(form_id) else {
        tracing::debug!(form_id, "focus target missing: no such form");
        return None;
    };
    let target = names.into_iter().find(|name| failing.contains(name))?;
    tracing::debug!(form_id, field = %target, "focusing first invalid field");
    host.focus(form_id, &target);
    Some(target)
}
