//! Live evaluator surface.
//!
//! Scripts run synchronously on the caller's thread against a fixed set of
//! injected bindings. Every edit fully replaces the previous evaluation, and
//! a fault replaces the preview with its message instead of propagating.

mod scope;
mod script;

pub use scope::{Action, Store, Value};
pub use script::{Element, EvalError, Script, View, evaluate};

use crate::editor::escape_html;

/// Interactive surface for a live block.
#[derive(Debug, Clone)]
pub struct LiveSurface {
    code: String,
    store: Store,
    outcome: Result<View, EvalError>,
}

impl LiveSurface {
    /// Mount with a fresh store and evaluate once.
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let store = Store::default();
        let outcome = evaluate(&code, &store);
        Self {
            code,
            store,
            outcome,
        }
    }

    /// Current editable code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Replace the code and re-evaluate.
    pub fn edit(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.reevaluate();
    }

    /// Press the button at `index` in the current view.
    ///
    /// Dispatches its action and re-evaluates. Returns `false` when there is
    /// no button at that position.
    pub fn click(&mut self, index: usize) -> bool {
        let action = match self.view().and_then(|view| view.get(index)) {
            Some(Element::Button { action, .. }) => *action,
            _ => return false,
        };
        self.store.dispatch(action);
        self.reevaluate();
        true
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Rendered view, if the last evaluation succeeded.
    pub fn view(&self) -> Option<&View> {
        self.outcome.as_ref().ok()
    }

    /// Fault of the last evaluation, if any.
    pub fn error(&self) -> Option<&EvalError> {
        self.outcome.as_ref().err()
    }

    fn reevaluate(&mut self) {
        self.outcome = evaluate(&self.code, &self.store);
        if let Err(e) = &self.outcome {
            tracing::debug!("Live evaluation failed: {}", e);
        }
    }

    /// HTML fragment: preview (or error) followed by the editable source.
    pub fn to_html(&self) -> String {
        let mut html = String::from("<div class=\"codefence-live\">\n");

        match &self.outcome {
            Ok(view) => {
                html.push_str("<div class=\"live-preview\">");
                for (index, element) in view.iter().enumerate() {
                    match element {
                        Element::Text(text) => {
                            html.push_str(&format!("<p>{}</p>", escape_html(text)));
                        }
                        Element::Button { label, action } => {
                            html.push_str(&format!(
                                "<button data-index=\"{}\" data-action=\"{}\">{}</button>",
                                index,
                                action.name(),
                                escape_html(label)
                            ));
                        }
                    }
                }
                html.push_str("</div>\n");
            }
            Err(e) => {
                html.push_str(&format!(
                    "<pre class=\"live-error\">{}</pre>\n",
                    escape_html(&e.to_string())
                ));
            }
        }

        html.push_str(&format!(
            "<pre class=\"live-editor\"><code>{}</code></pre>\n</div>",
            escape_html(&self.code)
        ));
        html
    }
}
