//! Process-wide HTML policy.
//!
//! Every string that becomes markup (template source text and values bound to
//! `:innerHTML`) passes through the installed [`HtmlPolicy`] first. The policy
//! can be installed once; until then markup passes through unchanged.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Sanitizer applied to strings before they are parsed as markup.
pub trait HtmlPolicy: Send + Sync {
    /// Return the markup that should actually be parsed for `html`.
    fn create_html(&self, html: &str) -> String;
}

impl<F> HtmlPolicy for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn create_html(&self, html: &str) -> String {
        self(html)
    }
}

static HTML_POLICY: RwLock<Option<Arc<dyn HtmlPolicy>>> = RwLock::new(None);

/// Install the process-wide HTML policy.
///
/// Fails with [`Error::HtmlPolicyAlreadySet`] when a policy was installed
/// before; the first policy stays in effect.
pub fn set_html_policy(policy: impl HtmlPolicy + 'static) -> Result<()> {
    let mut slot = HTML_POLICY.write();
    if slot.is_some() {
        return Err(Error::HtmlPolicyAlreadySet);
    }
    *slot = Some(Arc::new(policy));
    Ok(())
}

/// Run `html` through the installed policy.
pub(crate) fn create_html(html: &str) -> String {
    // clone out so a policy may itself read the slot
    let policy = HTML_POLICY.read().clone();
    match policy {
        Some(policy) => policy.create_html(html),
        None => html.to_owned(),
    }
}
