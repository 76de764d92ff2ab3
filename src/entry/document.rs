//! The host page an entry is mounted into.

use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};

use url::Url;

use crate::entry::resource::Attributes;

/// Side effects an import performs on the host page.
pub trait HostDocument: Send + Sync {
    /// Origin of the host page. Raw-markup entries resolve relative
    /// references against it.
    fn origin(&self) -> Url;

    /// Append a `<style>` element with `css` as its text and `attributes`
    /// set on it.
    fn append_style(&self, css: &str, attributes: &Attributes) -> anyhow::Result<()>;
}

/// A style element appended to a [`MemoryDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedStyle {
    pub css: String,
    pub attributes: Attributes,
}

impl InjectedStyle {
    /// Render as a `<style type="text/css">` element.
    pub fn to_html(&self) -> String {
        let mut html = String::from(r#"<style type="text/css""#);
        for (name, value) in self.attributes.iter() {
            let _ = write!(html, r#" {name}="{}""#, value.replace('"', "&quot;"));
        }
        let _ = write!(html, ">{}</style>", self.css);
        html
    }
}

/// An in-memory host document that records injected styles in order.
#[derive(Debug)]
pub struct MemoryDocument {
    origin: Url,
    styles: Mutex<Vec<InjectedStyle>>,
}

impl MemoryDocument {
    /// Create a document served from `origin`.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            styles: Mutex::new(Vec::new()),
        }
    }

    /// Every style appended so far, oldest first.
    pub fn styles(&self) -> Vec<InjectedStyle> {
        let styles = self.styles.lock().unwrap_or_else(PoisonError::into_inner);
        styles.clone()
    }

    /// The `<head>` contents produced by the appended styles.
    pub fn head_html(&self) -> String {
        let styles = self.styles.lock().unwrap_or_else(PoisonError::into_inner);
        styles.iter().map(InjectedStyle::to_html).collect()
    }
}

impl HostDocument for MemoryDocument {
    fn origin(&self) -> Url {
        self.origin.clone()
    }

    fn append_style(&self, css: &str, attributes: &Attributes) -> anyhow::Result<()> {
        let mut styles = self.styles.lock().unwrap_or_else(PoisonError::into_inner);
        styles.push(InjectedStyle {
            css: css.to_string(),
            attributes: attributes.clone(),
        });
        Ok(())
    }
}
