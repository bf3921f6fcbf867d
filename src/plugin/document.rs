//! Queryable documents handed to plugins by `htmlParse`.
//!
//! A plugin never sees the parser. It gets an object with six methods:
//!
//! | method          | result                                             |
//! |-----------------|----------------------------------------------------|
//! | `find(sel)`     | new wrapper over matching descendants              |
//! | `text()`        | trimmed text of every matched node, `""` if none   |
//! | `attr(name)`    | attribute of the first match, `""` if absent       |
//! | `first()`       | wrapper over the first match (maybe empty)         |
//! | `length()`      | match count                                        |
//! | `each(fn)`      | `fn(index, wrapper)` per match, index from 1       |
//!
//! Callback failures inside `each` follow [`EachErrors`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use ego_tree::NodeId;
use rquickjs::{CaughtError, Ctx, Function, Object, Value};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};

/// What `each` does when the plugin callback throws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EachErrors {
    /// Log at `warn` and continue with the next node.
    #[default]
    Swallow,
    /// Stop iterating and rethrow to the caller of `each`.
    Propagate,
}

/// A parsed document plus a set of nodes in it.
///
/// Nodes are stored as tree ids, so a selection is plain data and can be
/// cloned into as many script closures as needed.
#[derive(Clone)]
pub struct Selection {
    doc: Arc<Mutex<Html>>,
    root: NodeId,
    nodes: Vec<NodeId>,
}

impl Selection {
    /// Parse a full HTML document. html5ever recovers from any input, so
    /// this never fails.
    pub fn parse(html: &str) -> Self {
        let html = Html::parse_document(html);
        let root = html.tree.root().id();
        Self {
            doc: Arc::new(Mutex::new(html)),
            root,
            nodes: vec![root],
        }
    }

    fn with_nodes(&self, nodes: Vec<NodeId>) -> Self {
        Self {
            doc: Arc::clone(&self.doc),
            root: self.root,
            nodes,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Html> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Descendants of every node matching `selector`, first-seen order, no
    /// duplicates. An unparsable selector matches nothing.
    pub fn find(&self, selector: &str) -> Self {
        let selector = match Selector::parse(selector) {
            Ok(s) => s,
            Err(e) => {
                debug!(selector, error = ?e, "Invalid selector");
                return self.with_nodes(Vec::new());
            }
        };

        let html = self.lock();
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for &id in &self.nodes {
            let matches: Vec<NodeId> = if id == self.root {
                html.select(&selector).map(|el| el.id()).collect()
            } else {
                match html.tree.get(id).and_then(ElementRef::wrap) {
                    Some(el) => el
                        .select(&selector)
                        .map(|m| m.id())
                        .filter(|m| *m != id)
                        .collect(),
                    None => Vec::new(),
                }
            };
            for m in matches {
                if seen.insert(m) {
                    found.push(m);
                }
            }
        }
        drop(html);

        self.with_nodes(found)
    }

    /// Concatenated text of all matched nodes, trimmed.
    pub fn text(&self) -> String {
        let html = self.lock();
        let mut out = String::new();
        for node in self.nodes.iter().filter_map(|id| html.tree.get(*id)) {
            for text in node.descendants().filter_map(|n| n.value().as_text()) {
                out.push_str(text);
            }
        }
        out.trim().to_string()
    }

    /// Attribute of the first matched element.
    pub fn attr(&self, name: &str) -> String {
        let html = self.lock();
        let Some(&first) = self.nodes.first() else {
            return String::new();
        };
        html.tree
            .get(first)
            .and_then(ElementRef::wrap)
            .and_then(|el| el.value().attr(name))
            .unwrap_or_default()
            .to_string()
    }

    pub fn first(&self) -> Self {
        self.with_nodes(self.nodes.first().copied().into_iter().collect())
    }

    /// One single-node selection per match, in order.
    pub fn split(&self) -> Vec<Self> {
        self.nodes.iter().map(|id| self.with_nodes(vec![*id])).collect()
    }

    /// Build the script-facing object.
    pub fn into_object<'js>(self, ctx: &Ctx<'js>, each_errors: EachErrors) -> rquickjs::Result<Object<'js>> {
        let object = Object::new(ctx.clone())?;

        let sel = self.clone();
        object.set(
            "find",
            Function::new(ctx.clone(), move |ctx: Ctx<'js>, selector: String| {
                sel.find(&selector).into_object(&ctx, each_errors)
            })?,
        )?;

        let sel = self.clone();
        object.set("text", Function::new(ctx.clone(), move || sel.text())?)?;

        let sel = self.clone();
        object.set(
            "attr",
            Function::new(ctx.clone(), move |name: String| sel.attr(&name))?,
        )?;

        let sel = self.clone();
        object.set(
            "first",
            Function::new(ctx.clone(), move |ctx: Ctx<'js>| {
                sel.first().into_object(&ctx, each_errors)
            })?,
        )?;

        let count = i32::try_from(self.len()).unwrap_or(i32::MAX);
        object.set("length", Function::new(ctx.clone(), move || count)?)?;

        let sel = self;
        object.set(
            "each",
            Function::new(ctx.clone(), move |ctx: Ctx<'js>, callback: Function<'js>| {
                each(&ctx, &sel, &callback, each_errors)
            })?,
        )?;

        Ok(object)
    }
}

fn each<'js>(
    ctx: &Ctx<'js>,
    selection: &Selection,
    callback: &Function<'js>,
    policy: EachErrors,
) -> rquickjs::Result<()> {
    for (i, node) in selection.split().into_iter().enumerate() {
        let index = i32::try_from(i + 1).unwrap_or(i32::MAX);
        let wrapper = node.into_object(ctx, policy)?;
        if let Err(err) = callback.call::<_, Value>((index, wrapper)) {
            match policy {
                EachErrors::Propagate => return Err(err),
                EachErrors::Swallow => {
                    let caught = CaughtError::from_error(ctx, err);
                    warn!(index, error = %caught, "each() callback failed; continuing");
                }
            }
        }
    }
    Ok(())
}
