//! In-memory model of the document being watched.
//!
//! [`Page`] wraps a parsed HTML tree and layers on the state a live document
//! carries: attributes and inline styles written after load, form values,
//! synthetic input notifications, clicks, alerts, and a queue of mutation
//! records describing inserted nodes. Node identity is the tree's `NodeId`,
//! so a marker written on an element sticks to that physical element even if
//! it is detached and inserted somewhere else.

use std::collections::{BTreeMap, HashMap};

use ego_tree::{NodeRef, Tree};
use scraper::{ElementRef, Html, Node};
use url::Url;

use crate::utils::error::{AppError, Result};

pub mod selector;

pub use ego_tree::NodeId;
pub use selector::SelectorChain;

/// Nodes inserted under `target` in one DOM operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
}

/// Click delivered to an injected control.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    default_prevented: bool,
}

impl ClickEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the surrounding action (form submission) from running.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

pub struct Page {
    url: Option<Url>,
    document: Html,
    attributes: HashMap<NodeId, BTreeMap<String, String>>,
    styles: HashMap<NodeId, BTreeMap<String, String>>,
    values: HashMap<NodeId, String>,
    pending: Vec<MutationRecord>,
    input_events: Vec<NodeId>,
    clicks: Vec<NodeId>,
    alerts: Vec<String>,
    // Arena slots held by removed subtrees; ego-tree never frees them.
    detached: usize,
}

/// Removed nodes must outnumber live ones and reach this count before the
/// arena is rebuilt.
const COMPACT_MIN_DETACHED: usize = 4096;

impl Page {
    pub fn parse(html: &str, url: Option<&str>) -> Self {
        let url = url.and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Ignoring unparseable page URL '{}': {}", raw, e);
                None
            }
        });

        Self {
            url,
            document: Html::parse_document(html),
            attributes: HashMap::new(),
            styles: HashMap::new(),
            values: HashMap::new(),
            pending: Vec::new(),
            input_events: Vec::new(),
            clicks: Vec::new(),
            alerts: Vec::new(),
            detached: 0,
        }
    }

    /// Project-detail pages are the only ones that carry a bid form.
    pub fn is_project_page(&self) -> bool {
        self.url
            .as_ref()
            .map(|url| url.path().contains("/projects/") || url.path().contains("/jobs/"))
            .unwrap_or(false)
    }

    fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.document.tree.get(id).and_then(ElementRef::wrap)
    }

    fn require_element(&self, id: NodeId) -> Result<ElementRef<'_>> {
        self.element(id)
            .ok_or_else(|| AppError::StaleNode(format!("{:?} is not an element", id)))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn body(&self) -> Option<NodeId> {
        let chain = SelectorChain::new(&["body"]);
        self.select_first(&chain)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.document.tree.get(id)?.parent().map(|p| p.id())
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.value().name())
    }

    /// First element in the document matched by the chain, trying each entry in order.
    pub fn select_first(&self, chain: &SelectorChain) -> Option<NodeId> {
        chain
            .iter()
            .find_map(|selector| self.document.select(selector).next().map(|el| el.id()))
    }

    /// Every element matched by each chain entry, entry by entry.
    /// An element matched by several entries appears once per entry.
    pub fn select_all(&self, chain: &SelectorChain) -> Vec<NodeId> {
        chain
            .iter()
            .flat_map(|selector| self.document.select(selector).map(|el| el.id()))
            .collect()
    }

    /// The element itself or its first matching descendant, for the first chain
    /// entry that yields anything.
    pub fn find_within(&self, id: NodeId, chain: &SelectorChain) -> Option<NodeId> {
        let el = self.element(id)?;
        chain.iter().find_map(|selector| {
            if selector.matches(&el) {
                Some(el.id())
            } else {
                el.select(selector).next().map(|found| found.id())
            }
        })
    }

    /// First matching descendant (not the element itself), entry by entry.
    pub fn query_in(&self, id: NodeId, chain: &SelectorChain) -> Option<NodeId> {
        let el = self.element(id)?;
        chain
            .iter()
            .find_map(|selector| el.select(selector).next().map(|found| found.id()))
    }

    /// Nearest element, starting with `id` itself, matched by any chain entry.
    pub fn closest(&self, id: NodeId, chain: &SelectorChain) -> Option<NodeId> {
        let node = self.document.tree.get(id)?;
        std::iter::once(node)
            .chain(node.ancestors())
            .filter_map(ElementRef::wrap)
            .find(|el| chain.iter().any(|selector| selector.matches(el)))
            .map(|el| el.id())
    }

    /// Rendered text with whitespace runs collapsed. Empty for non-elements.
    pub fn text(&self, id: NodeId) -> String {
        match self.element(id) {
            Some(el) => el.text().flat_map(|t| t.split_whitespace()).collect::<Vec<_>>().join(" "),
            None => String::new(),
        }
    }

    pub fn outer_html(&self, id: NodeId) -> Option<String> {
        self.element(id).map(|el| el.html())
    }

    /// Attribute value, preferring values written since load.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<String> {
        if let Some(value) = self.attributes.get(&id).and_then(|attrs| attrs.get(name)) {
            return Some(value.clone());
        }
        self.element(id)?.value().attr(name).map(str::to_string)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        self.require_element(id)?;
        self.attributes
            .entry(id)
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// `href` resolved against the page URL. Placeholders such as
    /// `javascript:void(0)` come back unchanged.
    pub fn href(&self, id: NodeId) -> Option<String> {
        let raw = self.attr(id, "href")?;
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match &self.url {
            Some(base) => match base.join(raw) {
                Ok(resolved) => Some(resolved.to_string()),
                Err(_) => Some(raw.to_string()),
            },
            None => Some(raw.to_string()),
        }
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) -> Result<()> {
        self.require_element(id)?;
        self.styles
            .entry(id)
            .or_default()
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    pub fn style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.styles
            .get(&id)
            .and_then(|styles| styles.get(property))
            .map(String::as_str)
    }

    /// Current form value: what was last set, else the textarea body or the
    /// `value` attribute.
    pub fn value(&self, id: NodeId) -> String {
        if let Some(value) = self.values.get(&id) {
            return value.clone();
        }
        match self.element(id) {
            Some(el) if el.value().name() == "textarea" => el.text().collect(),
            Some(el) => el.value().attr("value").unwrap_or_default().to_string(),
            None => String::new(),
        }
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<()> {
        self.require_element(id)?;
        self.values.insert(id, value.to_string());
        Ok(())
    }

    /// Synthetic bubbling `input` notification so frameworks watching the
    /// field pick up a programmatic change.
    pub fn dispatch_input(&mut self, id: NodeId) -> Result<()> {
        self.require_element(id)?;
        tracing::trace!("Dispatching input event on {:?}", id);
        self.input_events.push(id);
        Ok(())
    }

    pub fn input_events(&self) -> &[NodeId] {
        &self.input_events
    }

    pub fn click(&mut self, id: NodeId) -> Result<()> {
        self.require_element(id)?;
        self.clicks.push(id);
        Ok(())
    }

    pub fn clicks(&self) -> &[NodeId] {
        &self.clicks
    }

    /// User-visible alert.
    pub fn alert(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(alert = %message, "Alert raised");
        self.alerts.push(message);
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    /// Parses `html` as a fragment and appends its nodes to `parent`,
    /// recording the insertion. Returns the top-level inserted nodes.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>> {
        self.insert_html(parent, html, false)
    }

    /// Like [`Page::append_html`] but inserts before the existing children.
    pub fn prepend_html(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>> {
        self.insert_html(parent, html, true)
    }

    fn insert_html(&mut self, parent: NodeId, html: &str, at_start: bool) -> Result<Vec<NodeId>> {
        self.require_element(parent)?;

        let fragment = Html::parse_fragment(html);
        let sources: Vec<NodeRef<'_, Node>> = fragment.root_element().children().collect();

        let mut added = Vec::with_capacity(sources.len());
        if at_start {
            // Prepend in reverse so the fragment keeps its own order.
            for source in sources.into_iter().rev() {
                added.push(graft(&mut self.document.tree, parent, source, true)?);
            }
            added.reverse();
        } else {
            for source in sources {
                added.push(graft(&mut self.document.tree, parent, source, false)?);
            }
        }

        self.pending.push(MutationRecord {
            target: parent,
            added_nodes: added.clone(),
        });
        Ok(added)
    }

    /// Moves an existing node under `new_parent`, recording it as inserted again.
    pub fn reinsert(&mut self, id: NodeId, new_parent: NodeId) -> Result<()> {
        self.require_element(new_parent)?;
        if id == new_parent || self.is_ancestor(id, new_parent) {
            return Err(AppError::StaleNode(format!(
                "cannot move {:?} under its own descendant",
                id
            )));
        }

        let tree = &mut self.document.tree;
        tree.get_mut(id)
            .ok_or_else(|| AppError::StaleNode(format!("{:?} does not exist", id)))?
            .detach();
        tree.get_mut(new_parent)
            .ok_or_else(|| AppError::StaleNode(format!("{:?} does not exist", new_parent)))?
            .append_id(id);

        self.pending.push(MutationRecord {
            target: new_parent,
            added_nodes: vec![id],
        });
        Ok(())
    }

    fn is_ancestor(&self, candidate: NodeId, id: NodeId) -> bool {
        self.document
            .tree
            .get(id)
            .map(|node| node.ancestors().any(|a| a.id() == candidate))
            .unwrap_or(false)
    }

    /// `id` is `ancestor` itself or lies somewhere below it.
    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        id == ancestor || self.is_ancestor(ancestor, id)
    }

    /// Detaches `id` with its subtree and forgets every attribute, style and
    /// value recorded for those nodes.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        let node = self
            .document
            .tree
            .get(id)
            .ok_or_else(|| AppError::StaleNode(format!("{:?} does not exist", id)))?;
        if node.parent().is_none() {
            return Err(AppError::StaleNode(format!("{:?} is not attached", id)));
        }

        let subtree: Vec<NodeId> = node.descendants().map(|n| n.id()).collect();
        for node in &subtree {
            self.attributes.remove(node);
            self.styles.remove(node);
            self.values.remove(node);
        }
        self.detached += subtree.len();

        if let Some(mut node) = self.document.tree.get_mut(id) {
            node.detach();
        }
        Ok(())
    }

    /// Elements and text nodes reachable from the document root.
    pub fn node_count(&self) -> usize {
        self.document.tree.root().descendants().count()
    }

    pub fn needs_compaction(&self) -> bool {
        self.detached >= COMPACT_MIN_DETACHED && self.detached > self.node_count()
    }

    /// Rebuilds the tree from its reachable nodes, releasing the slots of
    /// removed subtrees. Every recorded id is carried over to the new tree;
    /// the returned map lets callers translate ids they hold themselves.
    /// Ids of removed nodes are invalid afterwards.
    pub fn compact(&mut self) -> HashMap<NodeId, NodeId> {
        let old = &self.document.tree;
        let mut tree = Tree::new(old.root().value().clone());
        let mut map = HashMap::new();
        let root = tree.root().id();
        map.insert(old.root().id(), root);
        for child in old.root().children() {
            copy_mapped(&mut tree, root, child, &mut map);
        }

        let remap = |id: &NodeId| map.get(id).copied();
        self.attributes = remap_keys(std::mem::take(&mut self.attributes), &map);
        self.styles = remap_keys(std::mem::take(&mut self.styles), &map);
        self.values = remap_keys(std::mem::take(&mut self.values), &map);
        self.input_events = self.input_events.iter().filter_map(remap).collect();
        self.clicks = self.clicks.iter().filter_map(remap).collect();
        self.pending = std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|record| {
                Some(MutationRecord {
                    target: remap(&record.target)?,
                    added_nodes: record.added_nodes.iter().filter_map(remap).collect(),
                })
            })
            .collect();

        tracing::debug!(
            released = self.detached,
            live = map.len(),
            "Page tree compacted"
        );
        self.document.tree = tree;
        self.detached = 0;
        map
    }

    /// Drains the mutation records queued since the last call.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.pending)
    }
}

/// Copies `source` and its subtree from a fragment tree into `tree` under `parent`.
fn graft(
    tree: &mut Tree<Node>,
    parent: NodeId,
    source: NodeRef<'_, Node>,
    at_start: bool,
) -> Result<NodeId> {
    let mut parent_mut = tree
        .get_mut(parent)
        .ok_or_else(|| AppError::StaleNode(format!("{:?} does not exist", parent)))?;
    let id = if at_start {
        parent_mut.prepend(source.value().clone()).id()
    } else {
        parent_mut.append(source.value().clone()).id()
    };

    for child in source.children() {
        graft(tree, id, child, false)?;
    }
    Ok(id)
}

/// Copies a live subtree into `tree`, recording old-to-new ids.
fn copy_mapped(
    tree: &mut Tree<Node>,
    parent: NodeId,
    source: NodeRef<'_, Node>,
    map: &mut HashMap<NodeId, NodeId>,
) {
    let Some(mut parent_mut) = tree.get_mut(parent) else {
        return;
    };
    let id = parent_mut.append(source.value().clone()).id();
    map.insert(source.id(), id);

    for child in source.children() {
        copy_mapped(tree, id, child, map);
    }
}

fn remap_keys<V>(table: HashMap<NodeId, V>, map: &HashMap<NodeId, NodeId>) -> HashMap<NodeId, V> {
    table
        .into_iter()
        .filter_map(|(id, value)| map.get(&id).map(|new_id| (*new_id, value)))
        .collect()
}
