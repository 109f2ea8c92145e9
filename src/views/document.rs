//! Documents and their views
//!
//! A design document carries named views. Each view resolves to a
//! `ViewInvoker` that knows how to build the query URI against whichever
//! node the topology currently offers.

use super::query::ViewQuery;
use crate::topology::{Node, NodeSelector, Result, TopologyError, TopologyStore};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;

const DESIGN_PREFIX: &str = "_design/";

/// Map/reduce source of one view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewDefinition {
    pub map: Option<String>,
    pub reduce: Option<String>,
}

/// Callable description of one view on one design document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewInvoker {
    design_id: String,
    name: String,
    definition: ViewDefinition,
}

impl ViewInvoker {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }

    /// `<couchApiBase>/<design id>/_view/<name>` on the given node
    pub fn endpoint(&self, node: &Node) -> Result<Url> {
        let no_endpoint = || TopologyError::NoQueryEndpoint(node.host.clone());
        let mut url = node.couch_api_base.clone().ok_or_else(no_endpoint)?;
        url.path_segments_mut()
            .map_err(|_| no_endpoint())?
            .pop_if_empty()
            .extend(self.design_id.split('/'))
            .push("_view")
            .push(&self.name);
        Ok(url)
    }

    /// Full request URI against a randomly chosen node of the current topology
    pub fn request_uri(&self, store: &TopologyStore, query: &ViewQuery) -> Result<Url> {
        let snapshot = store.current();
        let node = NodeSelector::pick_any(&snapshot)?;
        let mut url = self.endpoint(node)?;
        url.query_pairs_mut().extend_pairs(query.params());
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    data: Value,
    views: BTreeMap<String, ViewInvoker>,
}

impl Document {
    /// Wrap a fetched document or view row. Views are read from
    /// `doc.views`; anything else is carried as plain data.
    pub fn new(data: Value) -> Self {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let views = data
            .get("doc")
            .and_then(|doc| doc.get("views"))
            .and_then(Value::as_object)
            .map(|views| {
                views
                    .iter()
                    .map(|(name, funs)| {
                        let field = |key: &str| funs.get(key).and_then(Value::as_str).map(str::to_string);
                        let invoker = ViewInvoker {
                            design_id: id.clone(),
                            name: name.clone(),
                            definition: ViewDefinition {
                                map: field("map"),
                                reduce: field("reduce"),
                            },
                        };
                        (name.clone(), invoker)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Document { id, data, views }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn is_design_doc(&self) -> bool {
        self.id.contains(DESIGN_PREFIX)
    }

    pub fn has_views(&self) -> bool {
        self.is_design_doc() && !self.views.is_empty()
    }

    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    pub fn resolve_view(&self, name: &str) -> Option<&ViewInvoker> {
        self.views.get(name)
    }
}
