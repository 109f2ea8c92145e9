//! View query parameters and paged results

use super::document::Document;
use crate::topology::{Result, TopologyError};
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_PER_PAGE: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    page: u64,
    per_page: u64,
    raw: bool,
    params: BTreeMap<String, String>,
}

impl Default for ViewQuery {
    fn default() -> Self {
        ViewQuery {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            raw: false,
            params: BTreeMap::new(),
        }
    }
}

impl ViewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1-based; 0 is treated as 1
    pub fn page(mut self, page: u64) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn per_page(mut self, per_page: u64) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Keep rows as JSON instead of wrapping them in `Document`s
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Query-string pairs: caller params plus `skip`/`limit`
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|(k, _)| k.as_str() != "skip" && k.as_str() != "limit")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.push(("skip".to_string(), self.skip().to_string()));
        params.push(("limit".to_string(), self.per_page.to_string()));
        params
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewRows {
    Raw(Value),
    Documents(Vec<Document>),
}

/// One page of a view response
#[derive(Debug, Clone, PartialEq)]
pub struct ViewPage {
    pub page: u64,
    pub per_page: u64,
    pub total_entries: u64,
    pub rows: ViewRows,
}

impl ViewPage {
    pub fn from_response(response: Value, query: &ViewQuery) -> Result<Self> {
        let total_entries = response
            .get("total_rows")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let rows = if query.raw {
            ViewRows::Raw(response)
        } else {
            let rows = response
                .get("rows")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    TopologyError::MalformedViewResponse("response without rows".to_string())
                })?;
            ViewRows::Documents(rows.iter().cloned().map(Document::new).collect())
        };

        Ok(ViewPage {
            page: query.page,
            per_page: query.per_page,
            total_entries,
            rows,
        })
    }

    pub fn total_pages(&self) -> u64 {
        self.total_entries.div_ceil(self.per_page)
    }

    pub fn next_page(&self) -> Option<u64> {
        (self.page < self.total_pages()).then_some(self.page + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skip_and_limit() {
        let query = ViewQuery::new();
        assert_eq!(query.skip(), 0);
        assert_eq!(
            query.params(),
            vec![("skip".to_string(), "0".to_string()), ("limit".to_string(), "30".to_string())]
        );

        let query = ViewQuery::new().page(3).per_page(20);
        assert_eq!(query.skip(), 40);
        assert_eq!(ViewQuery::new().page(0).skip(), 0);
    }

    #[test]
    fn test_caller_cannot_override_paging() {
        let params = ViewQuery::new().param("limit", "999").param("descending", "true").params();
        assert_eq!(params.len(), 3);
        assert!(params.contains(&("limit".to_string(), "30".to_string())));
    }

    #[test]
    fn test_page_from_response() {
        let response = json!({
            "total_rows": 45,
            "rows": [{ "id": "a", "key": 1, "value": null }, { "id": "b", "key": 2, "value": null }]
        });
        let page = ViewPage::from_response(response, &ViewQuery::new().page(2).per_page(20)).unwrap();

        assert_eq!(page.total_pages(), 3);
        assert_eq!(page.next_page(), Some(3));
        match page.rows {
            ViewRows::Documents(docs) => {
                assert_eq!(docs.len(), 2);
                assert_eq!(docs[0].id(), "a");
            }
            ViewRows::Raw(_) => panic!("expected documents"),
        }
    }

    #[test]
    fn test_raw_page() {
        let response = json!({ "total_rows": 0, "rows": [] });
        let page = ViewPage::from_response(response.clone(), &ViewQuery::new().raw()).unwrap();
        assert_eq!(page.rows, ViewRows::Raw(response));
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn test_missing_rows_rejected() {
        assert!(matches!(
            ViewPage::from_response(json!({ "error": "not_found" }), &ViewQuery::new()),
            Err(TopologyError::MalformedViewResponse(_))
        ));
    }

    #[test]
    fn test_huge_page_saturates() {
        let query = ViewQuery::new().page(u64::MAX).per_page(u64::MAX);
        assert_eq!(query.skip(), u64::MAX);
        assert!(query.params().contains(&("skip".to_string(), u64::MAX.to_string())));
    }
}
