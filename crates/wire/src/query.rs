// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OData query construction (`$filter`, `$select`, `$orderby`, `$top`,
//! `$expand`) for `GetRows`. Built up fluently and rendered to the query
//! params `reqwest` attaches to the request.

#[derive(Debug, Clone, Default)]
pub struct ODataQuery {
    filter: Option<String>,
    select: Vec<String>,
    orderby: Option<String>,
    top: Option<u32>,
    expand: Option<String>,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, expr: impl Into<String>) -> Self {
        self.filter = Some(expr.into());
        self
    }

    /// Appends another clause to the existing filter, joined with ` and `.
    pub fn and_filter(mut self, expr: impl Into<String>) -> Self {
        let expr = expr.into();
        self.filter = Some(match self.filter.take() {
            Some(existing) => format!("{existing} and {expr}"),
            None => expr,
        });
        self
    }

    pub fn select(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn orderby(mut self, expr: impl Into<String>) -> Self {
        self.orderby = Some(expr.into());
        self
    }

    pub fn top(mut self, n: u32) -> Self {
        self.top = Some(n);
        self
    }

    pub fn expand(mut self, expr: impl Into<String>) -> Self {
        self.expand = Some(expr.into());
        self
    }

    /// Renders to the `(key, value)` pairs `reqwest::RequestBuilder::query`
    /// expects.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(filter) = &self.filter {
            params.push(("$filter", filter.clone()));
        }
        if !self.select.is_empty() {
            params.push(("$select", self.select.join(",")));
        }
        if let Some(orderby) = &self.orderby {
            params.push(("$orderby", orderby.clone()));
        }
        if let Some(top) = self.top {
            params.push(("$top", top.to_string()));
        }
        if let Some(expand) = &self.expand {
            params.push(("$expand", expand.clone()));
        }
        params
    }
}
