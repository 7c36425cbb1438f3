// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The OData response envelope (`{"value": [...]}`) and ETag extraction.
//! ETag arrives either as the `@odata.etag` field on each row or as the
//! `ETag` HTTP response header on a single-row `GET`.

use mesh_core::ETag;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct RowEnvelope {
    #[serde(default, rename = "value")]
    pub rows: Vec<Value>,
}

/// Extracts the `@odata.etag` field from a row's JSON body, if present.
pub fn etag_from_row(row: &Value) -> Option<ETag> {
    row.get("@odata.etag")
        .and_then(Value::as_str)
        .map(ETag::new)
}

/// Extracts an entity id from the `OData-EntityId` response header, used as
/// a fallback when a `204 No Content` create response carries no body.
///
/// The header value looks like
/// `https://host/api/data/v9.2/table(01234567-89ab-cdef-0123-456789abcdef)`.
pub fn entity_id_from_header(header_value: &str) -> Option<String> {
    let open = header_value.rfind('(')?;
    let close = header_value.rfind(')')?;
    if close <= open {
        return None;
    }
    Some(header_value[open + 1..close].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_etag_when_present() {
        let row = serde_json::json!({"@odata.etag": "W/\"12345\"", "id": "x"});
        assert_eq!(etag_from_row(&row).unwrap().as_str(), "W/\"12345\"");
    }

    #[test]
    fn missing_etag_is_none() {
        let row = serde_json::json!({"id": "x"});
        assert!(etag_from_row(&row).is_none());
    }

    #[test]
    fn entity_id_parses_from_header() {
        let header =
            "https://host/api/data/v9.2/cr_tasks(01234567-89ab-cdef-0123-456789abcdef)";
        assert_eq!(
            entity_id_from_header(header).unwrap(),
            "01234567-89ab-cdef-0123-456789abcdef"
        );
    }

    #[test]
    fn malformed_header_returns_none() {
        assert!(entity_id_from_header("not-a-url").is_none());
    }
}
