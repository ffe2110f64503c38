//! Paged JSON sources over HTTP

use std::time::Duration;

use async_trait::async_trait;
use ferry_core::{DataTable, Extraction, FerryError, HttpSource, PageInfo, Result, Value};
use indexmap::IndexSet;
use reqwest::{Client, Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Column used when the records are scalars rather than objects
const SCALAR_COLUMN: &str = "value";

/// One decoded page of an HTTP source
#[derive(Debug, Clone, PartialEq)]
pub struct HttpPage {
    pub table: DataTable,
    /// Another page should be requested
    pub has_more: bool,
}

/// Fetches numbered pages of an extraction's HTTP source
#[async_trait]
pub trait HttpExchange: Send + Sync {
    async fn fetch_page(
        &self,
        extraction: &Extraction,
        page: u32,
        token: &CancellationToken,
    ) -> Result<HttpPage>;
}

pub struct ReqwestHttpExchange {
    client: Client,
}

impl ReqwestHttpExchange {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FerryError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn source(extraction: &Extraction) -> Result<&HttpSource> {
    extraction.http.as_ref().ok_or_else(|| {
        FerryError::Configuration(format!(
            "extraction '{}' is an HTTP source without an endpoint",
            extraction.name
        ))
    })
}

/// Endpoint with the page and page-size parameters appended
pub(crate) fn page_url(http: &HttpSource, page: u32) -> Result<Url> {
    let mut url = Url::parse(&http.endpoint)
        .map_err(|e| FerryError::Configuration(format!("invalid endpoint '{}': {}", http.endpoint, e)))?;
    url.query_pairs_mut()
        .append_pair(&http.page_param, &page.to_string())
        .append_pair(&http.size_param, &http.page_size.to_string());
    Ok(url)
}

fn request_error(error: reqwest::Error) -> FerryError {
    if error.is_timeout() {
        FerryError::Timeout(error.to_string())
    } else if error.is_connect() {
        FerryError::Connection(error.to_string())
    } else {
        FerryError::Query(error.to_string())
    }
}

#[async_trait]
impl HttpExchange for ReqwestHttpExchange {
    async fn fetch_page(
        &self,
        extraction: &Extraction,
        page: u32,
        token: &CancellationToken,
    ) -> Result<HttpPage> {
        let http = source(extraction)?;
        let url = page_url(http, page)?;
        let method = Method::from_bytes(http.method.to_uppercase().as_bytes())
            .map_err(|_| FerryError::Configuration(format!("invalid HTTP method '{}'", http.method)))?;

        let mut request = self.client.request(method, url);
        for (name, value) in &http.headers {
            request = request.header(name, value);
        }

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FerryError::Cancelled),
            response = request.send() => response.map_err(request_error)?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", http.endpoint, status, body);
            // Client errors other than throttling will not fix themselves
            return Err(
                if status.is_client_error()
                    && status != StatusCode::TOO_MANY_REQUESTS
                    && status != StatusCode::REQUEST_TIMEOUT
                {
                    FerryError::Configuration(message)
                } else {
                    FerryError::Query(message)
                },
            );
        }

        let body: serde_json::Value = response.json().await.map_err(request_error)?;
        parse_page(extraction.table_alias(), http, page, &body)
    }
}

fn navigate<'a>(body: &'a serde_json::Value, path: Option<&str>) -> Option<&'a serde_json::Value> {
    match path {
        None => Some(body),
        Some(path) => path
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(body, |node, segment| match node {
                serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => node.get(segment),
            }),
    }
}

fn json_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::Json(other.clone()),
    }
}

/// Decode one response body into a page.
///
/// Columns are the union of record keys in first-seen order; records missing
/// a key get NULL there.
pub fn parse_page(name: &str, http: &HttpSource, page: u32, body: &serde_json::Value) -> Result<HttpPage> {
    let records = navigate(body, http.data_path.as_deref())
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| {
            FerryError::Query(format!(
                "response for '{}' has no record array at '{}'",
                name,
                http.data_path.as_deref().unwrap_or("$")
            ))
        })?;

    let mut columns: IndexSet<String> = IndexSet::new();
    for record in records {
        match record {
            serde_json::Value::Object(fields) => columns.extend(fields.keys().cloned()),
            _ => {
                columns.insert(SCALAR_COLUMN.to_string());
            }
        }
    }

    let rows: Vec<Vec<Value>> = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column| match record {
                    serde_json::Value::Object(fields) => fields.get(column).map(json_value).unwrap_or(Value::Null),
                    scalar if column == SCALAR_COLUMN => json_value(scalar),
                    _ => Value::Null,
                })
                .collect()
        })
        .collect();

    let fetched = page.saturating_sub(http.first_page) as u64 + 1;
    let has_more = !records.is_empty()
        && match http.total_pages_path.as_deref() {
            Some(path) => navigate(body, Some(path))
                .and_then(serde_json::Value::as_u64)
                .is_some_and(|total| fetched < total),
            None => records.len() as u64 >= http.page_size as u64,
        };

    let offset = (fetched - 1) * http.page_size as u64;
    let row_count = rows.len();
    let table = DataTable::from_rows(name, columns.into_iter().collect(), rows)
        .with_page(PageInfo::for_fetch(offset, http.page_size as u64, row_count));

    Ok(HttpPage { table, has_more })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn http() -> HttpSource {
        serde_json::from_value(json!({ "endpoint": "https://api.example.com/v1/orders?region=eu" })).unwrap()
    }

    #[test]
    fn test_page_url_appends_paging() {
        let url = page_url(&http(), 3).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/orders?region=eu&page=3&page_size=500"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_configuration() {
        let mut source = http();
        source.endpoint = "not a url".into();
        assert!(matches!(page_url(&source, 1), Err(FerryError::Configuration(_))));
    }

    #[test]
    fn test_parse_union_of_keys() {
        let mut source = http();
        source.data_path = Some("data.items".into());
        source.page_size = 2;
        let body = json!({
            "data": { "items": [
                { "id": 1, "status": "open" },
                { "id": 2, "total": 9.5, "tags": ["a"] }
            ]}
        });

        let page = parse_page("orders", &source, 1, &body).unwrap();
        assert_eq!(page.table.column_names(), vec!["id", "status", "total", "tags"]);
        assert_eq!(
            page.table.rows[1],
            vec![
                Value::Int64(2),
                Value::Null,
                Value::Float64(9.5),
                Value::Json(json!(["a"]))
            ]
        );
        assert!(page.has_more);
        assert!(page.table.page.is_first);
    }

    #[test]
    fn test_total_pages_bounds_paging() {
        let mut source = http();
        source.total_pages_path = Some("meta.pages".into());
        let body = json!({ "meta": { "pages": 2 }, "rows": [] });
        source.data_path = Some("rows".into());

        let body_with_rows = json!({ "meta": { "pages": 2 }, "rows": [{ "id": 1 }] });
        assert!(parse_page("o", &source, 1, &body_with_rows).unwrap().has_more);
        assert!(!parse_page("o", &source, 2, &body_with_rows).unwrap().has_more);
        assert!(!parse_page("o", &source, 1, &body).unwrap().has_more);
    }

    #[test]
    fn test_short_page_ends_paging() {
        let body = json!([{ "id": 1 }, { "id": 2 }]);
        let page = parse_page("orders", &http(), 4, &body).unwrap();
        assert!(!page.has_more);
        assert_eq!(page.table.page.offset, 1500);
        assert!(page.table.page.is_last);
    }

    #[test]
    fn test_scalar_records() {
        let page = parse_page("codes", &http(), 1, &json!(["a", "b"])).unwrap();
        assert_eq!(page.table.column_names(), vec!["value"]);
        assert_eq!(page.table.rows[0], vec![Value::String("a".into())]);
    }

    #[test]
    fn test_missing_array_is_query_error() {
        let mut source = http();
        source.data_path = Some("data".into());
        let err = parse_page("orders", &source, 1, &json!({ "data": { "id": 1 } })).unwrap_err();
        assert!(matches!(err, FerryError::Query(_)));
    }
}
