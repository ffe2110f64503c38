//! Extraction job descriptors
//!
//! These are read-only for the duration of a pipeline run. Connection strings
//! arrive already decrypted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DialectKind;

/// A source database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    /// Short name; also the destination schema for tables pulled from here
    pub alias: String,
    pub dialect: DialectKind,
    pub connection_string: String,
    /// Hours to add to the request time before comparing against filter columns
    #[serde(default)]
    pub timezone_offset_hours: i32,
}

/// A sink database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub alias: String,
    pub dialect: DialectKind,
    pub connection_string: String,
    #[serde(default)]
    pub timezone_offset_hours: i32,
}

/// Where an extraction reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Db,
    Http,
}

/// Column allow/deny list
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "columns")]
pub enum ColumnFilter {
    #[default]
    All,
    /// Only these columns are selected
    Include(Vec<String>),
    /// Every column except these
    Ignore(Vec<String>),
}

/// Pagination contract of an HTTP source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSource {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_size_param")]
    pub size_param: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    /// Dot-separated path to the record array; the body itself when absent
    #[serde(default)]
    pub data_path: Option<String>,
    /// Dot-separated path to the total page count, when the API reports one
    #[serde(default)]
    pub total_pages_path: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_size_param() -> String {
    "page_size".to_string()
}

fn default_page_size() -> u32 {
    500
}

fn default_first_page() -> u32 {
    1
}

/// A unit of data movement from one origin to one destination (or CSV)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub id: i64,
    /// Source table, view or object name
    pub name: String,
    /// Destination table name; defaults to `name`
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(skip)]
    pub origin: Option<Origin>,
    #[serde(skip)]
    pub destination: Option<Destination>,
    /// Column used for ordering and deduplication
    pub index_column: String,
    #[serde(default)]
    pub is_incremental: bool,
    #[serde(default)]
    pub filter_column: Option<String>,
    /// Width of the incremental window in seconds
    #[serde(default)]
    pub filter_time_secs: Option<i64>,
    /// Replaces the source table with a subquery
    #[serde(default)]
    pub override_query: Option<String>,
    #[serde(default)]
    pub column_filter: ColumnFilter,
    #[serde(default)]
    pub is_virtual: bool,
    /// Value tagging this dependency's rows in the merged virtual table
    #[serde(default)]
    pub virtual_id: Option<String>,
    /// Name of the synthetic column holding `virtual_id`
    #[serde(default)]
    pub virtual_id_group: Option<String>,
    #[serde(default)]
    pub is_virtual_template: bool,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub http: Option<HttpSource>,
}

impl Extraction {
    pub fn new(id: i64, name: impl Into<String>, index_column: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            alias: None,
            origin: None,
            destination: None,
            index_column: index_column.into(),
            is_incremental: false,
            filter_column: None,
            filter_time_secs: None,
            override_query: None,
            column_filter: ColumnFilter::All,
            is_virtual: false,
            virtual_id: None,
            virtual_id_group: None,
            is_virtual_template: false,
            source_type: SourceType::Db,
            http: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Make the extraction incremental over `filter_column` within the last `secs` seconds
    pub fn incremental(mut self, filter_column: impl Into<String>, secs: i64) -> Self {
        self.is_incremental = true;
        self.filter_column = Some(filter_column.into());
        self.filter_time_secs = Some(secs);
        self
    }

    pub fn with_override_query(mut self, sql: impl Into<String>) -> Self {
        self.override_query = Some(sql.into());
        self
    }

    pub fn with_column_filter(mut self, filter: ColumnFilter) -> Self {
        self.column_filter = filter;
        self
    }

    /// Mark as a dependency of a virtual table
    pub fn virtual_member(
        mut self,
        group_column: impl Into<String>,
        virtual_id: impl Into<String>,
        is_template: bool,
    ) -> Self {
        self.is_virtual = true;
        self.virtual_id_group = Some(group_column.into());
        self.virtual_id = Some(virtual_id.into());
        self.is_virtual_template = is_template;
        self
    }

    pub fn with_http(mut self, http: HttpSource) -> Self {
        self.source_type = SourceType::Http;
        self.http = Some(http);
        self
    }

    /// Destination table name
    pub fn table_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Destination schema: the origin alias, or the destination engine's default
    pub fn destination_schema(&self) -> String {
        match (&self.origin, &self.destination) {
            (Some(origin), _) if !origin.alias.is_empty() => origin.alias.to_lowercase(),
            (_, Some(destination)) => destination.dialect.default_schema().to_string(),
            _ => "public".to_string(),
        }
    }

    /// Synthetic virtual-id column, when this is a virtual dependency
    pub fn virtual_column(&self) -> Option<&str> {
        if self.is_virtual {
            self.virtual_id_group.as_deref()
        } else {
            None
        }
    }

    pub fn timezone_offset_hours(&self) -> i32 {
        self.origin
            .as_ref()
            .map(|o| o.timezone_offset_hours)
            .unwrap_or_default()
    }

    /// Key shared by every dependency of one virtual table.
    ///
    /// Dependencies usually come from different origins, so the origin
    /// alias (and with it the schema) is left out; the merged table is
    /// written under the template's schema.
    pub fn virtual_group_key(&self) -> String {
        let destination = self
            .destination
            .as_ref()
            .map(|d| d.alias.as_str())
            .unwrap_or("csv");
        format!("{}:{}", destination, self.table_alias())
    }

    /// Key identifying the physical destination table
    pub fn destination_key(&self) -> String {
        let destination = self
            .destination
            .as_ref()
            .map(|d| d.alias.as_str())
            .unwrap_or("csv");
        format!(
            "{}:{}.{}",
            destination,
            self.destination_schema(),
            self.table_alias()
        )
    }
}
