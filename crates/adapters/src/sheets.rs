//! Google Sheets table store (Sheets API v4, REST)

use async_trait::async_trait;
use autopost_domain::{Item, ItemStatus, Schedule, SourceError, TableStore};
use reqwest::{Client, Response, Url};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::sheets_auth::{SheetsAuth, TokenSource};

/// Header names of the columns the store reads.
///
/// Matching is case-insensitive and ignores surrounding whitespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetColumns {
    pub schedule: String,
    pub text: String,
    pub image: String,
    pub status: String,
    /// Optional; rows simply have no title when the column is absent
    pub title: String,
}

impl Default for SheetColumns {
    fn default() -> Self {
        Self {
            schedule: "Publish time".to_string(),
            text: "Post text".to_string(),
            image: "Image URL".to_string(),
            status: "Status".to_string(),
            title: "Title".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// Tab to read; the first row holds the headers
    pub sheet_name: String,
    pub api_base_url: String,
    pub columns: SheetColumns,
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: "Sheet1".to_string(),
            api_base_url: "https://sheets.googleapis.com".to_string(),
            columns: SheetColumns::default(),
            timeout_secs: 30,
        }
    }
}

/// Column positions resolved from the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    schedule: Option<usize>,
    text: Option<usize>,
    image: Option<usize>,
    title: Option<usize>,
    status: usize,
}

/// Spreadsheet-backed table of scheduled posts.
///
/// Item ids are 1-based sheet row numbers (the header is row 1).
pub struct GoogleSheetsStore {
    client: Client,
    tokens: TokenSource,
    config: SheetsConfig,
    columns: Mutex<Option<ColumnMap>>,
}

impl GoogleSheetsStore {
    pub fn new(auth: SheetsAuth, config: SheetsConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            tokens: TokenSource::new(auth),
            config,
            columns: Mutex::new(None),
        }
    }

    /// `'Sheet name'` with embedded quotes doubled
    fn quoted_sheet(&self) -> String {
        format!("'{}'", self.config.sheet_name.replace('\'', "''"))
    }

    fn values_url(&self, range: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.config.api_base_url)
            .map_err(|e| SourceError::Api(format!("Invalid Sheets URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Api("Invalid Sheets URL".to_string()))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.config.spreadsheet_id.as_str(),
                "values",
                range,
            ]);
        Ok(url)
    }

    async fn fetch_values(&self, range: &str) -> Result<Vec<Vec<String>>, SourceError> {
        let url = self.values_url(range)?;
        let token = self.tokens.bearer(&self.client).await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let response = check_status(response).await?;

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    fn resolve_columns(&self, header: &[String]) -> Result<ColumnMap, SourceError> {
        let find = |name: &str| {
            let name = name.trim().to_lowercase();
            header.iter().position(|h| h.trim().to_lowercase() == name)
        };

        let columns = &self.config.columns;
        let status = find(&columns.status).ok_or_else(|| {
            SourceError::Parse(format!("Status column '{}' not found", columns.status))
        })?;

        Ok(ColumnMap {
            schedule: find(&columns.schedule),
            text: find(&columns.text),
            image: find(&columns.image),
            title: find(&columns.title),
            status,
        })
    }

    async fn status_column(&self) -> Result<usize, SourceError> {
        if let Some(map) = self.cached_columns() {
            return Ok(map.status);
        }

        let range = format!("{}!1:1", self.quoted_sheet());
        let rows = self.fetch_values(&range).await?;
        let header = rows.into_iter().next().unwrap_or_default();
        let map = self.resolve_columns(&header)?;
        self.cache_columns(map);
        Ok(map.status)
    }

    fn cached_columns(&self) -> Option<ColumnMap> {
        self.columns.lock().ok().and_then(|c| *c)
    }

    fn cache_columns(&self, map: ColumnMap) {
        if let Ok(mut columns) = self.columns.lock() {
            *columns = Some(map);
        }
    }
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueUpdate<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: [[&'a str; 1]; 1],
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `0` → `A`, `25` → `Z`, `26` → `AA`
fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == 401 || status == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Auth(format!("Sheets returned {}: {}", status, body)));
    }

    if status == 429 {
        return Err(SourceError::RateLimited(None));
    }

    let body = response.text().await.unwrap_or_default();
    Err(SourceError::Api(format!("Sheets returned {}: {}", status, body)))
}

#[async_trait]
impl TableStore for GoogleSheetsStore {
    async fn read_items(&self) -> Result<Vec<Item>, SourceError> {
        let mut rows = self.fetch_values(&self.quoted_sheet()).await?.into_iter();

        let Some(header) = rows.next() else {
            return Ok(vec![]);
        };
        let map = self.resolve_columns(&header)?;
        self.cache_columns(map);

        let cell = |row: &[String], index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let mut items = Vec::new();
        for (offset, row) in rows.enumerate() {
            // Data starts on sheet row 2
            let row_number = offset + 2;

            if row.iter().all(|v| v.trim().is_empty()) {
                continue;
            }

            items.push(Item {
                id: row_number.to_string(),
                schedule: Schedule::parse(&cell(&row, map.schedule).unwrap_or_default()),
                text: cell(&row, map.text),
                title: cell(&row, map.title),
                summary: None,
                link: None,
                image_url: cell(&row, map.image),
                status: ItemStatus::decode(&cell(&row, Some(map.status)).unwrap_or_default()),
                breaking: false,
            });
        }

        Ok(items)
    }

    async fn write_status(&self, item_id: &str, status: &ItemStatus) -> Result<(), SourceError> {
        let row: usize = item_id
            .parse()
            .map_err(|_| SourceError::Parse(format!("Not a row number: {}", item_id)))?;
        let column = self.status_column().await?;

        let range = format!("{}!{}{}", self.quoted_sheet(), column_letter(column), row);
        let encoded = status.encode();
        let body = ValueUpdate {
            range: &range,
            major_dimension: "ROWS",
            values: [[encoded.as_str()]],
        };

        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let token = self.tokens.bearer(&self.client).await?;
        let response = self
            .client
            .put(url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        check_status(response).await?;
        tracing::debug!(row = row, range = %range, status = %encoded, "Wrote status cell");

        Ok(())
    }
}
