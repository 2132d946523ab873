//! Request parameters
//!
//! `RawQuery` mirrors the query form field for field; `QueryParams` is the
//! validated request handed to the aggregator, table builder and charts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use zotag_common::{Error, Result};

/// How union cells are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValuesType {
    /// Raw item counts
    #[default]
    #[serde(rename = "raw")]
    Raw,
    /// Percent of the filter-adjusted total for the X tag
    #[serde(rename = "percent")]
    PercentOfColumn,
    /// Percent of the row's own total
    #[serde(rename = "percent_matches")]
    PercentOfRow,
}

impl FromStr for ValuesType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "raw" => Ok(ValuesType::Raw),
            "percent" => Ok(ValuesType::PercentOfColumn),
            "percent_matches" => Ok(ValuesType::PercentOfRow),
            other => Err(Error::InvalidInput(format!("Unknown values_type '{}'", other))),
        }
    }
}

/// Response shape selected by the `format` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
    Image,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            "image" => Ok(OutputFormat::Image),
            other => Err(Error::InvalidInput(format!("Unknown format '{}'", other))),
        }
    }
}

/// Bar orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    Bar,
    #[default]
    Barh,
}

impl FromStr for GraphFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "barh" => Ok(GraphFormat::Barh),
            "bar" => Ok(GraphFormat::Bar),
            other => Err(Error::InvalidInput(format!("Unknown graph_format '{}'", other))),
        }
    }
}

/// Requested chart file type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    Svg,
    Png,
    Pdf,
}

impl ImageType {
    pub fn extension(self) -> &'static str {
        match self {
            ImageType::Svg => "svg",
            ImageType::Png => "png",
            ImageType::Pdf => "pdf",
        }
    }
}

impl FromStr for ImageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "svg" => Ok(ImageType::Svg),
            "png" => Ok(ImageType::Png),
            "pdf" => Ok(ImageType::Pdf),
            other => Err(Error::InvalidInput(format!("Unknown image_type '{}'", other))),
        }
    }
}

/// Chart presentation flags
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartOptions {
    pub graph_format: GraphFormat,
    pub image_type: ImageType,
    pub stacked: bool,
    pub square: bool,
    /// Print values at the end of each bar (horizontal bars only)
    pub label_bars: bool,
    /// Bar labels as integers instead of one decimal
    pub label_int: bool,
    /// One chart per X tag
    pub subplots: bool,
}

/// Validated request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryParams {
    pub tags_x: Vec<String>,
    pub tags_y: Vec<String>,
    pub filter: Vec<String>,
    pub values_type: ValuesType,
    pub sort: bool,
    pub transpose: bool,
    pub chart: ChartOptions,
}

impl QueryParams {
    /// Stable content hash of the full request
    ///
    /// SHA-256 of the key-sorted JSON serialization; names rendered chart
    /// files so identical requests reuse one image.
    pub fn request_hash(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let canonical = sorted_json(&value);
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

fn sorted_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        sorted_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let items: Vec<String> = items.iter().map(sorted_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// Raw query-string fields as submitted by the form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuery {
    pub format: Option<String>,
    pub values_type: Option<String>,
    pub graph_format: Option<String>,
    pub image_type: Option<String>,
    pub stack: Option<String>,
    pub sort: Option<String>,
    pub transpose: Option<String>,
    pub subplots: Option<String>,
    pub square: Option<String>,
    pub label_bars: Option<String>,
    pub label_int: Option<String>,
    pub tags_x: Option<String>,
    pub tags_y: Option<String>,
    pub filter: Option<String>,
}

impl RawQuery {
    /// `None` means "show the form"
    pub fn output_format(&self) -> Result<Option<OutputFormat>> {
        match self.format.as_deref().map(str::trim) {
            None | Some("") | Some("none") => Ok(None),
            Some(f) => f.parse().map(Some),
        }
    }

    pub fn to_params(&self) -> Result<QueryParams> {
        Ok(QueryParams {
            tags_x: split_tag_list(self.tags_x.as_deref()),
            tags_y: split_tag_list(self.tags_y.as_deref()),
            filter: split_tag_list(self.filter.as_deref()),
            values_type: parse_choice(&self.values_type)?,
            sort: flag(&self.sort),
            transpose: flag(&self.transpose),
            chart: ChartOptions {
                graph_format: parse_choice(&self.graph_format)?,
                image_type: parse_choice(&self.image_type)?,
                stacked: flag(&self.stack),
                square: flag(&self.square),
                label_bars: flag(&self.label_bars),
                label_int: flag(&self.label_int),
                subplots: flag(&self.subplots),
            },
        })
    }
}

fn parse_choice<T: FromStr<Err = Error> + Default>(value: &Option<String>) -> Result<T> {
    match value.as_deref().map(str::trim) {
        None => Ok(T::default()),
        Some(v) => v.parse(),
    }
}

/// Checkbox semantics: present and non-empty means set
fn flag(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| {
        let v = v.trim();
        !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
    })
}

/// Split a newline-separated list field, tolerating CRLF and dropping blanks
///
/// Surrounding whitespace is trimmed from each entry; Zotero stores tags
/// trimmed, so a padded entry names the same tag.
pub fn split_tag_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .lines()
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
