use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{display, io_error, parse_typed_config};
use crate::{Context, ExecutableTask, TaskError};

type Record = Map<String, Value>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TransformType {
    #[default]
    CsvToJson,
    JsonToCsv,
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Aggregation {
    Size,
    Count,
    Sum,
    Mean,
    Min,
    Max,
    First,
    Last,
}

impl Aggregation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Columns {
    One(String),
    Many(Vec<String>),
}

impl Default for Columns {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Columns {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(column) if column.is_empty() => Vec::new(),
            Self::One(column) => vec![column],
            Self::Many(columns) => columns,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TransformConfig {
    source_file: Option<String>,
    destination_file: Option<String>,
    #[serde(default)]
    transform_type: TransformType,
    #[serde(default)]
    group_by: Columns,
    #[serde(default)]
    agg_functions: BTreeMap<String, Aggregation>,
}

/// Convert between CSV and JSON, or group CSV rows and aggregate columns.
///
/// CSV cells are typed on read: empty cells become `null`, numeric and
/// boolean text becomes the matching JSON value.
pub struct TransformTask {
    name: String,
    config: Value,
}

impl TransformTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self { name: name.into(), config }
    }
}

fn cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Some(n) = raw.parse::<f64>().ok().filter(|n| n.is_finite()) {
        return Value::from(n);
    }
    match raw {
        "true" | "True" => Value::Bool(true),
        "false" | "False" => Value::Bool(false),
        _ => Value::String(raw.to_owned()),
    }
}

fn read_csv(path: &str, bytes: &[u8]) -> Result<(Vec<String>, Vec<Record>), TaskError> {
    let parse_error = |e: csv::Error| TaskError::execution(format!("parse {path}: {e}"));
    let mut reader = csv::Reader::from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(parse_error)?
        .iter()
        .map(str::to_owned)
        .collect();

    let mut rows: Vec<Record> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_error)?;
        rows.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(cell))
                .collect(),
        );
    }
    Ok((headers, rows))
}

fn write_csv(headers: &[String], rows: &[Record]) -> Result<Vec<u8>, TaskError> {
    let write_error = |e: csv::Error| TaskError::execution(format!("write csv: {e}"));
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers).map_err(write_error)?;
    for row in rows {
        writer
            .write_record(headers.iter().map(|h| display(row.get(h).unwrap_or(&Value::Null))))
            .map_err(write_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| TaskError::execution(format!("write csv: {e}")))
}

/// Numbers compare numerically; anything else by its display text.
fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => display(a).cmp(&display(b)),
    }
}

fn numbers<'a>(
    values: &[&'a Value],
    agg: Aggregation,
    column: &str,
) -> Result<Vec<&'a serde_json::Number>, TaskError> {
    values
        .iter()
        .map(|&v| match v {
            Value::Number(n) => Ok(n),
            _ => Err(TaskError::execution(format!(
                "cannot {} non-numeric column {column}",
                agg.as_str()
            ))),
        })
        .collect()
}

fn aggregate(agg: Aggregation, column: &str, rows: &[&Record]) -> Result<Value, TaskError> {
    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_null())
        .collect();

    Ok(match agg {
        Aggregation::Size => Value::from(rows.len()),
        Aggregation::Count => Value::from(values.len()),
        Aggregation::Sum => {
            let nums = numbers(&values, agg, column)?;
            match nums.iter().map(|n| n.as_i64()).collect::<Option<Vec<_>>>() {
                Some(ints) => Value::from(ints.into_iter().sum::<i64>()),
                None => Value::from(nums.iter().filter_map(|n| n.as_f64()).sum::<f64>()),
            }
        }
        Aggregation::Mean => {
            let nums = numbers(&values, agg, column)?;
            if nums.is_empty() {
                Value::Null
            } else {
                let total: f64 = nums.iter().filter_map(|n| n.as_f64()).sum();
                Value::from(total / nums.len() as f64)
            }
        }
        Aggregation::Min => values
            .iter()
            .min_by(|a, b| compare(a, b))
            .map_or(Value::Null, |v| (*v).clone()),
        Aggregation::Max => values
            .iter()
            .max_by(|a, b| compare(a, b))
            .map_or(Value::Null, |v| (*v).clone()),
        Aggregation::First => values.first().map_or(Value::Null, |v| (*v).clone()),
        Aggregation::Last => values.last().map_or(Value::Null, |v| (*v).clone()),
    })
}

fn group_rows(
    headers: &[String],
    rows: &[Record],
    group_by: &[String],
    aggs: &BTreeMap<String, Aggregation>,
) -> Result<Vec<Record>, TaskError> {
    let known = |column: &String| headers.contains(column);
    if let Some(column) = group_by.iter().find(|c| !known(*c)) {
        return Err(TaskError::configuration(format!("unknown group_by column: {column}")));
    }
    if let Some((column, _)) = aggs
        .iter()
        .find(|(column, agg)| **agg != Aggregation::Size && !known(*column))
    {
        return Err(TaskError::configuration(format!("unknown agg_functions column: {column}")));
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<&Record>)> = Vec::new();
    for row in rows {
        let key: Vec<Value> = group_by
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        let slot = *index
            .entry(Value::from(key.clone()).to_string())
            .or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
        groups[slot].1.push(row);
    }
    groups.sort_by(|(a, _), (b, _)| {
        a.iter()
            .zip(b)
            .map(|(x, y)| compare(x, y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    groups
        .into_iter()
        .map(|(key, members)| -> Result<Record, TaskError> {
            let mut out: Record = group_by.iter().cloned().zip(key).collect();
            for (column, agg) in aggs {
                out.insert(column.clone(), aggregate(*agg, column, &members)?);
            }
            Ok(out)
        })
        .collect()
}

async fn read_source(path: &str) -> Result<Vec<u8>, TaskError> {
    tokio::fs::read(path).await.map_err(|e| io_error("read", path, e))
}

async fn write_destination(path: &str, contents: Vec<u8>) -> Result<(), TaskError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| io_error("write", path, e))
}

#[async_trait]
impl ExecutableTask for TransformTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        let config: TransformConfig =
            parse_typed_config(&self.config, ctx, &["group_by", "agg_functions"])?;
        let source = config
            .source_file
            .ok_or_else(|| TaskError::missing("source_file"))?;
        let destination = config.destination_file;
        debug!(task = %self.name, kind = ?config.transform_type, source = %source, "transforming");

        match config.transform_type {
            TransformType::CsvToJson => {
                let (_, rows) = read_csv(&source, &read_source(&source).await?)?;
                let records = Value::Array(rows.into_iter().map(Value::Object).collect());
                if let Some(dest) = &destination {
                    let pretty = serde_json::to_vec_pretty(&records)
                        .map_err(|e| TaskError::execution(e.to_string()))?;
                    write_destination(dest, pretty).await?;
                }
                Ok(records)
            }
            TransformType::JsonToCsv => {
                let data: Value = serde_json::from_slice(&read_source(&source).await?)
                    .map_err(|e| TaskError::execution(format!("parse {source}: {e}")))?;
                let rows: Vec<Record> = match data {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| match item {
                            Value::Object(record) => Ok(record),
                            _ => Err(()),
                        })
                        .collect::<Result<Vec<Record>, ()>>()
                        .ok(),
                    _ => None,
                }
                .ok_or_else(|| {
                    TaskError::execution(format!("{source} must hold a JSON array of objects"))
                })?;

                let mut headers: Vec<String> = Vec::new();
                for key in rows.iter().flat_map(|row| row.keys()) {
                    if !headers.contains(key) {
                        headers.push(key.clone());
                    }
                }
                let csv = write_csv(&headers, &rows)?;
                match &destination {
                    Some(dest) => {
                        write_destination(dest, csv).await?;
                        Ok(Value::String(format!("Converted to CSV: {dest}")))
                    }
                    None => Ok(Value::String(String::from_utf8_lossy(&csv).into_owned())),
                }
            }
            TransformType::Aggregate => {
                let group_by = config.group_by.into_vec();
                if group_by.is_empty() {
                    return Err(TaskError::configuration(
                        "group_by is required for aggregate transform",
                    ));
                }
                let mut aggs = config.agg_functions;
                if aggs.is_empty() {
                    aggs.insert("count".into(), Aggregation::Size);
                }

                let (headers, rows) = read_csv(&source, &read_source(&source).await?)?;
                let grouped = group_rows(&headers, &rows, &group_by, &aggs)?;
                if let Some(dest) = &destination {
                    let columns: Vec<String> =
                        group_by.iter().chain(aggs.keys()).cloned().collect();
                    write_destination(dest, write_csv(&columns, &grouped)?).await?;
                }
                Ok(Value::Array(grouped.into_iter().map(Value::Object).collect()))
            }
        }
    }
}
