//! Canned-response tools exposed via Model Context Protocol
//!
//! Provides `how-was-day` and `getLastMonthSale`. Both are pure string
//! templates over their validated arguments.

use rust_mcp_sdk::{
    macros,
    schema::{CallToolResult, ContentBlock, TextContent},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;

pub const HOW_WAS_DAY: &str = "how-was-day";
pub const LAST_MONTH_SALE: &str = "getLastMonthSale";
pub const LAST_MONTH_SALE_AMOUNT: u32 = 500;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HowWasDayParams {
    pub location: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LastMonthSaleParams {
    pub month: String,
}

#[macros::mcp_tool(
    name = "how-was-day",
    description = "Report how the day went, optionally for a location and date"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct HowWasDayTool {
    /// Location the day is reported for, e.g. a clinic name
    pub location: Option<String>,
    /// Date of the day being reported, e.g. 2024-01-01
    pub date: Option<String>,
}

#[macros::mcp_tool(
    name = "getLastMonthSale",
    description = "Return the sales figure for the given month"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct LastMonthSaleTool {
    /// Month to report sales for, e.g. March
    pub month: String,
}

fn parse_arguments<T>(arguments: Map<String, Value>) -> Result<T, AppError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| AppError::invalid_params("invalid_arguments", err.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text.into(), None, None))],
        is_error: None,
        meta: None,
        structured_content: None,
    }
}

pub fn describe_day(location: Option<&str>, date: Option<&str>) -> String {
    match (location, date) {
        (Some(location), Some(date)) => format!("It was awesome at {location} on {date}"),
        (Some(location), None) => format!("It was awesome at {location} today"),
        (None, Some(date)) => format!("It was awesome on {date}"),
        (None, None) => "It was awesome today".to_string(),
    }
}

pub fn how_was_day(arguments: Map<String, Value>) -> Result<CallToolResult, AppError> {
    let params: HowWasDayParams = parse_arguments(arguments)?;
    let location = non_blank(params.location);
    let date = non_blank(params.date);

    Ok(text_result(describe_day(
        location.as_deref(),
        date.as_deref(),
    )))
}

pub fn last_month_sale(arguments: Map<String, Value>) -> Result<CallToolResult, AppError> {
    let params: LastMonthSaleParams = parse_arguments(arguments)?;
    let Some(month) = non_blank(Some(params.month)) else {
        return Err(AppError::invalid_params(
            "invalid_month",
            "month must not be empty",
        ));
    };

    Ok(text_result(format!(
        "Sales for {month}: {LAST_MONTH_SALE_AMOUNT}"
    )))
}
