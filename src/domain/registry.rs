//! Name-keyed registry of tool descriptors and their handlers

use rust_mcp_sdk::schema::{CallToolResult, Tool};
use serde_json::{Map, Value};

use crate::domain::tools::{
    how_was_day, last_month_sale, HowWasDayTool, LastMonthSaleTool,
};
use crate::errors::AppError;

pub type ToolHandler = fn(Map<String, Value>) -> Result<CallToolResult, AppError>;

#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub descriptor: Tool,
    handler: ToolHandler,
}

/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_tools() -> Self {
        Self::new()
            .register(HowWasDayTool::tool(), how_was_day)
            .register(LastMonthSaleTool::tool(), last_month_sale)
    }

    /// Adds a tool, replacing any earlier registration under the same name.
    pub fn register(mut self, descriptor: Tool, handler: ToolHandler) -> Self {
        self.tools.retain(|tool| tool.descriptor.name != descriptor.name);
        self.tools.push(RegisteredTool {
            descriptor,
            handler,
        });
        self
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|tool| tool.descriptor.clone())
            .collect()
    }

    pub fn call(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, AppError> {
        let tool = self
            .find(name)
            .ok_or_else(|| AppError::tool_not_found(name))?;
        (tool.handler)(arguments.unwrap_or_default())
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|tool| tool.descriptor.name == name)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::tools::{text_result, HOW_WAS_DAY, LAST_MONTH_SALE};

    #[test]
    fn builtin_tools_are_listed_in_registration_order() {
        let names: Vec<String> = ToolRegistry::with_builtin_tools()
            .list()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, vec![HOW_WAS_DAY, LAST_MONTH_SALE]);
    }

    #[test]
    fn call_dispatches_by_name() {
        let registry = ToolRegistry::with_builtin_tools();
        let arguments = json!({"month": "May"}).as_object().cloned();

        let result = registry
            .call(LAST_MONTH_SALE, arguments)
            .expect("tool result");
        let value = serde_json::to_value(result).expect("serializable result");
        assert_eq!(value["content"][0]["text"], "Sales for May: 500");
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let error = ToolRegistry::with_builtin_tools()
            .call("weather", None)
            .expect_err("unknown tool");
        assert!(matches!(error, AppError::ToolNotFound { ref name } if name == "weather"));
    }

    #[test]
    fn register_replaces_same_name() {
        fn canned(_: Map<String, Value>) -> Result<CallToolResult, AppError> {
            Ok(text_result("replaced"))
        }

        let registry = ToolRegistry::with_builtin_tools().register(HowWasDayTool::tool(), canned);
        assert_eq!(registry.list().len(), 2);

        let value = serde_json::to_value(registry.call(HOW_WAS_DAY, None).expect("tool result"))
            .expect("serializable result");
        assert_eq!(value["content"][0]["text"], "replaced");
    }
}
