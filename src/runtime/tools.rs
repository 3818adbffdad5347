// src/runtime/tools.rs — Tool capability interface and built-in tools
//
// A tool is a name, a JSON input schema and a handler. The built-ins return
// placeholder data; wire real order/inventory systems in behind the same names.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::RuntimeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

type Handler = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
struct RegisteredTool {
    def: ToolDef,
    handler: Handler,
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            ToolDef {
                name: "get_current_time".into(),
                description: "Get the current UTC time.".into(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            |_| Ok(get_current_time()),
        );
        registry.register(
            ToolDef {
                name: "search_products".into(),
                description: "Search for products by query.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Search query" },
                        "max_results": { "type": "integer", "description": "Maximum results (default 5)" }
                    },
                    "required": ["query"]
                }),
            },
            |args| {
                let query = required_str(args, "query")?;
                let max = args["max_results"].as_u64().unwrap_or(5);
                Ok(search_products(query, max))
            },
        );
        registry.register(
            ToolDef {
                name: "lookup_order".into(),
                description: "Look up an order by ID, returning status and items.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "order_id": { "type": "string", "description": "The order identifier" }
                    },
                    "required": ["order_id"]
                }),
            },
            |args| Ok(lookup_order(required_str(args, "order_id")?)),
        );
        registry.register(
            ToolDef {
                name: "check_inventory".into(),
                description: "Check inventory levels and warehouse location for a product.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "product_name": { "type": "string", "description": "The product name" }
                    },
                    "required": ["product_name"]
                }),
            },
            |args| Ok(check_inventory(required_str(args, "product_name")?)),
        );
        registry.register(
            ToolDef {
                name: "schedule_delivery".into(),
                description: "Schedule a delivery for an order and return a tracking number.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "order_id": { "type": "string", "description": "The order to deliver" },
                        "address": { "type": "string", "description": "Delivery address" },
                        "preferred_date": { "type": "string", "description": "Preferred date (YYYY-MM-DD)" }
                    },
                    "required": ["order_id", "address"]
                }),
            },
            |args| {
                let order_id = required_str(args, "order_id")?;
                let address = required_str(args, "address")?;
                let preferred = args["preferred_date"].as_str().unwrap_or("");
                Ok(schedule_delivery(order_id, address, preferred))
            },
        );
        registry
    }

    pub fn register<F>(&mut self, def: ToolDef, handler: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.tools.retain(|t| t.def.name != def.name);
        self.tools.push(RegisteredTool {
            def,
            handler: Arc::new(handler),
        });
    }

    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.iter().map(|t| t.def.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn call(&self, name: &str, args: &Value) -> Result<Value, RuntimeError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.def.name == name)
            .ok_or_else(|| RuntimeError::UnknownTool { name: name.into() })?;
        (tool.handler)(args).map_err(|message| RuntimeError::Tool {
            name: name.into(),
            message,
        })
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args[key]
        .as_str()
        .ok_or_else(|| format!("missing string argument '{key}'"))
}

fn get_current_time() -> Value {
    let now = chrono::Utc::now();
    json!({ "time": now.to_rfc3339(), "unix": now.timestamp() })
}

fn search_products(query: &str, max_results: u64) -> Value {
    let results: Vec<Value> = (0..max_results.min(5))
        .map(|i| json!({ "name": format!("Product {i}"), "price": 9.99 + i as f64, "query": query }))
        .collect();
    json!({ "results": results })
}

fn lookup_order(order_id: &str) -> Value {
    json!({
        "order_id": order_id,
        "status": "processing",
        "items": [
            { "name": "Widget A", "quantity": 2, "price": 19.99 },
            { "name": "Widget B", "quantity": 1, "price": 29.99 }
        ],
        "total": 69.97,
        "estimated_delivery": "2026-03-01"
    })
}

fn check_inventory(product_name: &str) -> Value {
    json!({
        "product": product_name,
        "in_stock": true,
        "quantity": 150,
        "warehouse": "Berlin-01",
        "last_restocked": chrono::Utc::now().to_rfc3339()
    })
}

fn schedule_delivery(order_id: &str, address: &str, preferred_date: &str) -> Value {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    let date = if preferred_date.is_empty() {
        "2026-03-01"
    } else {
        preferred_date
    };
    json!({
        "order_id": order_id,
        "tracking_number": format!("HRM-{}", suffix.to_uppercase()),
        "address": address,
        "scheduled_date": date,
        "status": "scheduled"
    })
}
