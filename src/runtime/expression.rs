/// Sandboxed Lua expressions for transform and condition steps
///
/// Step configs are user-authored, so every evaluation gets a fresh
/// interpreter with only the `math`, `string` and `table` libraries, no code
/// loading, no raw table access, a memory ceiling and a wall-clock deadline.
/// Inputs are copied in as Lua tables and the result is converted back to JSON.

use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Table, Value as LuaValue, VmState};
use serde_json::{Map, Value};
use std::{
    collections::HashSet,
    ffi::c_void,
    time::{Duration, Instant},
};

/// Upper bound on interpreter memory per evaluation
pub const MEMORY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

/// Deepest table nesting converted back to JSON
pub const MAX_RESULT_DEPTH: usize = 128;

/// VM instructions between deadline checks
const DEADLINE_CHECK_INTERVAL: u32 = 1000;

/// Globals removed after the restricted libraries are loaded
const BLOCKED_GLOBALS: &[&str] = &[
    "load",
    "loadstring",
    "dofile",
    "loadfile",
    "require",
    "collectgarbage",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    "getmetatable",
    "setmetatable",
    "print",
    "pcall",
    "xpcall",
];

/// Globals visible to an expression
#[derive(Debug, Default)]
pub struct ExpressionScope<'a> {
    bindings: Vec<(&'a str, &'a Value)>,
}

impl<'a> ExpressionScope<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: &'a str, value: &'a Value) -> Self {
        self.bindings.push((name, value));
        self
    }
}

/// Evaluate a Lua expression (or chunk ending in `return`) against the scope
///
/// Blocks the calling thread until the chunk returns or `timeout` elapses.
pub fn evaluate(expression: &str, scope: &ExpressionScope<'_>, timeout: Duration) -> Result<Value, String> {
    let lua = sandbox(timeout).map_err(|e| format!("failed to create sandbox: {}", e))?;
    let globals = lua.globals();

    for (name, value) in &scope.bindings {
        let lua_value = json_to_lua(&lua, value).map_err(|e| format!("failed to bind '{}': {}", name, e))?;
        globals
            .set(*name, lua_value)
            .map_err(|e| format!("failed to bind '{}': {}", name, e))?;
    }

    let result: LuaValue = lua.load(expression).eval().map_err(|e| e.to_string())?;
    lua_to_json(result, 0, &mut HashSet::new())
}

/// Lua truthiness, with JSON null counted as false
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn sandbox(timeout: Duration) -> mlua::Result<Lua> {
    let lua = Lua::new_with(StdLib::MATH | StdLib::STRING | StdLib::TABLE, LuaOptions::new())?;
    lua.set_memory_limit(MEMORY_LIMIT_BYTES)?;

    let deadline = Instant::now() + timeout;
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INTERVAL),
        move |_, _| {
            if Instant::now() >= deadline {
                return Err(mlua::Error::runtime(format!(
                    "expression exceeded its {}ms time limit",
                    timeout.as_millis()
                )));
            }
            Ok(VmState::Continue)
        },
    )?;

    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
        globals.set(*name, LuaValue::Nil)?;
    }
    Ok(lua)
}

/// Build Lua values directly from JSON; no source text is generated
fn json_to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
    Ok(match value {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Object(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                table.raw_set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Convert a Lua result back to JSON
///
/// Tables with keys 1..n and nothing else become arrays; every other table
/// becomes an object. Functions and userdata become null. `ancestors` holds
/// the tables on the current path, so a table that contains itself is an
/// error rather than endless recursion.
fn lua_to_json(lua_value: LuaValue, depth: usize, ancestors: &mut HashSet<*const c_void>) -> Result<Value, String> {
    match lua_value {
        LuaValue::Nil => Ok(Value::Null),
        LuaValue::Boolean(b) => Ok(Value::Bool(b)),
        LuaValue::Integer(i) => Ok(Value::Number(serde_json::Number::from(i))),
        LuaValue::Number(f) => Ok(serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        LuaValue::String(s) => {
            let text = s.to_str().map_err(|e| format!("invalid UTF-8 in Lua string: {}", e))?;
            Ok(Value::String(text.to_string()))
        }
        LuaValue::Table(table) => {
            if depth >= MAX_RESULT_DEPTH {
                return Err(format!("result nests deeper than {} tables", MAX_RESULT_DEPTH));
            }
            let pointer = table.to_pointer();
            if !ancestors.insert(pointer) {
                return Err("result table contains itself".to_string());
            }
            let converted = table_to_json(table, depth, ancestors);
            ancestors.remove(&pointer);
            converted
        }
        _ => Ok(Value::Null),
    }
}

fn table_to_json(table: Table, depth: usize, ancestors: &mut HashSet<*const c_void>) -> Result<Value, String> {
    let mut is_array = true;
    let mut max_index = 0usize;
    let mut count = 0usize;

    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let (key, _) = pair.map_err(|e| format!("failed to iterate Lua table: {}", e))?;
        count += 1;
        match key {
            LuaValue::Integer(i) if i > 0 => max_index = max_index.max(i as usize),
            _ => {
                is_array = false;
                break;
            }
        }
    }

    if is_array && count > 0 && count == max_index {
        let mut items = Vec::with_capacity(max_index);
        for i in 1..=max_index {
            let item: LuaValue = table
                .raw_get(i)
                .map_err(|e| format!("failed to read Lua table: {}", e))?;
            items.push(lua_to_json(item, depth + 1, ancestors)?);
        }
        Ok(Value::Array(items))
    } else {
        let mut object = Map::new();
        for pair in table.pairs::<LuaValue, LuaValue>() {
            let (key, item) = pair.map_err(|e| format!("failed to iterate Lua table: {}", e))?;
            let key = match key {
                LuaValue::String(s) => s
                    .to_str()
                    .map_err(|e| format!("invalid UTF-8 in Lua key: {}", e))?
                    .to_string(),
                LuaValue::Integer(i) => i.to_string(),
                LuaValue::Number(f) => f.to_string(),
                _ => continue,
            };
            object.insert(key, lua_to_json(item, depth + 1, ancestors)?);
        }
        Ok(Value::Object(object))
    }
}
