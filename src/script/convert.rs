//! Conversion between engine values and sandbox [`Value`]s.
//!
//! Only data crosses into a sandbox. Functions, symbols, the sandbox's own
//! global object and back-references in cyclic graphs are stored as
//! `undefined`. Graphs deeper or wider than the configured limits are
//! rejected with a `TypeError` instead of being copied.

use std::collections::BTreeMap;

use boa_engine::object::builtins::JsArray;
use boa_engine::{
    js_string, Context, JsNativeError, JsObject, JsResult, JsString, JsValue,
};

use super::value::Value;

#[derive(Debug, Clone)]
pub(crate) struct Converter {
    /// The realm's `Object.keys`, captured before any script ran.
    object_keys: JsObject,
    /// The sandbox global; never copied into itself.
    global: JsObject,
    max_depth: usize,
    max_length: u64,
}

impl Converter {
    pub(crate) fn new(
        object_keys: JsObject,
        global: JsObject,
        max_depth: usize,
        max_length: u64,
    ) -> Self {
        Self {
            object_keys,
            global,
            max_depth,
            max_length,
        }
    }

    /// Copy an engine value out as sandbox data.
    pub(crate) fn to_value(&self, value: &JsValue, context: &mut Context) -> JsResult<Value> {
        let mut ancestors = Vec::new();
        self.convert(value, &mut ancestors, context)
    }

    fn convert(
        &self,
        value: &JsValue,
        ancestors: &mut Vec<JsObject>,
        context: &mut Context,
    ) -> JsResult<Value> {
        if let Some(b) = value.as_boolean() {
            return Ok(Value::Bool(b));
        }
        if let Some(n) = value.as_number() {
            return Ok(Value::Number(n));
        }
        if let Some(s) = value.as_string() {
            return Ok(Value::String(s.to_std_string_escaped()));
        }
        if value.is_null() {
            return Ok(Value::Null);
        }
        if value.is_bigint() {
            return Ok(Value::String(value.display().to_string()));
        }
        let Some(object) = value.as_object() else {
            return Ok(Value::Undefined);
        };

        let skipped = object.is_callable()
            || JsObject::equals(object, &self.global)
            || ancestors.iter().any(|seen| JsObject::equals(seen, object));
        if skipped {
            return Ok(Value::Undefined);
        }
        if ancestors.len() >= self.max_depth {
            return Err(too_large(format!(
                "object nesting exceeds {} levels",
                self.max_depth
            )));
        }

        ancestors.push(object.clone());
        let converted = if object.is_array() {
            self.array(object, ancestors, context)
        } else {
            self.object(object, ancestors, context)
        };
        ancestors.pop();
        converted
    }

    fn array(
        &self,
        array: &JsObject,
        ancestors: &mut Vec<JsObject>,
        context: &mut Context,
    ) -> JsResult<Value> {
        let length = array.get(js_string!("length"), context)?.to_length(context)?;
        self.check_length(length)?;

        let mut items = Vec::with_capacity(usize::try_from(length).unwrap_or_default());
        for index in 0..length {
            let index = u32::try_from(index).map_err(|_| too_large("array index out of range"))?;
            let item = array.get(index, context)?;
            items.push(self.convert(&item, ancestors, context)?);
        }
        Ok(Value::Array(items))
    }

    fn object(
        &self,
        object: &JsObject,
        ancestors: &mut Vec<JsObject>,
        context: &mut Context,
    ) -> JsResult<Value> {
        let keys = self
            .object_keys
            .call(&JsValue::undefined(), &[object.clone().into()], context)?;
        let Some(keys) = keys.as_object() else {
            return Ok(Value::Object(BTreeMap::new()));
        };
        let length = keys.get(js_string!("length"), context)?.to_length(context)?;
        self.check_length(length)?;

        let mut map = BTreeMap::new();
        for index in 0..length {
            let index = u32::try_from(index).map_err(|_| too_large("key index out of range"))?;
            let key = keys.get(index, context)?;
            let Some(key) = key.as_string() else {
                continue;
            };
            let item = object.get(key.clone(), context)?;
            let item = self.convert(&item, ancestors, context)?;
            if !item.is_undefined() {
                map.insert(key.to_std_string_escaped(), item);
            }
        }
        Ok(Value::Object(map))
    }

    fn check_length(&self, length: u64) -> JsResult<()> {
        if length > self.max_length {
            return Err(too_large(format!(
                "length {length} exceeds {}",
                self.max_length
            )));
        }
        Ok(())
    }
}

/// Build an engine value from sandbox data.
pub(crate) fn to_js(value: &Value, context: &mut Context) -> JsResult<JsValue> {
    Ok(match value {
        Value::Undefined => JsValue::undefined(),
        Value::Null => JsValue::null(),
        Value::Bool(b) => JsValue::from(*b),
        Value::Number(n) => JsValue::from(*n),
        Value::String(s) => JsValue::from(JsString::from(s.as_str())),
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| to_js(item, context))
                .collect::<JsResult<Vec<_>>>()?;
            JsArray::from_iter(items, context).into()
        }
        Value::Object(map) => {
            let object = JsObject::with_object_proto(context.intrinsics());
            for (key, item) in map {
                let item = to_js(item, context)?;
                object.create_data_property_or_throw(JsString::from(key.as_str()), item, context)?;
            }
            object.into()
        }
    })
}

fn too_large(detail: impl Into<String>) -> boa_engine::JsError {
    let detail = detail.into();
    JsNativeError::typ()
        .with_message(format!("value is too large to store on the sandbox: {detail}"))
        .into()
}
