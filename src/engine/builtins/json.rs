//! The JSON object, §15.12: a hand-rolled grammar-faithful parser and
//! the stringifier with reviver, replacer, gap, and cycle detection.

use std::collections::HashSet;

use super::{arg, has_unknown};
use crate::engine::builtins::object::own_property_names;
use crate::engine::conversions;
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value, number_ops};

impl Engine {
    pub(crate) fn setup_json_builtin(&mut self) {
        let json = self.create_object();
        json.borrow_mut().class_name = "JSON".to_string();

        // §15.12.2
        self.add_native(&json, "parse", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(text) = tryc!(engine.string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let mut parser = JsonParser::new(&text);
            let value = match parser.parse_value(engine) {
                Ok(v) => v,
                Err(msg) => {
                    return engine
                        .handle_recoverable_native_exception(ErrorKind::SyntaxError, &msg);
                }
            };
            parser.skip_whitespace();
            if !parser.at_end() {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::SyntaxError,
                    "Unexpected token after JSON value",
                );
            }
            let reviver = arg(args, 1);
            if engine.is_callable_value(&reviver) {
                let holder = engine.create_object();
                let holder_id = holder.borrow().id.unwrap();
                let comp = engine.object_put(holder_id, "", value, false);
                if comp.is_abrupt() {
                    return comp;
                }
                return engine.json_walk(&reviver, holder_id, "");
            }
            Completion::Normal(value)
        });

        // §15.12.3
        self.add_native(&json, "stringify", 3, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let value = arg(args, 0);
            let replacer = arg(args, 1);

            let replacer_fn = if engine.is_callable_value(&replacer) {
                Some(replacer.clone())
            } else {
                None
            };
            let property_list = if replacer_fn.is_none() {
                tryc!(engine.json_property_list(&replacer))
            } else {
                None
            };

            // §15.12.3 step 6-8: the gap from the space argument
            let space = arg(args, 2);
            let space = match &space {
                Value::Object(o) => {
                    let primitive = engine
                        .get_object(o.id)
                        .and_then(|obj| obj.borrow().primitive_value.clone());
                    primitive.unwrap_or(space.clone())
                }
                other => other.clone(),
            };
            let gap = match &space {
                Value::Number(n) => {
                    let count = conversions::to_integer(*n).clamp(0.0, 10.0) as usize;
                    " ".repeat(count)
                }
                Value::String(s) => {
                    let text = s.to_rust_string();
                    text.chars().take(10).collect()
                }
                _ => String::new(),
            };

            let mut serializer = JsonStringifier {
                replacer: replacer_fn,
                property_list,
                gap,
                indent: String::new(),
                stack: HashSet::new(),
            };
            let holder = engine.create_object();
            let holder_id = holder.borrow().id.unwrap();
            let comp = engine.object_put(holder_id, "", value, false);
            if comp.is_abrupt() {
                return comp;
            }
            match serializer.serialize_property(engine, holder_id, "") {
                Ok(Some(text)) => Completion::Normal(Value::String(JsString::from_str(&text))),
                Ok(None) => Completion::Normal(Value::Undefined),
                Err(comp) => comp.unwrap_or_else(|| Completion::Normal(Value::Unknown)),
            }
        });

        let json_val = Engine::handle_of(&json);
        self.global_object()
            .borrow_mut()
            .insert_builtin("JSON".to_string(), json_val);
    }

    /// §15.12.2 Walk: bottom-up reviver application.
    fn json_walk(&mut self, reviver: &Value, holder_id: u64, key: &str) -> Completion {
        let value = match self.object_get(holder_id, key) {
            Completion::Normal(v) => v,
            other => return other,
        };
        if let Value::Object(o) = &value {
            let names: Vec<String> = {
                let Some(obj) = self.get_object(o.id) else {
                    return Completion::Normal(Value::Undefined);
                };
                let is_array = obj.borrow().is_array();
                if is_array {
                    let len = obj.borrow().array_length().unwrap_or(0);
                    (0..len).map(|i| i.to_string()).collect()
                } else {
                    own_property_names(&obj, true)
                }
            };
            for name in names {
                let new_element = match self.json_walk(reviver, o.id, &name) {
                    Completion::Normal(v) => v,
                    other => return other,
                };
                if new_element.is_undefined() {
                    let comp = self.object_delete(o.id, &name, false);
                    if comp.is_abrupt() {
                        return comp;
                    }
                } else {
                    let comp = self.object_put(o.id, &name, new_element, false);
                    if comp.is_abrupt() {
                        return comp;
                    }
                }
            }
        }
        let holder_val = Value::Object(crate::types::ObjectHandle { id: holder_id });
        let key_val = Value::String(JsString::from_str(key));
        self.call_function(reviver, &holder_val, &[key_val, value], false)
    }

    /// A replacer array becomes the ordered list of property names to
    /// serialise.
    fn json_property_list(&mut self, replacer: &Value) -> Result<Option<Vec<String>>, Completion> {
        let Some(obj) = self.resolve_object(replacer) else {
            return Ok(None);
        };
        if !obj.borrow().is_array() {
            return Ok(None);
        }
        let id = obj.borrow().id.unwrap();
        let len = obj.borrow().array_length().unwrap_or(0);
        let mut names = Vec::new();
        for i in 0..len {
            let item = match self.object_get(id, &i.to_string()) {
                Completion::Normal(v) => v,
                other => return Err(other),
            };
            let name = match &item {
                Value::String(s) => Some(s.to_rust_string()),
                Value::Number(n) => Some(number_ops::to_string(*n)),
                Value::Object(o) => {
                    let primitive = self
                        .get_object(o.id)
                        .and_then(|obj| obj.borrow().primitive_value.clone());
                    match primitive {
                        Some(Value::String(s)) => Some(s.to_rust_string()),
                        Some(Value::Number(n)) => Some(number_ops::to_string(n)),
                        _ => None,
                    }
                }
                _ => None,
            };
            if let Some(name) = name {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(Some(names))
    }
}

struct JsonParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> JsonParser<'a> {
    fn new(text: &'a str) -> Self {
        JsonParser {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len()
            && matches!(self.bytes[self.pos], b' ' | b'\t' | b'\n' | b'\r')
        {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!(
                "Expected '{}' in JSON at position {}",
                byte as char, self.pos
            ))
        }
    }

    fn parse_value(&mut self, engine: &mut Engine) -> Result<Value, String> {
        self.skip_whitespace();
        match self.peek() {
            None => Err("Unexpected end of JSON input".to_string()),
            Some(b'{') => self.parse_object(engine),
            Some(b'[') => self.parse_array(engine),
            Some(b'"') => Ok(Value::String(JsString::from_str(&self.parse_string()?))),
            Some(b't') => self.parse_keyword("true", Value::Boolean(true)),
            Some(b'f') => self.parse_keyword("false", Value::Boolean(false)),
            Some(b'n') => self.parse_keyword("null", Value::Null),
            Some(_) => self.parse_number(),
        }
    }

    fn parse_keyword(&mut self, keyword: &str, value: Value) -> Result<Value, String> {
        if self.bytes[self.pos..].starts_with(keyword.as_bytes()) {
            self.pos += keyword.len();
            Ok(value)
        } else {
            Err(format!("Unexpected token in JSON at position {}", self.pos))
        }
    }

    fn parse_number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| "Invalid JSON number".to_string())?;
        // The JSON grammar is stricter than f64::parse: no leading '+',
        // no bare '.', no leading zeros.
        if text.is_empty()
            || text.ends_with('.')
            || text.starts_with('.')
            || (text.len() > 1 && text.starts_with('0') && text.as_bytes()[1].is_ascii_digit())
        {
            return Err(format!("Unexpected token in JSON at position {start}"));
        }
        text.parse::<f64>()
            .map(Value::Number)
            .map_err(|_| format!("Invalid JSON number at position {start}"))
    }

    fn parse_string(&mut self) -> Result<String, String> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err("Unterminated JSON string".to_string()),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'/') => out.push('/'),
                        Some(b'b') => out.push('\u{0008}'),
                        Some(b'f') => out.push('\u{000C}'),
                        Some(b'n') => out.push('\n'),
                        Some(b'r') => out.push('\r'),
                        Some(b't') => out.push('\t'),
                        Some(b'u') => {
                            if self.pos + 4 >= self.bytes.len() {
                                return Err("Invalid JSON unicode escape".to_string());
                            }
                            let hex =
                                std::str::from_utf8(&self.bytes[self.pos + 1..self.pos + 5])
                                    .map_err(|_| "Invalid JSON unicode escape".to_string())?;
                            let code = u32::from_str_radix(hex, 16)
                                .map_err(|_| "Invalid JSON unicode escape".to_string())?;
                            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                            self.pos += 4;
                        }
                        _ => return Err("Invalid JSON escape".to_string()),
                    }
                    self.pos += 1;
                }
                Some(b) if b < 0x20 => {
                    return Err("Control character in JSON string".to_string());
                }
                Some(_) => {
                    // Consume one UTF-8 character
                    let remaining = std::str::from_utf8(&self.bytes[self.pos..])
                        .map_err(|_| "Invalid UTF-8 in JSON".to_string())?;
                    let c = remaining.chars().next().unwrap();
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn parse_object(&mut self, engine: &mut Engine) -> Result<Value, String> {
        self.expect(b'{')?;
        let obj = engine.create_object();
        let id = obj.borrow().id.unwrap();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Engine::handle_of(&obj));
        }
        loop {
            self.skip_whitespace();
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect(b':')?;
            let value = self.parse_value(engine)?;
            engine.object_put(id, &key, value, false);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Engine::handle_of(&obj));
                }
                _ => return Err(format!("Expected ',' or '}}' at position {}", self.pos)),
            }
        }
    }

    fn parse_array(&mut self, engine: &mut Engine) -> Result<Value, String> {
        self.expect(b'[')?;
        let mut elements = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(engine.create_array(elements));
        }
        loop {
            let value = self.parse_value(engine)?;
            elements.push(value);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(engine.create_array(elements));
                }
                _ => return Err(format!("Expected ',' or ']' at position {}", self.pos)),
            }
        }
    }
}

/// §15.12.3 state: Str, JA and JO share the replacer, gap/indent pair and
/// the cycle-detection stack.
struct JsonStringifier {
    replacer: Option<Value>,
    property_list: Option<Vec<String>>,
    gap: String,
    indent: String,
    stack: HashSet<u64>,
}

/// Serialisation failure: Some(completion) for real errors, None when the
/// result must be Unknown.
type SerializeError = Option<Completion>;

impl JsonStringifier {
    fn serialize_property(
        &mut self,
        engine: &mut Engine,
        holder_id: u64,
        key: &str,
    ) -> Result<Option<String>, SerializeError> {
        let mut value = match engine.object_get(holder_id, key) {
            Completion::Normal(v) => v,
            other => return Err(Some(other)),
        };

        // toJSON, then the replacer function
        if let Value::Object(o) = &value {
            let to_json = match engine.object_get(o.id, "toJSON") {
                Completion::Normal(v) => v,
                other => return Err(Some(other)),
            };
            if engine.is_callable_value(&to_json) {
                let key_val = Value::String(JsString::from_str(key));
                value = match engine.call_function(&to_json, &value, &[key_val], false) {
                    Completion::Normal(v) => v,
                    other => return Err(Some(other)),
                };
            }
        }
        if let Some(replacer) = &self.replacer.clone() {
            let holder_val = Value::Object(crate::types::ObjectHandle { id: holder_id });
            let key_val = Value::String(JsString::from_str(key));
            value = match engine.call_function(replacer, &holder_val, &[key_val, value], false) {
                Completion::Normal(v) => v,
                other => return Err(Some(other)),
            };
        }

        // Unwrap Number/String/Boolean wrappers
        if let Value::Object(o) = &value {
            let primitive = engine
                .get_object(o.id)
                .and_then(|obj| obj.borrow().primitive_value.clone());
            if let Some(p) = primitive {
                value = p;
            }
        }

        match &value {
            Value::Unknown => Err(None),
            Value::Null => Ok(Some("null".to_string())),
            Value::Boolean(b) => Ok(Some(b.to_string())),
            Value::Number(n) => Ok(Some(if n.is_finite() {
                number_ops::to_string(*n)
            } else {
                "null".to_string()
            })),
            Value::String(s) => Ok(Some(quote_json(&s.to_rust_string()))),
            Value::Undefined => Ok(None),
            Value::Object(o) => {
                if engine.is_callable_value(&value) {
                    return Ok(None);
                }
                let id = o.id;
                if self.stack.contains(&id) {
                    return Err(Some(engine.handle_recoverable_native_exception(
                        ErrorKind::TypeError,
                        "Converting circular structure to JSON",
                    )));
                }
                self.stack.insert(id);
                let previous_indent = self.indent.clone();
                self.indent = format!("{}{}", self.indent, self.gap);
                let is_array = engine
                    .get_object(id)
                    .map(|obj| obj.borrow().is_array())
                    .unwrap_or(false);
                let rendered = if is_array {
                    self.serialize_array(engine, id)?
                } else {
                    self.serialize_object(engine, id)?
                };
                self.indent = previous_indent;
                self.stack.remove(&id);
                Ok(Some(rendered))
            }
        }
    }

    fn serialize_array(
        &mut self,
        engine: &mut Engine,
        id: u64,
    ) -> Result<String, SerializeError> {
        let len = engine
            .get_object(id)
            .and_then(|obj| obj.borrow().array_length());
        let Some(len) = len else {
            // Unknown length: the serialised form is indeterminate.
            return Err(None);
        };
        let mut parts = Vec::with_capacity(len as usize);
        for i in 0..len {
            let rendered = self.serialize_property(engine, id, &i.to_string())?;
            parts.push(rendered.unwrap_or_else(|| "null".to_string()));
        }
        Ok(self.wrap_parts("[", parts, "]"))
    }

    fn serialize_object(
        &mut self,
        engine: &mut Engine,
        id: u64,
    ) -> Result<String, SerializeError> {
        let names = match &self.property_list {
            Some(list) => list.clone(),
            None => {
                let Some(obj) = engine.get_object(id) else {
                    return Ok("{}".to_string());
                };
                own_property_names(&obj, true)
            }
        };
        let mut parts = Vec::new();
        for name in names {
            let Some(rendered) = self.serialize_property(engine, id, &name)? else {
                continue;
            };
            let separator = if self.gap.is_empty() { ":" } else { ": " };
            parts.push(format!("{}{}{}", quote_json(&name), separator, rendered));
        }
        Ok(self.wrap_parts("{", parts, "}"))
    }

    fn wrap_parts(&self, open: &str, parts: Vec<String>, close: &str) -> String {
        if parts.is_empty() {
            return format!("{open}{close}");
        }
        if self.gap.is_empty() {
            format!("{open}{}{close}", parts.join(","))
        } else {
            let inner = parts.join(&format!(",\n{}", self.indent));
            let outer_indent = &self.indent[..self.indent.len() - self.gap.len()];
            format!("{open}\n{}{inner}\n{outer_indent}{close}", self.indent)
        }
    }
}

// §15.12.3 Quote
fn quote_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes() {
        assert_eq!(quote_json("a\"b"), r#""a\"b""#);
        assert_eq!(quote_json("line\nbreak"), r#""line\nbreak""#);
        assert_eq!(quote_json("\u{0001}"), "\"\\u0001\"");
    }

    #[test]
    fn parser_accepts_valid_forms() {
        let mut engine = Engine::new();
        for text in [
            "null",
            "true",
            "-12.5e3",
            r#""str""#,
            "[1,2,3]",
            r#"{"a":{"b":[null]}}"#,
            "  [ 1 , 2 ]  ",
        ] {
            let mut p = JsonParser::new(text);
            assert!(
                p.parse_value(&mut engine).is_ok(),
                "should parse: {text}"
            );
        }
    }

    #[test]
    fn parser_rejects_invalid_forms() {
        let mut engine = Engine::new();
        for text in ["01", "+1", ".5", "1.", "{a:1}", "[1,", "\"unterminated"] {
            let mut p = JsonParser::new(text);
            let result = p.parse_value(&mut engine);
            let trailing = !p.at_end();
            assert!(
                result.is_err() || trailing,
                "should reject: {text}"
            );
        }
    }
}
