//! The RegExp constructor and prototype, §15.10. Pattern matching is
//! delegated to the regex crate; patterns it cannot express (back
//! references and other ES-only constructs) leave the host data
//! uncompiled and every operation on them answers Unknown.

use super::{arg, has_unknown};
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value, number_ops};

fn translate_flags(flags: &str) -> Option<(bool, bool, bool)> {
    let mut global = false;
    let mut ignore_case = false;
    let mut multiline = false;
    for c in flags.chars() {
        match c {
            'g' if !global => global = true,
            'i' if !ignore_case => ignore_case = true,
            'm' if !multiline => multiline = true,
            _ => return None,
        }
    }
    Some((global, ignore_case, multiline))
}

fn compile(pattern: &str, ignore_case: bool, multiline: bool) -> Option<regex::Regex> {
    let mut prefix = String::new();
    if ignore_case || multiline {
        prefix.push_str("(?");
        if ignore_case {
            prefix.push('i');
        }
        if multiline {
            prefix.push('m');
        }
        prefix.push(')');
    }
    regex::Regex::new(&format!("{prefix}{pattern}")).ok()
}

impl Engine {
    /// Build a RegExp object for a literal or constructor call.
    pub(crate) fn create_regexp_object(&mut self, pattern: &str, flags: &str) -> Completion {
        let Some((global, ignore_case, multiline)) = translate_flags(flags) else {
            return self.handle_recoverable_native_exception(
                ErrorKind::SyntaxError,
                &format!("Invalid regular expression flags '{flags}'"),
            );
        };
        let obj = self.create_bare_object();
        {
            let mut o = obj.borrow_mut();
            o.class_name = "RegExp".to_string();
            o.prototype = self.regexp_prototype.clone();
            o.regexp = Some(RegExpData {
                source: pattern.to_string(),
                flags: flags.to_string(),
                global,
                ignore_case,
                multiline,
                compiled: compile(pattern, ignore_case, multiline),
            });
            o.properties.insert(
                "source".to_string(),
                Property::new(PropertyDescriptor::data(
                    Value::String(JsString::from_str(pattern)),
                    false,
                    false,
                    false,
                )),
            );
            for (name, value) in [
                ("global", global),
                ("ignoreCase", ignore_case),
                ("multiline", multiline),
            ] {
                o.properties.insert(
                    name.to_string(),
                    Property::new(PropertyDescriptor::data(
                        Value::Boolean(value),
                        false,
                        false,
                        false,
                    )),
                );
            }
            o.properties.insert(
                "lastIndex".to_string(),
                Property::new(PropertyDescriptor::data(
                    Value::Number(0.0),
                    true,
                    false,
                    false,
                )),
            );
        }
        Completion::Normal(Engine::handle_of(&obj))
    }

    /// §15.10.4.1-adjacent: accept an existing RegExp or build one from
    /// the stringified argument.
    pub(crate) fn coerce_to_regexp(&mut self, val: &Value) -> Result<Value, Completion> {
        if val.is_unknown() {
            return Err(self.unknown_value());
        }
        if let Some(obj) = self.resolve_object(val) {
            if obj.borrow().regexp.is_some() {
                return Ok(val.clone());
            }
        }
        let source = match val {
            Value::Undefined => String::new(),
            other => match self.string_arg(other) {
                Ok(Some(s)) => s,
                Ok(None) => return Err(self.unknown_value()),
                Err(comp) => return Err(comp),
            },
        };
        match self.create_regexp_object(&source, "") {
            Completion::Normal(v) => Ok(v),
            other => Err(other),
        }
    }

    fn regexp_data(&self, val: &Value) -> Option<RegExpData> {
        self.resolve_object(val)
            .and_then(|o| o.borrow().regexp.clone())
    }

    /// §15.10.6.2 [[Exec]]: a result array with `index` and `input`, or
    /// null; global regexps advance `lastIndex`.
    pub(crate) fn regexp_exec(&mut self, regexp: &Value, input: &JsString) -> Completion {
        let Some(data) = self.regexp_data(regexp) else {
            return self.handle_recoverable_native_exception(
                ErrorKind::TypeError,
                "RegExp.prototype.exec called on incompatible receiver",
            );
        };
        let Some(compiled) = &data.compiled else {
            return self.unknown_value();
        };
        let regexp_id = match regexp {
            Value::Object(o) => o.id,
            _ => unreachable!(),
        };
        let text = input.to_rust_string();
        let start = if data.global {
            let last_index = match self.object_get(regexp_id, "lastIndex") {
                Completion::Normal(v) => v,
                other => return other,
            };
            match self.number_arg(&last_index) {
                Ok(Some(n)) => number_ops::to_uint32(n) as usize,
                Ok(None) => return self.unknown_value(),
                Err(comp) => return comp,
            }
        } else {
            0
        };
        let Some(tail) = text.get(start..) else {
            if data.global {
                self.object_put(regexp_id, "lastIndex", Value::Number(0.0), false);
            }
            return Completion::Normal(Value::Null);
        };
        let Some(found) = compiled.captures(tail) else {
            if data.global {
                self.object_put(regexp_id, "lastIndex", Value::Number(0.0), false);
            }
            return Completion::Normal(Value::Null);
        };
        let whole = found.get(0).unwrap();
        let match_start = start + whole.start();
        let match_end = start + whole.end();
        if data.global {
            self.object_put(
                regexp_id,
                "lastIndex",
                Value::Number(match_end as f64),
                false,
            );
        }
        let mut elements = Vec::with_capacity(found.len());
        for group in found.iter() {
            elements.push(match group {
                Some(m) => Value::String(JsString::from_str(m.as_str())),
                None => Value::Undefined,
            });
        }
        let result = self.create_array(elements);
        if let Value::Object(h) = &result {
            let obj = self.get_object(h.id).unwrap();
            let mut b = obj.borrow_mut();
            b.insert_value("index".to_string(), Value::Number(match_start as f64));
            b.insert_value("input".to_string(), Value::String(input.clone()));
        }
        Completion::Normal(result)
    }

    // String.prototype.match, §15.5.4.10
    pub(crate) fn regexp_match(&mut self, regexp: &Value, input: &JsString) -> Completion {
        let Some(data) = self.regexp_data(regexp) else {
            return self.unknown_value();
        };
        if !data.global {
            return self.regexp_exec(regexp, input);
        }
        let Some(compiled) = &data.compiled else {
            return self.unknown_value();
        };
        let text = input.to_rust_string();
        let matches: Vec<Value> = compiled
            .find_iter(&text)
            .map(|m| Value::String(JsString::from_str(m.as_str())))
            .collect();
        if let Value::Object(o) = regexp {
            self.object_put(o.id, "lastIndex", Value::Number(0.0), false);
        }
        if matches.is_empty() {
            Completion::Normal(Value::Null)
        } else {
            Completion::Normal(self.create_array(matches))
        }
    }

    // String.prototype.search, §15.5.4.12
    pub(crate) fn regexp_search(&mut self, regexp: &Value, input: &JsString) -> Completion {
        let Some(data) = self.regexp_data(regexp) else {
            return self.unknown_value();
        };
        let Some(compiled) = &data.compiled else {
            return self.unknown_value();
        };
        let text = input.to_rust_string();
        let result = compiled
            .find(&text)
            .map(|m| text[..m.start()].encode_utf16().count() as f64)
            .unwrap_or(-1.0);
        Completion::Normal(Value::Number(result))
    }

    // String.prototype.replace, §15.5.4.11
    pub(crate) fn string_replace(
        &mut self,
        input: &JsString,
        pattern: &Value,
        replacement: &Value,
    ) -> Completion {
        if pattern.is_unknown() || replacement.is_unknown() {
            return self.unknown_value();
        }
        let text = input.to_rust_string();
        let is_regexp = self
            .resolve_object(pattern)
            .map(|o| o.borrow().regexp.is_some())
            .unwrap_or(false);

        if !is_regexp {
            let Some(search) = tryc!(self.string_arg(pattern)) else {
                return self.unknown_value();
            };
            let Some(pos) = text.find(&search) else {
                return Completion::Normal(Value::String(input.clone()));
            };
            let replaced = tryc!(self.expand_replacement(
                replacement,
                &search,
                &[],
                pos,
                &text
            ));
            let Some(replaced) = replaced else {
                return self.unknown_value();
            };
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..pos]);
            out.push_str(&replaced);
            out.push_str(&text[pos + search.len()..]);
            return Completion::Normal(Value::String(JsString::from_str(&out)));
        }

        let data = self.regexp_data(pattern).unwrap();
        let Some(compiled) = data.compiled.clone() else {
            return self.unknown_value();
        };
        let mut out = String::with_capacity(text.len());
        let mut last_end = 0;
        for captures in compiled.captures_iter(&text) {
            let whole = captures.get(0).unwrap();
            let groups: Vec<Option<String>> = captures
                .iter()
                .skip(1)
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect();
            let replaced = tryc!(self.expand_replacement(
                replacement,
                whole.as_str(),
                &groups,
                whole.start(),
                &text
            ));
            let Some(replaced) = replaced else {
                return self.unknown_value();
            };
            out.push_str(&text[last_end..whole.start()]);
            out.push_str(&replaced);
            last_end = whole.end();
            if !data.global {
                break;
            }
        }
        out.push_str(&text[last_end..]);
        Completion::Normal(Value::String(JsString::from_str(&out)))
    }

    /// The replacement value for one match: a callable is invoked with
    /// (matched, groups…, offset, string); a string has its $-escapes
    /// expanded. Ok(None) when the outcome is Unknown.
    fn expand_replacement(
        &mut self,
        replacement: &Value,
        matched: &str,
        groups: &[Option<String>],
        offset: usize,
        input: &str,
    ) -> Result<Option<String>, Completion> {
        if self.is_callable_value(replacement) {
            let mut call_args = vec![Value::String(JsString::from_str(matched))];
            for g in groups {
                call_args.push(match g {
                    Some(s) => Value::String(JsString::from_str(s)),
                    None => Value::Undefined,
                });
            }
            call_args.push(Value::Number(offset as f64));
            call_args.push(Value::String(JsString::from_str(input)));
            let result = match self.call_function(replacement, &Value::Undefined, &call_args, false)
            {
                Completion::Normal(v) => v,
                other => return Err(other),
            };
            return self.string_arg(&result);
        }
        let Some(template) = self.string_arg(replacement)? else {
            return Ok(None);
        };
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('&') => {
                    chars.next();
                    out.push_str(matched);
                }
                Some(d) if d.is_ascii_digit() => {
                    let n = d.to_digit(10).unwrap() as usize;
                    chars.next();
                    if n >= 1 && n <= groups.len() {
                        if let Some(g) = &groups[n - 1] {
                            out.push_str(g);
                        }
                    } else {
                        out.push('$');
                        out.push_str(&n.to_string());
                    }
                }
                _ => out.push('$'),
            }
        }
        Ok(Some(out))
    }

    // String.prototype.split, §15.5.4.14
    pub(crate) fn string_split(
        &mut self,
        input: &JsString,
        separator: &Value,
        limit: u32,
    ) -> Completion {
        if separator.is_unknown() {
            return self.unknown_value();
        }
        if limit == 0 {
            return Completion::Normal(self.create_array(Vec::new()));
        }
        if separator.is_undefined() {
            return Completion::Normal(
                self.create_array(vec![Value::String(input.clone())]),
            );
        }
        let text = input.to_rust_string();
        let is_regexp = self
            .resolve_object(separator)
            .map(|o| o.borrow().regexp.is_some())
            .unwrap_or(false);
        let parts: Vec<String> = if is_regexp {
            let data = self.regexp_data(separator).unwrap();
            let Some(compiled) = &data.compiled else {
                return self.unknown_value();
            };
            if text.is_empty() {
                if compiled.is_match("") {
                    Vec::new()
                } else {
                    vec![String::new()]
                }
            } else {
                compiled.split(&text).map(|s| s.to_string()).collect()
            }
        } else {
            let Some(sep) = tryc!(self.string_arg(separator)) else {
                return self.unknown_value();
            };
            if sep.is_empty() {
                text.chars().map(|c| c.to_string()).collect()
            } else {
                text.split(&sep).map(|s| s.to_string()).collect()
            }
        };
        let elements: Vec<Value> = parts
            .into_iter()
            .take(limit as usize)
            .map(|s| Value::String(JsString::from_str(&s)))
            .collect();
        Completion::Normal(self.create_array(elements))
    }

    pub(crate) fn setup_regexp_builtin(&mut self) {
        let proto = self.regexp_prototype.clone().unwrap();

        // §15.10.3 / §15.10.4
        self.define_constructor("RegExp", 2, &proto, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let pattern_arg = arg(args, 0);
            let flags_arg = arg(args, 1);
            if let Some(obj) = engine.resolve_object(&pattern_arg) {
                let existing = obj.borrow().regexp.clone();
                if let Some(data) = existing {
                    if !flags_arg.is_undefined() {
                        return engine.handle_recoverable_native_exception(
                            ErrorKind::TypeError,
                            "Cannot supply flags when constructing one RegExp from another",
                        );
                    }
                    if !engine.is_construct_call() {
                        return Completion::Normal(pattern_arg);
                    }
                    return engine.create_regexp_object(&data.source, &data.flags);
                }
            }
            let source = match &pattern_arg {
                Value::Undefined => String::new(),
                other => {
                    let Some(s) = tryc!(engine.string_arg(other)) else {
                        return engine.unknown_value();
                    };
                    s
                }
            };
            let flags = match &flags_arg {
                Value::Undefined => String::new(),
                other => {
                    let Some(s) = tryc!(engine.string_arg(other)) else {
                        return engine.unknown_value();
                    };
                    s
                }
            };
            engine.create_regexp_object(&source, &flags)
        });

        // §15.10.6.2
        self.add_native(&proto, "exec", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(input) = tryc!(engine.js_string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            engine.regexp_exec(this, &input)
        });

        // §15.10.6.3
        self.add_native(&proto, "test", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(input) = tryc!(engine.js_string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            match engine.regexp_exec(this, &input) {
                Completion::Normal(Value::Null) => Completion::Normal(Value::Boolean(false)),
                Completion::Normal(Value::Unknown) => engine.unknown_value(),
                Completion::Normal(_) => Completion::Normal(Value::Boolean(true)),
                other => other,
            }
        });

        // §15.10.6.4
        self.add_native(&proto, "toString", 0, |engine, this, _args| {
            if this.is_unknown() {
                return engine.unknown_value();
            }
            let Some(data) = engine.regexp_data(this) else {
                return engine.handle_recoverable_native_exception(
                    ErrorKind::TypeError,
                    "RegExp.prototype.toString called on incompatible receiver",
                );
            };
            Completion::Normal(Value::String(JsString::from_str(&format!(
                "/{}/{}",
                data.source, data.flags
            ))))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_translation() {
        assert_eq!(translate_flags(""), Some((false, false, false)));
        assert_eq!(translate_flags("gim"), Some((true, true, true)));
        assert_eq!(translate_flags("gg"), None);
        assert_eq!(translate_flags("y"), None);
    }

    #[test]
    fn backreference_pattern_does_not_compile() {
        assert!(compile(r"(a)\1", false, false).is_none());
        assert!(compile(r"ab+c", false, false).is_some());
    }
}
