//! Global functions, §15.1.2 and §15.1.3.

use super::{arg, has_unknown};
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::types::{JsString, Value};

impl Engine {
    pub(crate) fn setup_global_functions(&mut self) {
        let global = self.global_object();

        // §15.1.2.1 — indirect eval; direct calls are intercepted by the
        // rule processor so they can see the caller's environment.
        self.add_native(&global, "eval", 1, |engine, _this, args| {
            let source = arg(args, 0);
            let env = engine.global_env();
            engine.eval_in_env(&source, &env)
        });

        // §15.1.2.2
        self.add_native(&global, "parseInt", 2, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = crate::tryc!(engine.string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            let Some(radix_num) = crate::tryc!(engine.number_arg(&arg(args, 1))) else {
                return engine.unknown_value();
            };
            Completion::Normal(Value::Number(parse_int(&s, radix_num)))
        });

        // §15.1.2.3
        self.add_native(&global, "parseFloat", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            let Some(s) = crate::tryc!(engine.string_arg(&arg(args, 0))) else {
                return engine.unknown_value();
            };
            Completion::Normal(Value::Number(parse_float(&s)))
        });

        // §15.1.2.4
        self.add_native(&global, "isNaN", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            match crate::tryc!(engine.number_arg(&arg(args, 0))) {
                Some(n) => Completion::Normal(Value::Boolean(n.is_nan())),
                None => engine.unknown_value(),
            }
        });

        // §15.1.2.5
        self.add_native(&global, "isFinite", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            match crate::tryc!(engine.number_arg(&arg(args, 0))) {
                Some(n) => Completion::Normal(Value::Boolean(n.is_finite())),
                None => engine.unknown_value(),
            }
        });

        // §15.1.3.1-4
        self.add_native(&global, "decodeURI", 1, |engine, this, args| {
            uri_native(engine, this, args, UriOp::Decode { component: false })
        });
        self.add_native(&global, "decodeURIComponent", 1, |engine, this, args| {
            uri_native(engine, this, args, UriOp::Decode { component: true })
        });
        self.add_native(&global, "encodeURI", 1, |engine, this, args| {
            uri_native(engine, this, args, UriOp::Encode { component: false })
        });
        self.add_native(&global, "encodeURIComponent", 1, |engine, this, args| {
            uri_native(engine, this, args, UriOp::Encode { component: true })
        });
    }
}

// §15.1.2.2 ParseInt(string, radix)
pub(crate) fn parse_int(input: &str, radix_num: f64) -> f64 {
    let s = input.trim_start();
    let (sign, s) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut radix = if radix_num.is_nan() || radix_num == 0.0 {
        10u32
    } else {
        let r = radix_num as i64;
        if !(2..=36).contains(&r) {
            return f64::NAN;
        }
        r as u32
    };
    let mut s = s;
    if (radix == 16 || radix_num.is_nan() || radix_num == 0.0)
        && (s.starts_with("0x") || s.starts_with("0X"))
    {
        s = &s[2..];
        radix = 16;
    }
    let digits: String = s
        .chars()
        .take_while(|c| c.to_digit(radix).is_some())
        .collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut value = 0.0f64;
    for c in digits.chars() {
        value = value * radix as f64 + c.to_digit(radix).unwrap() as f64;
    }
    sign * value
}

// §15.1.2.3 ParseFloat(string)
pub(crate) fn parse_float(input: &str) -> f64 {
    let s = input.trim_start();
    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    if body.starts_with("Infinity") {
        return sign * f64::INFINITY;
    }
    // Longest prefix forming a StrDecimalLiteral
    let bytes = body.as_bytes();
    let mut end = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end > 0 && end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let digit_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digit_start {
            end = exp_end;
        }
    }
    if end == 0 || (end == 1 && bytes[0] == b'.') {
        return f64::NAN;
    }
    body[..end].parse::<f64>().map(|n| sign * n).unwrap_or(f64::NAN)
}

#[derive(Clone, Copy)]
enum UriOp {
    Encode { component: bool },
    Decode { component: bool },
}

fn uri_native(engine: &mut Engine, this: &Value, args: &[Value], op: UriOp) -> Completion {
    if has_unknown(this, args) {
        return engine.unknown_value();
    }
    let Some(s) = crate::tryc!(engine.js_string_arg(&arg(args, 0))) else {
        return engine.unknown_value();
    };
    let result = match op {
        UriOp::Encode { component } => encode_uri(&s, component),
        UriOp::Decode { component } => decode_uri(&s, component),
    };
    match result {
        Ok(out) => Completion::Normal(Value::String(JsString::from_str(&out))),
        Err(msg) => engine.handle_recoverable_native_exception(ErrorKind::UriError, msg),
    }
}

const URI_RESERVED: &str = ";/?:@&=+$,#";
const URI_UNESCAPED: &str = "-_.!~*'()";

fn is_unescaped(c: char, component: bool) -> bool {
    c.is_ascii_alphanumeric() || URI_UNESCAPED.contains(c) || (!component && URI_RESERVED.contains(c))
}

// §15.1.3 Encode
fn encode_uri(s: &JsString, component: bool) -> Result<String, &'static str> {
    let mut out = String::new();
    let units = &s.code_units;
    let mut i = 0;
    while i < units.len() {
        let u = units[i];
        if let Some(c) = char::from_u32(u as u32) {
            if is_unescaped(c, component) {
                out.push(c);
                i += 1;
                continue;
            }
        }
        // Percent-escape the UTF-8 bytes of the code point, pairing
        // surrogates; a lone surrogate is a URIError.
        let cp = if (0xD800..0xDC00).contains(&u) {
            let Some(&lo) = units.get(i + 1) else {
                return Err("URI malformed");
            };
            if !(0xDC00..0xE000).contains(&lo) {
                return Err("URI malformed");
            }
            i += 2;
            0x10000 + (((u as u32) - 0xD800) << 10) + ((lo as u32) - 0xDC00)
        } else if (0xDC00..0xE000).contains(&u) {
            return Err("URI malformed");
        } else {
            i += 1;
            u as u32
        };
        let c = char::from_u32(cp).ok_or("URI malformed")?;
        let mut buf = [0u8; 4];
        for byte in c.encode_utf8(&mut buf).bytes() {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    Ok(out)
}

// §15.1.3 Decode
fn decode_uri(s: &JsString, component: bool) -> Result<String, &'static str> {
    let text = s.to_rust_string();
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i] as char);
            i += 1;
            continue;
        }
        let first = hex_byte(bytes, i).ok_or("URI malformed")?;
        let escape_len = utf8_len(first).ok_or("URI malformed")?;
        let mut buf = vec![first];
        for k in 1..escape_len {
            let offset = i + 3 * k;
            if offset >= bytes.len() || bytes[offset] != b'%' {
                return Err("URI malformed");
            }
            buf.push(hex_byte(bytes, offset).ok_or("URI malformed")?);
        }
        let decoded = std::str::from_utf8(&buf).map_err(|_| "URI malformed")?;
        let c = decoded.chars().next().ok_or("URI malformed")?;
        // decodeURI leaves escapes of the reserved set untouched.
        if !component && URI_RESERVED.contains(c) {
            out.push_str(&text[i..i + 3 * escape_len]);
        } else {
            out.push(c);
        }
        i += 3 * escape_len;
    }
    Ok(out)
}

fn hex_byte(bytes: &[u8], percent_at: usize) -> Option<u8> {
    let hi = *bytes.get(percent_at + 1)? as char;
    let lo = *bytes.get(percent_at + 2)? as char;
    Some((hi.to_digit(16)? * 16 + lo.to_digit(16)?) as u8)
}

fn utf8_len(first_byte: u8) -> Option<usize> {
    match first_byte {
        0x00..=0x7F => Some(1),
        0xC0..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF7 => Some(4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_radix_forms() {
        assert_eq!(parse_int("42", f64::NAN), 42.0);
        assert_eq!(parse_int("  -17  ", f64::NAN), -17.0);
        assert_eq!(parse_int("0xff", f64::NAN), 255.0);
        assert_eq!(parse_int("ff", 16.0), 255.0);
        assert_eq!(parse_int("12px", 10.0), 12.0);
        assert!(parse_int("", f64::NAN).is_nan());
        assert!(parse_int("x", 37.0).is_nan());
    }

    #[test]
    fn parse_float_prefixes() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("  -2.5e2"), -250.0);
        assert_eq!(parse_float("Infinity and beyond"), f64::INFINITY);
        assert!(parse_float("abc").is_nan());
    }

    #[test]
    fn encode_decode_component_round_trip() {
        let input = JsString::from_str("a b/c?d=ü");
        let encoded = encode_uri(&input, true).unwrap();
        assert_eq!(encoded, "a%20b%2Fc%3Fd%3D%C3%BC");
        let decoded = decode_uri(&JsString::from_str(&encoded), true).unwrap();
        assert_eq!(decoded, "a b/c?d=ü");
    }

    #[test]
    fn encode_uri_keeps_reserved() {
        let input = JsString::from_str("http://x.test/a b");
        let encoded = encode_uri(&input, false).unwrap();
        assert_eq!(encoded, "http://x.test/a%20b");
    }

    #[test]
    fn decode_uri_preserves_reserved_escapes() {
        let out = decode_uri(&JsString::from_str("a%2Fb"), false).unwrap();
        assert_eq!(out, "a%2Fb");
        let out = decode_uri(&JsString::from_str("a%2Fb"), true).unwrap();
        assert_eq!(out, "a/b");
    }

    #[test]
    fn malformed_escape_is_error() {
        assert!(decode_uri(&JsString::from_str("%"), true).is_err());
        assert!(decode_uri(&JsString::from_str("%GG"), true).is_err());
        assert!(decode_uri(&JsString::from_str("%C3"), true).is_err());
    }
}
