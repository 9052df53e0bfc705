//! The Date constructor and prototype, §15.9. Time values are UTC
//! milliseconds stored as the wrapped primitive. The non-deterministic
//! entry points (the zero-argument constructor, `now`, `parse`, `UTC`)
//! answer Unknown outside exact mode, where chrono supplies real values.

use chrono::{TimeZone, Utc};

use super::{arg, has_unknown};
use crate::engine::conversions;
use crate::engine::types::*;
use crate::engine::{Engine, ErrorKind};
use crate::tryc;
use crate::types::{JsString, Value};

const MS_PER_DAY: f64 = 86_400_000.0;
const MS_PER_HOUR: f64 = 3_600_000.0;
const MS_PER_MINUTE: f64 = 60_000.0;
const MS_PER_SECOND: f64 = 1000.0;

// §15.9.1.2
fn day(t: f64) -> f64 {
    (t / MS_PER_DAY).floor()
}

fn days_in_year(y: f64) -> f64 {
    let y = y as i64;
    if y % 4 != 0 || (y % 100 == 0 && y % 400 != 0) {
        365.0
    } else {
        366.0
    }
}

// §15.9.1.3
fn day_from_year(y: f64) -> f64 {
    365.0 * (y - 1970.0) + ((y - 1969.0) / 4.0).floor() - ((y - 1901.0) / 100.0).floor()
        + ((y - 1601.0) / 400.0).floor()
}

fn time_from_year(y: f64) -> f64 {
    day_from_year(y) * MS_PER_DAY
}

pub(crate) fn year_from_time(t: f64) -> f64 {
    let mut y = 1970.0 + (t / (365.2425 * MS_PER_DAY)).floor();
    while time_from_year(y) > t {
        y -= 1.0;
    }
    while time_from_year(y + 1.0) <= t {
        y += 1.0;
    }
    y
}

fn in_leap_year(t: f64) -> f64 {
    if days_in_year(year_from_time(t)) == 366.0 {
        1.0
    } else {
        0.0
    }
}

fn day_within_year(t: f64) -> f64 {
    day(t) - day_from_year(year_from_time(t))
}

// §15.9.1.4
pub(crate) fn month_from_time(t: f64) -> f64 {
    let d = day_within_year(t);
    let leap = in_leap_year(t);
    let bounds = [
        31.0,
        59.0 + leap,
        90.0 + leap,
        120.0 + leap,
        151.0 + leap,
        181.0 + leap,
        212.0 + leap,
        243.0 + leap,
        273.0 + leap,
        304.0 + leap,
        334.0 + leap,
        365.0 + leap,
    ];
    for (month, bound) in bounds.iter().enumerate() {
        if d < *bound {
            return month as f64;
        }
    }
    11.0
}

// §15.9.1.5
pub(crate) fn date_from_time(t: f64) -> f64 {
    let d = day_within_year(t);
    let leap = in_leap_year(t);
    let month = month_from_time(t);
    let offsets = [
        0.0,
        31.0,
        59.0 + leap,
        90.0 + leap,
        120.0 + leap,
        151.0 + leap,
        181.0 + leap,
        212.0 + leap,
        243.0 + leap,
        273.0 + leap,
        304.0 + leap,
        334.0 + leap,
    ];
    d - offsets[month as usize] + 1.0
}

// §15.9.1.6
fn week_day(t: f64) -> f64 {
    ((day(t) + 4.0) % 7.0 + 7.0) % 7.0
}

// §15.9.1.10
fn hour_from_time(t: f64) -> f64 {
    ((t / MS_PER_HOUR).floor() % 24.0 + 24.0) % 24.0
}

fn min_from_time(t: f64) -> f64 {
    ((t / MS_PER_MINUTE).floor() % 60.0 + 60.0) % 60.0
}

fn sec_from_time(t: f64) -> f64 {
    ((t / MS_PER_SECOND).floor() % 60.0 + 60.0) % 60.0
}

fn ms_from_time(t: f64) -> f64 {
    (t % MS_PER_SECOND + MS_PER_SECOND) % MS_PER_SECOND
}

// §15.9.1.11
fn make_time(hour: f64, min: f64, sec: f64, ms: f64) -> f64 {
    if !hour.is_finite() || !min.is_finite() || !sec.is_finite() || !ms.is_finite() {
        return f64::NAN;
    }
    conversions::to_integer(hour) * MS_PER_HOUR
        + conversions::to_integer(min) * MS_PER_MINUTE
        + conversions::to_integer(sec) * MS_PER_SECOND
        + conversions::to_integer(ms)
}

// §15.9.1.12
fn make_day(year: f64, month: f64, date: f64) -> f64 {
    if !year.is_finite() || !month.is_finite() || !date.is_finite() {
        return f64::NAN;
    }
    let y = conversions::to_integer(year);
    let m = conversions::to_integer(month);
    let dt = conversions::to_integer(date);
    let ym = y + (m / 12.0).floor();
    let mn = ((m % 12.0) + 12.0) % 12.0;
    // Walk to the first day of the month via the year offset table.
    let mut t = time_from_year(ym);
    let leap = if days_in_year(ym) == 366.0 { 1.0 } else { 0.0 };
    let offsets = [
        0.0,
        31.0,
        59.0 + leap,
        90.0 + leap,
        120.0 + leap,
        151.0 + leap,
        181.0 + leap,
        212.0 + leap,
        243.0 + leap,
        273.0 + leap,
        304.0 + leap,
        334.0 + leap,
    ];
    t += offsets[mn as usize] * MS_PER_DAY;
    day(t) + dt - 1.0
}

// §15.9.1.13
fn make_date(day: f64, time: f64) -> f64 {
    if !day.is_finite() || !time.is_finite() {
        return f64::NAN;
    }
    day * MS_PER_DAY + time
}

// §15.9.1.14
fn time_clip(t: f64) -> f64 {
    if !t.is_finite() || t.abs() > 8.64e15 {
        f64::NAN
    } else {
        conversions::to_integer(t)
    }
}

fn this_time_value(engine: &mut Engine, this: &Value) -> Result<Option<f64>, Completion> {
    if this.is_unknown() {
        return Ok(None);
    }
    if let Some(obj) = engine.resolve_object(this) {
        let b = obj.borrow();
        if b.class_name == "Date" {
            if let Some(Value::Number(t)) = &b.primitive_value {
                return Ok(Some(*t));
            }
            if let Some(Value::Unknown) = &b.primitive_value {
                return Ok(None);
            }
        }
    }
    Err(engine.handle_recoverable_native_exception(
        ErrorKind::TypeError,
        "this is not a Date object",
    ))
}

fn set_time_value(engine: &Engine, this: &Value, t: Value) {
    if let Some(obj) = engine.resolve_object(this) {
        obj.borrow_mut().primitive_value = Some(t);
    }
}

fn render_date(t: f64) -> String {
    if t.is_nan() {
        return "Invalid Date".to_string();
    }
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    format!(
        "{} {} {:02} {} {:02}:{:02}:{:02} GMT+0000",
        DAYS[week_day(t) as usize],
        MONTHS[month_from_time(t) as usize],
        date_from_time(t) as u32,
        year_from_time(t) as i64,
        hour_from_time(t) as u32,
        min_from_time(t) as u32,
        sec_from_time(t) as u32,
    )
}

fn render_iso(t: f64) -> Option<String> {
    if t.is_nan() {
        return None;
    }
    Some(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year_from_time(t) as i64,
        month_from_time(t) as u32 + 1,
        date_from_time(t) as u32,
        hour_from_time(t) as u32,
        min_from_time(t) as u32,
        sec_from_time(t) as u32,
        ms_from_time(t) as u32,
    ))
}

fn now_millis() -> f64 {
    Utc::now().timestamp_millis() as f64
}

fn parse_date_exact(s: &str) -> f64 {
    // ISO 8601 first (§15.9.1.15), then a chrono RFC 2822 fallback.
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let dt = Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap());
        return dt.timestamp_millis() as f64;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(s) {
        return dt.timestamp_millis() as f64;
    }
    f64::NAN
}

impl Engine {
    pub(crate) fn setup_date_builtin(&mut self) {
        let proto = self.date_prototype.clone().unwrap();

        let ctor = self.define_constructor("Date", 7, &proto, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            if !engine.is_construct_call() {
                // Date() as a function renders the current time.
                if engine.options.exact_mode {
                    return Completion::Normal(Value::String(JsString::from_str(&render_date(
                        now_millis(),
                    ))));
                }
                return engine.unknown_value();
            }
            let time = match args.len() {
                0 => {
                    if engine.options.exact_mode {
                        Value::Number(now_millis())
                    } else {
                        // The current instant is not statically knowable.
                        match engine.unknown_value() {
                            Completion::Normal(v) => v,
                            other => return other,
                        }
                    }
                }
                1 => {
                    let prim = match engine.to_primitive(
                        &args[0],
                        crate::engine::conversions::PrimitiveHint::Default,
                    ) {
                        Completion::Normal(v) => v,
                        other => return other,
                    };
                    match prim {
                        Value::String(s) => {
                            if engine.options.exact_mode {
                                Value::Number(parse_date_exact(&s.to_rust_string()))
                            } else {
                                match engine.unknown_value() {
                                    Completion::Normal(v) => v,
                                    other => return other,
                                }
                            }
                        }
                        Value::Unknown => Value::Unknown,
                        other => {
                            let Some(n) = tryc!(engine.number_arg(&other)) else {
                                return engine.unknown_value();
                            };
                            Value::Number(time_clip(n))
                        }
                    }
                }
                _ => {
                    let mut parts = [0.0f64; 7];
                    for (i, slot) in parts.iter_mut().enumerate() {
                        if i < args.len() {
                            let Some(n) = tryc!(engine.number_arg(&args[i])) else {
                                return engine.unknown_value();
                            };
                            *slot = n;
                        } else if i == 2 {
                            *slot = 1.0;
                        }
                    }
                    let mut year = parts[0];
                    if (0.0..=99.0).contains(&conversions::to_integer(year)) {
                        year += 1900.0;
                    }
                    let day = make_day(year, parts[1], parts[2]);
                    let time = make_time(parts[3], parts[4], parts[5], parts[6]);
                    Value::Number(time_clip(make_date(day, time)))
                }
            };
            if let Some(obj) = engine.resolve_object(this) {
                let mut b = obj.borrow_mut();
                b.class_name = "Date".to_string();
                b.primitive_value = Some(time);
                b.prototype = engine.date_prototype.clone();
            }
            Completion::Normal(this.clone())
        });
        let ctor_obj = self.resolve_object(&ctor).unwrap();

        // §15.9.4.2-4 — non-deterministic statics
        self.add_native(&ctor_obj, "now", 0, |engine, _this, _args| {
            if engine.options.exact_mode {
                Completion::Normal(Value::Number(now_millis()))
            } else {
                engine.unknown_value()
            }
        });
        self.add_native(&ctor_obj, "parse", 1, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            if engine.options.exact_mode {
                let Some(s) = tryc!(engine.string_arg(&arg(args, 0))) else {
                    return engine.unknown_value();
                };
                Completion::Normal(Value::Number(parse_date_exact(&s)))
            } else {
                engine.unknown_value()
            }
        });
        self.add_native(&ctor_obj, "UTC", 7, |engine, this, args| {
            if has_unknown(this, args) {
                return engine.unknown_value();
            }
            if !engine.options.exact_mode {
                return engine.unknown_value();
            }
            let mut parts = [0.0f64; 7];
            for (i, slot) in parts.iter_mut().enumerate() {
                if i < args.len() {
                    let Some(n) = tryc!(engine.number_arg(&args[i])) else {
                        return engine.unknown_value();
                    };
                    *slot = n;
                } else if i == 2 {
                    *slot = 1.0;
                }
            }
            let mut year = parts[0];
            if (0.0..=99.0).contains(&conversions::to_integer(year)) {
                year += 1900.0;
            }
            let day = make_day(year, parts[1], parts[2]);
            let time = make_time(parts[3], parts[4], parts[5], parts[6]);
            Completion::Normal(Value::Number(time_clip(make_date(day, time))))
        });

        // Getters. Local time equals UTC here: the analysis host's zone
        // must not leak into results.
        let getters: [(&str, fn(f64) -> f64); 9] = [
            ("getFullYear", year_from_time),
            ("getMonth", month_from_time),
            ("getDate", date_from_time),
            ("getDay", week_day),
            ("getHours", hour_from_time),
            ("getMinutes", min_from_time),
            ("getSeconds", sec_from_time),
            ("getMilliseconds", ms_from_time),
            ("getTimezoneOffset", |_t| 0.0),
        ];
        for (name, f) in getters {
            self.add_native(&proto, name, 0, move |engine, this, _args| {
                match tryc!(this_time_value(engine, this)) {
                    Some(t) if t.is_nan() => Completion::Normal(Value::Number(f64::NAN)),
                    Some(t) => Completion::Normal(Value::Number(f(t))),
                    None => engine.unknown_value(),
                }
            });
            let utc_name = match name {
                "getFullYear" => "getUTCFullYear",
                "getMonth" => "getUTCMonth",
                "getDate" => "getUTCDate",
                "getDay" => "getUTCDay",
                "getHours" => "getUTCHours",
                "getMinutes" => "getUTCMinutes",
                "getSeconds" => "getUTCSeconds",
                "getMilliseconds" => "getUTCMilliseconds",
                _ => continue,
            };
            self.add_native(&proto, utc_name, 0, move |engine, this, _args| {
                match tryc!(this_time_value(engine, this)) {
                    Some(t) if t.is_nan() => Completion::Normal(Value::Number(f64::NAN)),
                    Some(t) => Completion::Normal(Value::Number(f(t))),
                    None => engine.unknown_value(),
                }
            });
        }

        for name in ["getTime", "valueOf"] {
            self.add_native(&proto, name, 0, |engine, this, _args| {
                match tryc!(this_time_value(engine, this)) {
                    Some(t) => Completion::Normal(Value::Number(t)),
                    None => engine.unknown_value(),
                }
            });
        }

        // §15.9.5.27
        self.add_native(&proto, "setTime", 1, |engine, this, args| {
            tryc!(this_time_value(engine, this));
            if has_unknown(this, args) {
                set_time_value(engine, this, Value::Unknown);
                return engine.unknown_value();
            }
            let Some(n) = tryc!(engine.number_arg(&arg(args, 0))) else {
                set_time_value(engine, this, Value::Unknown);
                return engine.unknown_value();
            };
            let t = time_clip(n);
            set_time_value(engine, this, Value::Number(t));
            Completion::Normal(Value::Number(t))
        });

        // Field setters rebuild the time value around the new component.
        self.add_date_setter("setFullYear", 0);
        self.add_date_setter("setMonth", 1);
        self.add_date_setter("setDate", 2);
        self.add_date_setter("setHours", 3);
        self.add_date_setter("setMinutes", 4);
        self.add_date_setter("setSeconds", 5);
        self.add_date_setter("setMilliseconds", 6);

        self.add_native(&proto, "toString", 0, |engine, this, _args| {
            match tryc!(this_time_value(engine, this)) {
                Some(t) => Completion::Normal(Value::String(JsString::from_str(&render_date(t)))),
                None => engine.unknown_value(),
            }
        });
        for name in ["toUTCString", "toLocaleString", "toDateString"] {
            self.add_native(&proto, name, 0, |engine, this, _args| {
                match tryc!(this_time_value(engine, this)) {
                    Some(t) => {
                        Completion::Normal(Value::String(JsString::from_str(&render_date(t))))
                    }
                    None => engine.unknown_value(),
                }
            });
        }

        // §15.9.5.43
        self.add_native(&proto, "toISOString", 0, |engine, this, _args| {
            match tryc!(this_time_value(engine, this)) {
                Some(t) => match render_iso(t) {
                    Some(s) => Completion::Normal(Value::String(JsString::from_str(&s))),
                    None => engine.handle_recoverable_native_exception(
                        ErrorKind::RangeError,
                        "Invalid time value",
                    ),
                },
                None => engine.unknown_value(),
            }
        });

        // §15.9.5.44
        self.add_native(&proto, "toJSON", 1, |engine, this, _args| {
            match tryc!(this_time_value(engine, this)) {
                Some(t) if t.is_nan() => Completion::Normal(Value::Null),
                Some(t) => match render_iso(t) {
                    Some(s) => Completion::Normal(Value::String(JsString::from_str(&s))),
                    None => Completion::Normal(Value::Null),
                },
                None => engine.unknown_value(),
            }
        });
    }

    fn add_date_setter(&mut self, name: &'static str, field: usize) {
        let proto = self.date_prototype.clone().unwrap();
        self.add_native(&proto, name, 1, move |engine, this, args| {
            let current = tryc!(this_time_value(engine, this));
            if has_unknown(this, args) || current.is_none() {
                set_time_value(engine, this, Value::Unknown);
                return engine.unknown_value();
            }
            let t = current.unwrap();
            let mut parts = [
                year_from_time(t),
                month_from_time(t),
                date_from_time(t),
                hour_from_time(t),
                min_from_time(t),
                sec_from_time(t),
                ms_from_time(t),
            ];
            for (i, v) in args.iter().enumerate() {
                let index = field + i;
                if index >= parts.len() {
                    break;
                }
                let Some(n) = tryc!(engine.number_arg(v)) else {
                    set_time_value(engine, this, Value::Unknown);
                    return engine.unknown_value();
                };
                parts[index] = n;
            }
            let day = make_day(parts[0], parts[1], parts[2]);
            let time = make_time(parts[3], parts[4], parts[5], parts[6]);
            let new_t = time_clip(make_date(day, time));
            set_time_value(engine, this, Value::Number(new_t));
            Completion::Normal(Value::Number(new_t))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_decomposition() {
        assert_eq!(year_from_time(0.0), 1970.0);
        assert_eq!(month_from_time(0.0), 0.0);
        assert_eq!(date_from_time(0.0), 1.0);
        assert_eq!(week_day(0.0), 4.0); // Thursday
    }

    #[test]
    fn make_day_round_trips() {
        // 2024-02-29, a leap day
        let d = make_day(2024.0, 1.0, 29.0);
        let t = make_date(d, 0.0);
        assert_eq!(year_from_time(t), 2024.0);
        assert_eq!(month_from_time(t), 1.0);
        assert_eq!(date_from_time(t), 29.0);
    }

    #[test]
    fn month_overflow_normalises() {
        // Month 12 of 2020 is January 2021
        let d = make_day(2020.0, 12.0, 1.0);
        let t = make_date(d, 0.0);
        assert_eq!(year_from_time(t), 2021.0);
        assert_eq!(month_from_time(t), 0.0);
    }

    #[test]
    fn time_clip_bounds() {
        assert!(time_clip(8.64e15 + 1.0).is_nan());
        assert_eq!(time_clip(8.64e15), 8.64e15);
        assert!(time_clip(f64::INFINITY).is_nan());
    }

    #[test]
    fn iso_rendering() {
        assert_eq!(
            render_iso(0.0).unwrap(),
            "1970-01-01T00:00:00.000Z"
        );
        assert!(render_iso(f64::NAN).is_none());
    }
}
