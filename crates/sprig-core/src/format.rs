//! Template interpolation for `printf` and value shaping for `format`.

use crate::error::ProgramError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Spec {
    fill: Option<char>,
    align: Option<Align>,
    width: usize,
    precision: Option<usize>,
    ty: Option<char>,
}

fn align_of(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    }
}

fn take_digits(chars: &[char], pos: &mut usize) -> Option<usize> {
    let start = *pos;
    while *pos < chars.len() && chars[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if *pos == start {
        return None;
    }
    chars[start..*pos].iter().collect::<String>().parse().ok()
}

/// `[[fill]align][width][.precision][type]`
fn parse_spec(text: &str) -> Result<Spec, ProgramError> {
    let chars: Vec<char> = text.chars().collect();
    let mut spec = Spec::default();
    let mut pos = 0;
    if chars.len() >= 2 && align_of(chars[1]).is_some() {
        spec.fill = Some(chars[0]);
        spec.align = align_of(chars[1]);
        pos = 2;
    } else if let Some(align) = chars.first().copied().and_then(align_of) {
        spec.align = Some(align);
        pos = 1;
    }
    spec.width = take_digits(&chars, &mut pos).unwrap_or(0);
    if chars.get(pos) == Some(&'.') {
        pos += 1;
        spec.precision = Some(
            take_digits(&chars, &mut pos)
                .ok_or_else(|| ProgramError::eval(format!("format spec {text:?}: missing precision")))?,
        );
    }
    if let Some(&c) = chars.get(pos) {
        if !matches!(c, 'f' | 'd' | 's') {
            return Err(ProgramError::eval(format!(
                "format spec {text:?}: unknown type {c:?}"
            )));
        }
        spec.ty = Some(c);
        pos += 1;
    }
    if pos != chars.len() {
        return Err(ProgramError::eval(format!("format spec {text:?}: trailing characters")));
    }
    Ok(spec)
}

fn pad(body: String, spec: &Spec, default: Align) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let fill = spec.fill.unwrap_or(' ');
    let gap = spec.width - len;
    let (left, right) = match spec.align.unwrap_or(default) {
        Align::Left => (0, gap),
        Align::Right => (gap, 0),
        Align::Center => (gap / 2, gap - gap / 2),
    };
    let mut out = String::with_capacity(spec.width);
    out.extend(std::iter::repeat(fill).take(left));
    out.push_str(&body);
    out.extend(std::iter::repeat(fill).take(right));
    out
}

/// Render a value through a format spec. An empty spec gives the plain form.
pub fn format_value(value: &Value, spec: &str) -> Result<String, ProgramError> {
    let spec = parse_spec(spec)?;
    let number = value.as_number();
    let body = match (spec.ty, number) {
        (Some('f'), Some(n)) => n.to_fixed(spec.precision.unwrap_or(6)),
        (Some('d'), Some(n)) if n.is_integer() => n.to_string(),
        (Some('f' | 'd'), _) => {
            return Err(ProgramError::type_error(
                if spec.ty == Some('d') { "integer" } else { "number" },
                value.type_name(),
            ))
        }
        (_, Some(n)) if spec.ty.is_none() && spec.precision.is_some() => {
            n.to_fixed(spec.precision.unwrap_or(0))
        }
        _ => {
            let plain = value.to_plain_string();
            match spec.precision {
                Some(p) => plain.chars().take(p).collect(),
                None => plain,
            }
        }
    };
    let default = if number.is_some() && spec.ty != Some('s') {
        Align::Right
    } else {
        Align::Left
    };
    Ok(pad(body, &spec, default))
}

/// Substitute `{}`, `{N}` and `{:spec}` / `{N:spec}` placeholders. `{{` and
/// `}}` are literal braces.
pub fn interpolate(template: &str, args: &[Value]) -> Result<String, ProgramError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_auto = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(ProgramError::eval(format!(
                                "unterminated placeholder in {template:?}"
                            )))
                        }
                    }
                }
                let (index, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let index = if index.is_empty() {
                    next_auto += 1;
                    next_auto - 1
                } else {
                    index.parse::<usize>().map_err(|_| {
                        ProgramError::eval(format!("bad placeholder {{{field}}} in {template:?}"))
                    })?
                };
                let arg = args.get(index).ok_or_else(|| {
                    ProgramError::eval(format!(
                        "placeholder {index} out of range: {} argument(s) given",
                        args.len()
                    ))
                })?;
                out.push_str(&format_value(arg, spec)?);
            }
            '}' => {
                return Err(ProgramError::eval(format!(
                    "single '}}' in format string {template:?}"
                )))
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;

    fn dec(text: &str) -> Value {
        Value::num(Number::parse_literal(text).unwrap())
    }

    #[test]
    fn spec_grammar() {
        let spec = parse_spec("*^10.3f").unwrap();
        assert_eq!(spec.fill, Some('*'));
        assert_eq!(spec.align, Some(Align::Center));
        assert_eq!(spec.width, 10);
        assert_eq!(spec.precision, Some(3));
        assert_eq!(spec.ty, Some('f'));
        assert_eq!(parse_spec("").unwrap(), Spec::default());
        assert!(parse_spec("5x").is_err());
        assert!(parse_spec(".f").is_err());
    }

    #[test]
    fn fixed_point_numbers() {
        assert_eq!(format_value(&dec("3.14159"), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::int(2), "f").unwrap(), "2.000000");
        assert_eq!(format_value(&dec("2.5"), ">8.1").unwrap(), "     2.5");
        assert!(format_value(&Value::string("x"), "f").is_err());
    }

    #[test]
    fn padding_and_alignment() {
        assert_eq!(format_value(&Value::int(42), "5").unwrap(), "   42");
        assert_eq!(format_value(&Value::string("ab"), "5").unwrap(), "ab   ");
        assert_eq!(format_value(&Value::string("ab"), "-^6").unwrap(), "--ab--");
        assert_eq!(format_value(&Value::string("abcdef"), ".3").unwrap(), "abc");
        assert_eq!(format_value(&Value::int(7), "0>3d").unwrap(), "007");
    }

    #[test]
    fn interpolation() {
        let args = [Value::string("x"), Value::int(3)];
        assert_eq!(interpolate("{} = {}", &args).unwrap(), "x = 3");
        assert_eq!(interpolate("{1}{0}{1}", &args).unwrap(), "3x3");
        assert_eq!(interpolate("{{{}}}", &args).unwrap(), "{x}");
        assert_eq!(interpolate("[{1:>4}]", &args).unwrap(), "[   3]");
        assert!(interpolate("{2}", &args).is_err());
        assert!(interpolate("{", &args).is_err());
        assert!(interpolate("}", &args).is_err());
    }
}
