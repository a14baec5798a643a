//! # Value Conversion
//!
//! Type-indexed converter registry and the parsing rules shared by every
//! typed accessor.
//!
//! Lookup walks an explicit ancestor table: a type without its own
//! converter falls back to the converter of its declared ancestor. The
//! built-in integer and float types resolve this way through the
//! [`Integral`] and [`Floating`] family entries.

use errors::ConfigError;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Boxed result of an erased conversion.
pub type Converted = Box<dyn Any + Send>;

type ParseFn = dyn Fn(&str, &TargetType) -> Result<Converted, String> + Send + Sync;
type FormatFn = dyn Fn(&dyn Any) -> Option<String> + Send + Sync;

/// Runtime identity of a requested type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetType {
    pub id: TypeId,
    pub name: &'static str
}

impl TargetType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>()
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Ancestor entry for every primitive integer type.
pub struct Integral;

/// Ancestor entry for `f32` and `f64`.
pub struct Floating;

/// Narrowest exact representation of numeric text.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Integer(i32),
    Long(i64),
    BigInteger(i128),
    Double(f64),
    /// Numeric text beyond the native ranges, kept verbatim.
    Decimal(String)
}

impl Number {
    /// Parse `text`, returning `None` when it is not numeric.
    pub fn parse(text: &str) -> Option<Number> {
        let text = text.trim();
        let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
        if digits.is_empty() {
            return None;
        }

        if digits.bytes().all(|b| b.is_ascii_digit()) {
            return Some(if let Ok(v) = text.parse::<i32>() {
                Number::Integer(v)
            } else if let Ok(v) = text.parse::<i64>() {
                Number::Long(v)
            } else if let Ok(v) = text.parse::<i128>() {
                Number::BigInteger(v)
            } else {
                Number::Decimal(text.to_string())
            });
        }

        let decimal_chars = digits
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
        if !decimal_chars || !digits.bytes().any(|b| b.is_ascii_digit()) {
            return None;
        }
        match text.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(Number::Double(v)),
            Ok(_) => Some(Number::Decimal(text.to_string())),
            Err(_) => None
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Integer(v) => Some(i64::from(*v)),
            Number::Long(v) => Some(*v),
            _ => None
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Number::Integer(v) => Some(f64::from(*v)),
            Number::Long(v) => Some(*v as f64),
            Number::BigInteger(v) => Some(*v as f64),
            Number::Double(v) => Some(*v),
            Number::Decimal(_) => None
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(v) => write!(f, "{v}"),
            Number::Long(v) => write!(f, "{v}"),
            Number::BigInteger(v) => write!(f, "{v}"),
            Number::Double(v) => write!(f, "{v}"),
            Number::Decimal(v) => f.write_str(v)
        }
    }
}

/// `true` for a case-insensitive `"true"`, `false` for anything else.
pub fn parse_boolean(text: &str) -> bool {
    text.eq_ignore_ascii_case("true")
}

pub fn parse_number(key: &str, text: &str) -> Result<Number, ConfigError> {
    Number::parse(text).ok_or_else(|| ConfigError::Parse {
        key: key.to_string(),
        value: text.to_string()
    })
}

pub fn parse_integer(key: &str, text: &str) -> Result<i32, ConfigError> {
    match parse_number(key, text)? {
        Number::Integer(v) => Ok(v),
        other => Err(out_of_range(key, "i32", &other))
    }
}

pub fn parse_long(key: &str, text: &str) -> Result<i64, ConfigError> {
    let number = parse_number(key, text)?;
    number
        .as_i64()
        .ok_or_else(|| out_of_range(key, "i64", &number))
}

fn out_of_range(key: &str, target: &str, number: &Number) -> ConfigError {
    ConfigError::Conversion {
        key: key.to_string(),
        target: target.to_string(),
        reason: format!("{number} is not representable")
    }
}

fn parse_as<T>(text: &str) -> Result<Converted, String>
where
    T: FromStr + Send + 'static,
    T::Err: fmt::Display
{
    text.trim()
        .parse::<T>()
        .map(|v| Box::new(v) as Converted)
        .map_err(|e| e.to_string())
}

macro_rules! parse_by_type {
    ($text:expr, $target:expr, [$($ty:ty),+ $(,)?]) => {{
        $(
            if $target.id == TypeId::of::<$ty>() {
                return parse_as::<$ty>($text);
            }
        )+
        Err(format!("{} is not handled by this converter", $target.name))
    }};
}

fn parse_integral(text: &str, target: &TargetType) -> Result<Converted, String> {
    parse_by_type!(text, target, [i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize])
}

fn parse_floating(text: &str, target: &TargetType) -> Result<Converted, String> {
    parse_by_type!(text, target, [f32, f64])
}

#[derive(Default, Clone)]
struct Entry {
    parse: Option<Arc<ParseFn>>,
    format: Option<Arc<FormatFn>>
}

/// Type-indexed lookup table of string converters.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Converts stored text into requested types (reads) and typed values into
/// canonical text (writes).
///
/// ## Usage
/// ```
/// use config::ConverterRegistry;
///
/// let registry = ConverterRegistry::default();
/// let port: u16 = registry.convert("port", "8080").unwrap();
/// assert_eq!(port, 8080);
/// ```
///
/// ## Lookup
/// 1. Converter registered for the exact type.
/// 2. Otherwise the converter of the declared ancestor, repeated up the
///    ancestor chain.
/// 3. Otherwise [`ConfigError::NoConverter`].
#[derive(Clone)]
pub struct ConverterRegistry {
    entries: HashMap<TypeId, Entry>,
    ancestors: HashMap<TypeId, TypeId>
}

impl ConverterRegistry {
    /// Registry without any converters.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            ancestors: HashMap::new()
        }
    }

    /// Register the converter for exactly `T`.
    pub fn register<T: Send + 'static>(
        &mut self,
        parse: impl Fn(&str) -> Result<T, String> + Send + Sync + 'static
    ) -> &mut Self {
        let erased: Arc<ParseFn> =
            Arc::new(move |text: &str, _: &TargetType| parse(text).map(|v| Box::new(v) as Converted));
        self.entries.entry(TypeId::of::<T>()).or_default().parse = Some(erased);
        self
    }

    /// Register a converter for an ancestor entry `A`.
    ///
    /// It receives the concrete type that was requested and must return a
    /// boxed value of exactly that type.
    pub fn register_family<A: 'static>(
        &mut self,
        parse: impl Fn(&str, &TargetType) -> Result<Converted, String> + Send + Sync + 'static
    ) -> &mut Self {
        self.entries.entry(TypeId::of::<A>()).or_default().parse = Some(Arc::new(parse));
        self
    }

    /// Declare `A` as the fallback for `T`.
    pub fn declare_ancestor<T: 'static, A: 'static>(&mut self) -> &mut Self {
        self.ancestors.insert(TypeId::of::<T>(), TypeId::of::<A>());
        self
    }

    /// Register the explicit string form of `T` used on writes.
    pub fn register_formatter<T: 'static>(
        &mut self,
        format: impl Fn(&T) -> String + Send + Sync + 'static
    ) -> &mut Self {
        let erased: Arc<FormatFn> = Arc::new(move |value: &dyn Any| value.downcast_ref::<T>().map(&format));
        self.entries.entry(TypeId::of::<T>()).or_default().format = Some(erased);
        self
    }

    pub fn has_converter(&self, target: &TargetType) -> bool {
        self.find_parser(target.id).is_some()
    }

    fn find_parser(&self, id: TypeId) -> Option<&Arc<ParseFn>> {
        let mut current = id;
        let mut visited = HashSet::new();
        loop {
            if let Some(parse) = self.entries.get(&current).and_then(|e| e.parse.as_ref()) {
                return Some(parse);
            }
            if !visited.insert(current) {
                return None;
            }
            current = *self.ancestors.get(&current)?;
        }
    }

    /// Convert `text` (the value of `key`) into `target`.
    pub fn convert_erased(&self, key: &str, text: &str, target: &TargetType) -> Result<Converted, ConfigError> {
        let parse = self.find_parser(target.id).ok_or_else(|| ConfigError::NoConverter {
            target: target.name.to_string()
        })?;
        parse(text, target).map_err(|reason| ConfigError::Conversion {
            key: key.to_string(),
            target: target.name.to_string(),
            reason
        })
    }

    pub fn convert<T: Send + 'static>(&self, key: &str, text: &str) -> Result<T, ConfigError> {
        let target = TargetType::of::<T>();
        downcast(key, &target, self.convert_erased(key, text, &target)?)
    }

    /// Registered string form of `value`, if a formatter exists for `T`.
    pub fn format_registered<T: 'static>(&self, value: &T) -> Option<String> {
        let format = self.entries.get(&TypeId::of::<T>())?.format.as_ref()?;
        format(value as &dyn Any)
    }

    /// Canonical text for `value`: the registered formatter when present,
    /// otherwise `Display`.
    pub fn to_canonical<T: fmt::Display + 'static>(&self, value: &T) -> String {
        self.format_registered(value)
            .unwrap_or_else(|| value.to_string())
    }
}

/// Unbox a converted value as `T`.
pub fn downcast<T: 'static>(key: &str, target: &TargetType, value: Converted) -> Result<T, ConfigError> {
    value
        .downcast::<T>()
        .map(|v| *v)
        .map_err(|_| ConfigError::Conversion {
            key: key.to_string(),
            target: target.name.to_string(),
            reason: "converter produced a different type".to_string()
        })
}

impl Default for ConverterRegistry {
    /// Registry with the built-in converters.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<String>(|s| Ok(s.to_string()))
            .register::<bool>(|s| Ok(parse_boolean(s)))
            .register::<char>(|s| {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(format!("expected a single character, got {s:?}"))
                }
            })
            .register::<PathBuf>(|s| Ok(PathBuf::from(s)))
            .register::<Number>(|s| Number::parse(s).ok_or_else(|| format!("{s:?} is not numeric")))
            .register::<Vec<String>>(|s| {
                Ok(s.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect())
            })
            .register_family::<Integral>(parse_integral)
            .register_family::<Floating>(parse_floating)
            .register_formatter::<PathBuf>(|p| p.to_string_lossy().into_owned())
            .register_formatter::<Vec<String>>(|items| items.join(","));

        registry
            .declare_ancestor::<i8, Integral>()
            .declare_ancestor::<i16, Integral>()
            .declare_ancestor::<i32, Integral>()
            .declare_ancestor::<i64, Integral>()
            .declare_ancestor::<i128, Integral>()
            .declare_ancestor::<isize, Integral>()
            .declare_ancestor::<u8, Integral>()
            .declare_ancestor::<u16, Integral>()
            .declare_ancestor::<u32, Integral>()
            .declare_ancestor::<u64, Integral>()
            .declare_ancestor::<u128, Integral>()
            .declare_ancestor::<usize, Integral>()
            .declare_ancestor::<f32, Floating>()
            .declare_ancestor::<f64, Floating>();
        registry
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("entries", &self.entries.len())
            .field("ancestors", &self.ancestors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_parsing() {
        for text in ["true", "TRUE", "TrUe"] {
            assert!(parse_boolean(text), "{text}");
        }
        for text in ["false", "yes", "1", "", " true"] {
            assert!(!parse_boolean(text), "{text}");
        }
    }

    #[test]
    fn test_number_narrowest_representation() {
        assert_eq!(Number::parse("42"), Some(Number::Integer(42)));
        assert_eq!(Number::parse("-2147483649"), Some(Number::Long(-2_147_483_649)));
        assert_eq!(
            Number::parse("99999999999999999999"),
            Some(Number::BigInteger(99_999_999_999_999_999_999))
        );
        assert_eq!(
            Number::parse("999999999999999999999999999999999999999999"),
            Some(Number::Decimal("999999999999999999999999999999999999999999".to_string()))
        );
        assert_eq!(Number::parse("1.5"), Some(Number::Double(1.5)));
        assert_eq!(Number::parse("2e3"), Some(Number::Double(2000.0)));
        assert_eq!(Number::parse("1e400"), Some(Number::Decimal("1e400".to_string())));
    }

    #[test]
    fn test_number_rejects_non_numeric() {
        for text in ["", "abc", "NaN", "inf", "infinity", "-", "1.2.3", "e"] {
            assert_eq!(Number::parse(text), None, "{text}");
        }
    }

    #[test]
    fn test_parse_integer_errors() {
        assert!(matches!(parse_integer("k", "abc"), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            parse_integer("k", "3000000000"),
            Err(ConfigError::Conversion { .. })
        ));
        assert_eq!(parse_long("k", "3000000000").unwrap(), 3_000_000_000);
        assert_eq!(parse_integer("k", " 7 ").unwrap(), 7);
    }

    #[test]
    fn test_integral_family_via_ancestor() {
        let registry = ConverterRegistry::default();
        assert_eq!(registry.convert::<u16>("port", "8080").unwrap(), 8080);
        assert_eq!(registry.convert::<i64>("n", "-5").unwrap(), -5);
        assert_eq!(registry.convert::<f32>("ratio", "0.5").unwrap(), 0.5);

        let err = registry.convert::<u8>("small", "300").unwrap_err();
        assert!(matches!(err, ConfigError::Conversion { .. }));
    }

    #[test]
    fn test_missing_converter() {
        struct Unregistered;
        let registry = ConverterRegistry::default();
        let err = registry.convert::<Unregistered>("k", "v").err().unwrap();
        assert!(matches!(err, ConfigError::NoConverter { .. }));
    }

    #[test]
    fn test_custom_ancestor_chain() {
        #[derive(Debug, PartialEq)]
        struct Port(u16);
        struct NetworkFamily;

        let mut registry = ConverterRegistry::default();
        registry
            .register_family::<NetworkFamily>(|text, target| {
                if target.id == TypeId::of::<Port>() {
                    text.parse::<u16>()
                        .map(|p| Box::new(Port(p)) as Converted)
                        .map_err(|e| e.to_string())
                } else {
                    Err("unsupported".to_string())
                }
            })
            .declare_ancestor::<Port, NetworkFamily>();

        assert_eq!(registry.convert::<Port>("port", "443").unwrap(), Port(443));
    }

    #[test]
    fn test_ancestor_cycle_terminates() {
        struct A;
        struct B;
        let mut registry = ConverterRegistry::empty();
        registry.declare_ancestor::<A, B>().declare_ancestor::<B, A>();
        assert!(!registry.has_converter(&TargetType::of::<A>()));
    }

    #[test]
    fn test_canonical_prefers_registered_formatter() {
        let mut registry = ConverterRegistry::default();
        registry.register_formatter::<f64>(|v| format!("{v:.2}"));

        assert_eq!(registry.to_canonical(&1.5f64), "1.50");
        assert_eq!(registry.to_canonical(&42i32), "42");
        assert_eq!(
            registry.format_registered(&vec!["a".to_string(), "b".to_string()]).as_deref(),
            Some("a,b")
        );
    }

    #[test]
    fn test_vec_and_char_converters() {
        let registry = ConverterRegistry::default();
        assert_eq!(
            registry.convert::<Vec<String>>("hosts", "a, b,,c").unwrap(),
            vec!["a", "b", "c"]
        );
        assert_eq!(registry.convert::<char>("sep", ";").unwrap(), ';');
        assert!(registry.convert::<char>("sep", ";;").is_err());
    }
}
