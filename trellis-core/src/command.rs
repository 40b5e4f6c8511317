//! String-keyed command surface
//!
//! Remote callers address drivers by command key with an opaque argument
//! map. Each driver parses the key into its own command enum, so unknown
//! keys fail with [`Error::UnknownCommand`] instead of a silent miss, and
//! execution is an ordinary `match`.
//!
//! ```ignore
//! let params = Params::new().with("channel", "1").with("on", "0").with("off", "2048");
//! let reply = pwm.command("SetPWM", &params);
//! assert!(reply.err.is_none());
//! ```

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

/// Argument or result value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Time(NaiveDateTime),
}

impl Value {
    /// Integer view; strings are parsed, booleans are 0/1
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Str(s) => parse_int(s.trim()),
            Value::Float(_) | Value::Time(_) => None,
        }
    }

    /// Float view; integers widen, strings are parsed
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Bool(_) | Value::Time(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Time view; strings in `YYYY-MM-DD HH:MM:SS[.fff]` or RFC 3339-like
    /// `T`-separated form are parsed
    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Time(t) => Some(*t),
            Value::Str(s) => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok()),
            _ => None,
        }
    }
}

fn parse_int(s: &str) -> Option<i64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

value_from!(
    bool => Bool,
    u8 => Int,
    u16 => Int,
    i16 => Int,
    i32 => Int,
    u32 => Int,
    i64 => Int,
    f32 => Float,
    f64 => Float,
    String => Str,
    &str => Str,
    NaiveDateTime => Time,
);

/// Opaque argument map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(HashMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_owned(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn require(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| Error::invalid(format!("missing argument '{}'", key)))
    }

    /// Integer argument
    pub fn int(&self, key: &str) -> Result<i64> {
        let value = self.require(key)?;
        value
            .as_int()
            .ok_or_else(|| Error::invalid(format!("argument '{}' is not an integer: {:?}", key, value)))
    }

    /// Integer argument converted to `T`, range checked
    pub fn int_as<T: TryFrom<i64>>(&self, key: &str) -> Result<T> {
        let v = self.int(key)?;
        T::try_from(v).map_err(|_| Error::invalid(format!("argument '{}' out of range: {}", key, v)))
    }

    pub fn float(&self, key: &str) -> Result<f64> {
        let value = self.require(key)?;
        value
            .as_float()
            .ok_or_else(|| Error::invalid(format!("argument '{}' is not a number: {:?}", key, value)))
    }

    pub fn str(&self, key: &str) -> Result<&str> {
        let value = self.require(key)?;
        value
            .as_str()
            .ok_or_else(|| Error::invalid(format!("argument '{}' is not a string: {:?}", key, value)))
    }

    /// Text argument; numbers are formatted, so `7` and `"7"` both work
    pub fn text(&self, key: &str) -> Result<String> {
        match self.require(key)? {
            Value::Str(s) => Ok(s.clone()),
            Value::Int(v) => Ok(v.to_string()),
            other => Err(Error::invalid(format!(
                "argument '{}' is not text: {:?}",
                key, other
            ))),
        }
    }

    pub fn time(&self, key: &str) -> Result<NaiveDateTime> {
        let value = self.require(key)?;
        value
            .as_time()
            .ok_or_else(|| Error::invalid(format!("argument '{}' is not a time: {:?}", key, value)))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Result map of a command: a value, an error, or neither
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub val: Option<Value>,
    pub err: Option<Error>,
}

impl Reply {
    /// Success without a value
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn value(val: impl Into<Value>) -> Self {
        Self {
            val: Some(val.into()),
            err: None,
        }
    }

    pub fn error(err: Error) -> Self {
        Self {
            val: None,
            err: Some(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }

    /// Back to a typed result
    pub fn into_result(self) -> Result<Option<Value>> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self.val),
        }
    }
}

impl From<Result<()>> for Reply {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Reply::ok(),
            Err(e) => Reply::error(e),
        }
    }
}

/// A driver's command set
pub trait Command: Sized {
    /// Every key `parse` accepts
    const KEYS: &'static [&'static str];

    /// Build a command from its key and arguments
    fn parse(key: &str, params: &Params) -> Result<Self>;
}

/// Executes a driver's commands
pub trait Commander {
    type Command: Command;

    /// Run a parsed command
    fn execute(&self, command: Self::Command) -> Reply;

    /// Parse and run a command by key
    fn command(&self, key: &str, params: &Params) -> Reply {
        match Self::Command::parse(key, params) {
            Ok(command) => self.execute(command),
            Err(e) => Reply::error(e),
        }
    }

    /// Keys this driver answers to
    fn commands(&self) -> &'static [&'static str] {
        Self::Command::KEYS
    }
}

/// Wrap a typed result into a reply carrying its value
pub fn reply<T: Into<Value>>(result: Result<T>) -> Reply {
    match result {
        Ok(v) => Reply::value(v),
        Err(e) => Reply::error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[derive(Debug, PartialEq)]
    enum Lamp {
        On { level: u8 },
        Off,
    }

    impl Command for Lamp {
        const KEYS: &'static [&'static str] = &["On", "Off"];

        fn parse(key: &str, params: &Params) -> Result<Self> {
            match key {
                "On" => Ok(Lamp::On {
                    level: params.int_as("level")?,
                }),
                "Off" => Ok(Lamp::Off),
                other => Err(Error::UnknownCommand(other.to_owned())),
            }
        }
    }

    struct Fixture;

    impl Commander for Fixture {
        type Command = Lamp;

        fn execute(&self, command: Lamp) -> Reply {
            match command {
                Lamp::On { level } => Reply::value(level),
                Lamp::Off => Reply::ok(),
            }
        }
    }

    #[test]
    fn test_dispatch() {
        let reply = Fixture.command("On", &Params::new().with("level", "200"));
        assert_eq!(reply.val, Some(Value::Int(200)));
        assert!(Fixture.command("Off", &Params::new()).is_ok());
        assert_eq!(Fixture.commands(), &["On", "Off"]);
    }

    #[test]
    fn test_unknown_command() {
        let reply = Fixture.command("Blink", &Params::new());
        assert_eq!(reply.err, Some(Error::UnknownCommand("Blink".into())));
    }

    #[test]
    fn test_bad_arguments() {
        let missing = Fixture.command("On", &Params::new());
        assert!(matches!(missing.err, Some(Error::InvalidArgument(_))));

        let range = Fixture.command("On", &Params::new().with("level", 300));
        assert!(matches!(range.err, Some(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_value_views() {
        assert_eq!(Value::from("0x1F").as_int(), Some(31));
        assert_eq!(Value::from(" 42 ").as_int(), Some(42));
        assert_eq!(Value::from(true).as_int(), Some(1));
        assert_eq!(Value::from("2.5").as_float(), Some(2.5));
        assert_eq!(Value::from(3u8).as_float(), Some(3.0));
        assert_eq!(Value::from(1.5).as_int(), None);
    }

    #[test]
    fn test_time_parsing() {
        let expected = NaiveDate::from_ymd_opt(2022, 12, 16)
            .unwrap()
            .and_hms_milli_opt(15, 14, 13, 210)
            .unwrap();

        assert_eq!(Value::from("2022-12-16 15:14:13.21").as_time(), Some(expected));
        assert_eq!(Value::from("2022-12-16T15:14:13.210").as_time(), Some(expected));
        assert_eq!(Value::from("yesterday").as_time(), None);
    }

    #[test]
    fn test_reply_into_result() {
        assert_eq!(Reply::value(1u8).into_result(), Ok(Some(Value::Int(1))));
        assert_eq!(
            Reply::error(Error::NotStarted).into_result(),
            Err(Error::NotStarted)
        );
        assert_eq!(Reply::from(Ok(())), Reply::ok());
    }
}
