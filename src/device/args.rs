pub use seify::Args;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::runtime::Error;
use crate::runtime::Result;

/// Get a value as string.
pub fn get_arg(args: &Args, key: &str) -> Option<String> {
    args.get::<String>(key).ok()
}

/// Parse a value, falling back to `default` if it is missing or malformed.
pub fn cast_arg<T: FromStr>(args: &Args, key: &str, default: T) -> T {
    get_arg(args, key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Interpret a value as flag (`true`, `1`, `yes`, `on`).
pub fn arg_flag(args: &Args, key: &str) -> bool {
    matches!(
        get_arg(args, key)
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref(),
        Some("true" | "1" | "yes" | "on")
    )
}

/// Whether there are no arguments.
pub fn args_empty(args: &Args) -> bool {
    args.iter().next().is_none()
}

/// Merge `first` and `second`, skipping `excluded` keys of both.
///
/// A key present in both is fine as long as the values agree.
pub fn merge_args(first: &Args, second: &Args, excluded: &BTreeSet<&str>) -> Result<Args> {
    let mut merged = Args::new();
    for (k, v) in first.iter() {
        let (k, v): (&str, &str) = (k, v);
        if !excluded.contains(k) {
            merged.set(k.to_string(), v.to_string());
        }
    }
    for (k, v) in second.iter() {
        let (k, v): (&str, &str) = (k, v);
        if excluded.contains(k) {
            continue;
        }
        match get_arg(&merged, k) {
            None => {
                merged.set(k.to_string(), v.to_string());
            }
            Some(prev) if prev != v => {
                return Err(Error::ConflictingArgs {
                    key: k.to_string(),
                    first: prev,
                    second: v.to_string(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(merged)
}

/// Typed value of a runtime block argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Bool
    Bool(bool),
    /// Integer
    Int(i64),
    /// Double
    Double(f64),
    /// String
    String(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Double(v) => write!(f, "{v}"),
            ArgValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Double(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::String(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::String(v)
    }
}

/// Arguments used to create a streamer.
#[derive(Debug, Clone, Default)]
pub struct StreamArgs {
    /// Sample format on the host, e.g., `fc32`
    pub cpu_format: String,
    /// Sample format on the wire, e.g., `sc16`
    pub otw_format: String,
    /// Free-form arguments
    pub args: Args,
    /// Channels served by the streamer
    pub channels: Vec<usize>,
}

impl StreamArgs {
    /// Create stream args with the given host format and channel 0.
    pub fn new(cpu_format: impl Into<String>) -> Self {
        Self {
            cpu_format: cpu_format.into(),
            otw_format: String::new(),
            args: Args::new(),
            channels: vec![0],
        }
    }

    /// Set the wire format.
    pub fn otw_format(mut self, f: impl Into<String>) -> Self {
        self.otw_format = f.into();
        self
    }

    /// Set the channels.
    pub fn channels(mut self, c: Vec<usize>) -> Self {
        self.channels = c;
        self
    }

    /// Replace the free-form arguments.
    pub fn args<A: TryInto<Args>>(mut self, a: A) -> Result<Self> {
        self.args = a
            .try_into()
            .map_err(|_| Error::InvalidArgs("couldn't convert to Args".to_string()))?;
        Ok(self)
    }

    /// Set a single free-form argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.args.set(key.into(), value.to_string());
        self
    }

    /// Request one streamer for all channels (`true`) or one per channel.
    pub fn align(self, align: bool) -> Self {
        self.arg("align", align)
    }

    /// Force the vector length seen by the flowgraph.
    pub fn vlen(self, vlen: usize) -> Self {
        self.arg("gr_vlen", vlen)
    }

    /// Whether aligned streaming is requested.
    pub fn is_aligned(&self) -> bool {
        arg_flag(&self.args, "align")
    }

    /// Get a free-form argument as string.
    pub fn get(&self, key: &str) -> Option<String> {
        get_arg(&self.args, key)
    }
}

/// Size of one item of the given host format in bytes.
pub fn bytes_per_item(cpu_format: &str) -> Result<usize> {
    match cpu_format {
        "fc64" => Ok(16),
        "fc32" => Ok(8),
        "sc16" => Ok(4),
        "sc8" => Ok(2),
        "f64" => Ok(8),
        "f32" | "s32" | "item32" => Ok(4),
        "s16" => Ok(2),
        "s8" | "u8" => Ok(1),
        f => Err(Error::UnknownCpuFormat(f.to_string())),
    }
}
