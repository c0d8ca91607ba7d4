//! Operation identifiers and result wrappers shared by the adapter and
//! the page session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An operation the adapter can forward to a module export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// `add(i32, i32) -> i32`
    Add,
    /// `multiply(i32, i32) -> i32`
    Multiply,
    /// `factorial(i32) -> i32 | i64`
    Factorial,
    /// `is_prime(i32) -> i32`
    IsPrime,
    /// `fibonacci(i32) -> i32 | i64`
    Fibonacci,
    /// `greet(ptr, len)`, name-based greeting.
    Greet,
    /// `greet(age) -> len`, age-bracket greeting.
    GreetAge,
    /// `reverseString(ptr, len)`
    ReverseString,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 8] = [
        Self::Add,
        Self::Multiply,
        Self::Factorial,
        Self::IsPrime,
        Self::Fibonacci,
        Self::Greet,
        Self::GreetAge,
        Self::ReverseString,
    ];

    /// Name of the module export that implements this operation.
    ///
    /// Both greeting contracts share the `greet` export; the signature
    /// decides which one a module provides.
    pub const fn export_name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Multiply => "multiply",
            Self::Factorial => "factorial",
            Self::IsPrime => "is_prime",
            Self::Fibonacci => "fibonacci",
            Self::Greet | Self::GreetAge => "greet",
            Self::ReverseString => "reverseString",
        }
    }

    /// Host-facing name of the operation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Multiply => "multiply",
            Self::Factorial => "factorial",
            Self::IsPrime => "is_prime",
            Self::Fibonacci => "fibonacci",
            Self::Greet => "greet",
            Self::GreetAge => "greet_age",
            Self::ReverseString => "reverse_string",
        }
    }

    /// Check if this operation passes strings through linear memory.
    pub const fn is_string(self) -> bool {
        matches!(self, Self::Greet | Self::GreetAge | Self::ReverseString)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "multiply" => Ok(Self::Multiply),
            "factorial" => Ok(Self::Factorial),
            "is_prime" | "isPrime" => Ok(Self::IsPrime),
            "fibonacci" => Ok(Self::Fibonacci),
            "greet" => Ok(Self::Greet),
            "greet_age" => Ok(Self::GreetAge),
            "reverse_string" | "reverseString" => Ok(Self::ReverseString),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Computed by the loaded module.
    Module,
    /// Computed locally because the module could not answer.
    Fallback,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => f.write_str("module"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// A value together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computed<T> {
    /// The value.
    pub value: T,
    /// Where it came from.
    pub source: ValueSource,
}

impl<T> Computed<T> {
    /// A value produced by the module.
    pub fn module(value: T) -> Self {
        Self {
            value,
            source: ValueSource::Module,
        }
    }

    /// A value produced by the local fallback.
    pub fn fallback(value: T) -> Self {
        Self {
            value,
            source: ValueSource::Fallback,
        }
    }

    /// Check if the fallback produced this value.
    pub fn is_fallback(&self) -> bool {
        self.source == ValueSource::Fallback
    }

    /// Discard the source.
    pub fn into_inner(self) -> T {
        self.value
    }
}
