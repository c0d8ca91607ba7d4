//! Call command - run one page handler and print its result.

use super::{SessionOptions, open_session};
use anyhow::{Context, Result, bail};
use std::fmt::Display;
use std::str::FromStr;
use wxbridge_core::types::{Computed, Operation};
use wxbridge_runtime::PageSession;

/// Run the call command.
pub async fn run(
    options: &SessionOptions,
    module: &str,
    operation: &str,
    args: &[String],
) -> Result<()> {
    let op: Operation = operation.parse().map_err(anyhow::Error::msg)?;
    let mut session = open_session(options, module).await?;

    let result = invoke(&mut session, op, args);
    if let Some(notice) = session.last_notice() {
        println!("Notice: {}", notice);
    }
    let (value, source) = result?;

    println!("{} = {}", op, value);
    println!("Source: {}", source);
    if session.is_degraded(op) {
        println!("(answered by the local fallback)");
    }
    Ok(())
}

fn invoke(session: &mut PageSession, op: Operation, args: &[String]) -> Result<(String, String)> {
    match op {
        Operation::Add => {
            let [a, b] = two(op, args)?;
            render(session.add(a, b)?)
        }
        Operation::Multiply => {
            let [a, b] = two(op, args)?;
            render(session.multiply(a, b)?)
        }
        Operation::Factorial => render(session.factorial(one(op, args)?)?),
        Operation::IsPrime => render(session.is_prime(one(op, args)?)?),
        Operation::Fibonacci => render(session.fibonacci(one(op, args)?)?),
        Operation::GreetAge => render(session.greet_age(one(op, args)?)?),
        Operation::Greet => render(session.greet(&args.join(" "))?),
        Operation::ReverseString => render(session.reverse_string(&args.join(" "))?),
    }
}

fn render<T: Display>(computed: Computed<T>) -> Result<(String, String)> {
    Ok((computed.value.to_string(), computed.source.to_string()))
}

fn parse<T>(op: Operation, arg: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    arg.parse()
        .with_context(|| format!("Invalid argument '{}' for {}", arg, op))
}

fn one<T>(op: Operation, args: &[String]) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match args {
        [arg] => parse(op, arg),
        _ => bail!("{} takes 1 argument, got {}", op, args.len()),
    }
}

fn two<T>(op: Operation, args: &[String]) -> Result<[T; 2]>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match args {
        [a, b] => Ok([parse(op, a)?, parse(op, b)?]),
        _ => bail!("{} takes 2 arguments, got {}", op, args.len()),
    }
}
