//! # Command (Request) Engine
//!
//! Turns a decoded RESP2 `Array` of `BulkString`s into a command frame,
//! parses any per-command options, dispatches to a handler, and produces
//! a [`resp::Value`] reply.
//!
//! [Redis command docs](https://redis.io/docs/latest/commands/)

use crate::errors::CmdError;
use crate::expiry::ExpireOption;
use crate::keyspace::{Keyspace, SetPlan};
use crate::resp::Value;
use bytes::Bytes;

/// One element of a `SET`-style argument list after option extraction:
/// either a plain positional argument, or a recognized `(option, value)`
/// pair. Value-taking options capture their value as a raw byte string,
/// which is never itself re-parsed as an option.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Positional(Bytes),
    Flag(&'static str),
    ValueOption(&'static str, Bytes),
}

/// Whether a named option consumes the following positional argument.
#[derive(Debug, Clone, Copy)]
struct OptionSpec {
    name: &'static str,
    takes_value: bool,
}

/// `SET`'s option table (§4.1.2).
const SET_OPTIONS: &[OptionSpec] = &[
    OptionSpec { name: "EX", takes_value: true },
    OptionSpec { name: "PX", takes_value: true },
    OptionSpec { name: "EXAT", takes_value: true },
    OptionSpec { name: "PXAT", takes_value: true },
    OptionSpec { name: "NX", takes_value: false },
    OptionSpec { name: "XX", takes_value: false },
    OptionSpec { name: "KEEPTTL", takes_value: false },
    OptionSpec { name: "GET", takes_value: false },
];

fn lookup_option(table: &[OptionSpec], word: &str) -> Option<OptionSpec> {
    table.iter().find(|o| o.name == word).copied()
}

/// Scans `raw` positional arguments past `fixed_prefix` of them, pulling
/// out recognized options per `table`. Arguments before `fixed_prefix`
/// are always left as plain positionals (they're `key`/`value`, never
/// options). A value-taking option missing its following argument is a
/// [`CmdError::SyntaxError`].
fn parse_args(raw: &[Bytes], fixed_prefix: usize, table: &[OptionSpec]) -> Result<Vec<Arg>, CmdError> {
    let mut out = Vec::with_capacity(raw.len());
    for item in raw.iter().take(fixed_prefix) {
        out.push(Arg::Positional(item.clone()));
    }
    let mut i = fixed_prefix;
    while i < raw.len() {
        let word = String::from_utf8_lossy(&raw[i]).to_ascii_uppercase();
        match lookup_option(table, &word) {
            Some(spec) if spec.takes_value => {
                let value = raw.get(i + 1).cloned().ok_or(CmdError::SyntaxError)?;
                out.push(Arg::ValueOption(spec.name, value));
                i += 2;
            }
            Some(spec) => {
                out.push(Arg::Flag(spec.name));
                i += 1;
            }
            None => {
                out.push(Arg::Positional(raw[i].clone()));
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Uppercases ASCII bytes 0x61..=0x7A to 0x41..=0x5A, passing any other
/// byte through unchanged, then interprets as UTF-8 lossily. This matches
/// the RESP2 command-name convention: only the command name itself (and
/// recognized option keywords) are case-folded — positional arguments
/// keep their original casing.
fn upper_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii_lowercase() { b - 0x20 } else { b })
        .map(|b| b as char)
        .collect()
}

/// Extracts a command frame (command name plus raw positional arguments)
/// from a decoded top-level [`Value`].
///
/// Keeping this conversion here rather than in `resp.rs` keeps the codec
/// command-agnostic and round-trippable: the decoder knows nothing about
/// what shape a command frame must take, only the command engine does.
/// Per the wire contract, client commands are always `Array` of
/// `BulkString`; anything else is a malformed frame.
pub fn frame_from_value(value: Value) -> Result<Vec<Bytes>, CmdError> {
    match value {
        Value::Array(Some(items)) if !items.is_empty() => items
            .into_iter()
            .map(|item| match item {
                Value::BulkString(Some(b)) => Ok(b),
                _ => Err(CmdError::MalformedFrame),
            })
            .collect(),
        _ => Err(CmdError::MalformedFrame),
    }
}

/// Dispatches one decoded command frame (`*<n>\r\n$...` array) against the
/// shared keyspace, producing the reply to send back.
///
/// Only `Array`-of-`BulkString` frames are valid client commands; anything
/// else from the decoder is a protocol error handled by the caller before
/// reaching here (see `conn.rs`).
pub fn dispatch(frame: Vec<Bytes>, keyspace: &Keyspace) -> Value {
    let Some(name_bytes) = frame.first() else {
        return Value::error(CmdError::WrongArity(String::new()).reply_text());
    };
    let name = upper_ascii(name_bytes);
    let args = &frame[1..];

    match name.as_str() {
        "PING" => cmd_ping(args),
        "ECHO" => cmd_echo(args),
        "SET" => match cmd_set(args, keyspace) {
            Ok(v) => v,
            Err(e) => Value::error(e.reply_text()),
        },
        "GET" => match cmd_get(args, keyspace) {
            Ok(v) => v,
            Err(e) => Value::error(e.reply_text()),
        },
        "DEL" => match cmd_del(args, keyspace) {
            Ok(v) => v,
            Err(e) => Value::error(e.reply_text()),
        },
        _ => Value::error(CmdError::UnknownCommand(name).reply_text()),
    }
}

/// `PING` — no arguments replies `PONG`; a single argument is echoed back
/// as a bulk string, matching real Redis.
fn cmd_ping(args: &[Bytes]) -> Value {
    match args.len() {
        0 => Value::simple("PONG"),
        1 => Value::bulk(args[0].clone()),
        _ => Value::error(CmdError::WrongArity("PING".to_string()).reply_text()),
    }
}

/// `ECHO key` — exactly one argument, real-Redis arity. Replies with a
/// simple string.
fn cmd_echo(args: &[Bytes]) -> Value {
    match args {
        [one] => Value::simple(one.clone()),
        _ => Value::error(CmdError::WrongArity("ECHO".to_string()).reply_text()),
    }
}

/// `SET key value [EX s | PX ms | EXAT ts | PXAT ts] [NX | XX] [KEEPTTL] [GET]`
fn cmd_set(args: &[Bytes], keyspace: &Keyspace) -> Result<Value, CmdError> {
    if args.len() < 2 {
        return Err(CmdError::WrongArity("SET".to_string()));
    }
    let parsed = parse_args(args, 2, SET_OPTIONS)?;

    let Arg::Positional(key) = &parsed[0] else {
        unreachable!("first two SET args are always positional by construction")
    };
    let Arg::Positional(value) = &parsed[1] else {
        unreachable!("first two SET args are always positional by construction")
    };

    let mut plan = SetPlan::default();
    let mut time_option_count = 0u8;

    for arg in &parsed[2..] {
        match arg {
            Arg::Flag("NX") => plan.nx = true,
            Arg::Flag("XX") => plan.xx = true,
            Arg::Flag("KEEPTTL") => plan.keepttl = true,
            Arg::Flag("GET") => plan.get = true,
            Arg::ValueOption(name, raw) => {
                let n: i64 = std::str::from_utf8(raw)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(CmdError::NotAnInteger)?;
                plan.expire = Some(match *name {
                    "EX" => ExpireOption::Ex(n),
                    "PX" => ExpireOption::Px(n),
                    "EXAT" => ExpireOption::ExAt(n),
                    "PXAT" => ExpireOption::PxAt(n),
                    _ => unreachable!("SET_OPTIONS only defines EX/PX/EXAT/PXAT as value options"),
                });
                time_option_count += 1;
            }
            Arg::Flag(_) | Arg::Positional(_) => {
                // Unrecognized trailing positional arguments are not part
                // of this core's option matrix; real Redis would reject
                // them too, so surface the same syntax error.
                return Err(CmdError::SyntaxError);
            }
        }
    }

    if time_option_count > 1 {
        return Err(CmdError::NotAnInteger);
    }
    if plan.keepttl && plan.expire.is_some() {
        return Err(CmdError::InvalidExpireSyntax);
    }
    if plan.nx && plan.xx {
        return Err(CmdError::NxXxConflict);
    }

    let outcome = keyspace.execute_set(key.clone(), value.clone(), &plan);
    if outcome.reply_get {
        Ok(match outcome.old_value {
            Some(v) => Value::bulk(v),
            None => Value::nil_bulk(),
        })
    } else if outcome.wrote {
        Ok(Value::simple("OK"))
    } else {
        Ok(Value::nil_bulk())
    }
}

/// `GET key`
fn cmd_get(args: &[Bytes], keyspace: &Keyspace) -> Result<Value, CmdError> {
    let [key] = args else {
        return Err(CmdError::WrongArity("GET".to_string()));
    };
    Ok(match keyspace.get(key) {
        Some(v) => Value::bulk(v),
        None => Value::nil_bulk(),
    })
}

/// `DEL key [key ...]`
fn cmd_del(args: &[Bytes], keyspace: &Keyspace) -> Result<Value, CmdError> {
    if args.is_empty() {
        return Err(CmdError::WrongArity("DEL".to_string()));
    }
    let count = keyspace.delete(args);
    Ok(Value::Integer(count as i64))
}
