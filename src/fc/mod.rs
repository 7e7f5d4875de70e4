pub mod parser;

pub use parser::{arguments_json, parse_invocation, InvocationArg, ParsedInvocation};
