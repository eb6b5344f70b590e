use std::io::{self, Write};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

const INDENT: &[u8] = b"    ";

/// Writes `value` as 4-space indented JSON followed by a newline.
pub fn write_message<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    let mut ser = Serializer::with_formatter(&mut *out, PrettyFormatter::with_indent(INDENT));
    value.serialize(&mut ser).map_err(io::Error::from)?;
    writeln!(out)?;
    out.flush()
}
