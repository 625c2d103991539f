//! Output file naming.
//!
//! Artifact names only depend on the input path and the winning tag, so a
//! re-run over the same tree always targets the same files.

use std::borrow::Cow;
use std::path::Path;

/// Suffix of schema-less raw dumps
pub const RAW_SUFFIX: &str = "_Result.txt";

fn stem(input: &Path) -> Cow<'_, str> {
    input
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or(Cow::Borrowed("unnamed"))
}

/// `<stem>_<TAG>.json`, e.g. `session.bin` + `res` -> `session_RES.json`
pub fn output_file_name(input: &Path, tag: &str) -> String {
    format!("{}_{}.json", stem(input), tag.to_uppercase())
}

/// `<stem>_Result.txt` for raw wire dumps
pub fn raw_output_file_name(input: &Path) -> String {
    format!("{}{}", stem(input), RAW_SUFFIX)
}
