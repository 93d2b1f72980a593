use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Render a path as a tool argument that can never be parsed as an option.
///
/// Relative paths starting with `-` get a `./` prefix. The bytes of the path
/// are kept as they are, so names that are not valid UTF-8 still resolve.
pub fn safe_path_arg(path: &Path) -> Cow<'_, OsStr> {
    let raw = path.as_os_str();
    if raw.as_encoded_bytes().first() == Some(&b'-') {
        let mut prefixed = OsString::from("./");
        prefixed.push(raw);
        Cow::Owned(prefixed)
    } else {
        Cow::Borrowed(raw)
    }
}

/// Join an argv for display, wrapping parts with whitespace in double quotes.
///
/// Display only: the real argv is always passed to the OS unquoted.
pub fn quote_parts<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| {
            let p = p.as_ref();
            if p.contains(' ') || p.contains('\t') {
                format!("\"{}\"", p)
            } else {
                p.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
